//! Top-level façade: initialization order and event fan-out.
//!
//! Grounded on `nearby_fp_client.c`'s `nearby_fp_Init` and `nearby_spot.c`'s
//! `nearby_spot_Init`, combined into one façade per the component design.

use crate::account_keys::AccountKeyRing;
use crate::advertisement;
use crate::error::Result;
use crate::fast_pair::FastPairEngine;
use crate::hal::{Hal, PeerId, TimerHandle};
use crate::message_stream::FrameParser;
use crate::scheduler::AdvertScheduler;
#[cfg(feature = "spot")]
use crate::spot::SpotState;

const KEY_ACCOUNT_KEYS: &str = "account-key-list";
#[cfg(feature = "spot")]
const KEY_OWNER_KEY: &str = "owner-key";
#[cfg(feature = "spot")]
const KEY_EPHEMERAL_KEY: &str = "ephemeral-key";
#[cfg(feature = "additional-data")]
const KEY_PERSONALIZED_NAME: &str = "personalized-name";

const MAX_PEERS: usize = 2;

struct PeerSlot {
    peer: Option<PeerId>,
    parser: FrameParser,
    session_nonce: [u8; 8],
    capabilities: Option<u8>,
    platform_type: Option<[u8; 2]>,
    #[cfg(feature = "sass")]
    in_use_account_key: Option<[u8; 16]>,
}

fn new_peer_slot() -> PeerSlot {
    PeerSlot {
        peer: None,
        parser: FrameParser::new(),
        session_nonce: [0u8; 8],
        capabilities: None,
        platform_type: None,
        #[cfg(feature = "sass")]
        in_use_account_key: None,
    }
}

/// Configuration supplied at construction, standing in for what the original
/// compiles in as preprocessor constants.
pub struct EngineConfig {
    pub model_id: u32,
    pub anti_spoofing_private_key: [u8; 32],
}

/// Owns every piece of protocol state; the embedder drives it through the
/// public entry points below, each of which runs to completion synchronously.
pub struct Engine<H: Hal> {
    hal: H,
    config: EngineConfig,
    ring: AccountKeyRing,
    fast_pair: FastPairEngine,
    #[cfg(feature = "spot")]
    spot: SpotState,
    scheduler: AdvertScheduler,
    peers: [PeerSlot; MAX_PEERS],
    rotation_timer: Option<TimerHandle>,
}

impl<H: Hal> Engine<H> {
    /// Initialization order: load persisted account keys (and, if the `spot`
    /// feature is enabled, the owner/ephemeral keys), then arm the first BLE
    /// address rotation timer.
    pub fn init(mut hal: H, config: EngineConfig) -> Result<Self> {
        let mut key_buf = [0u8; crate::account_keys::N_MAX * 16];
        let len = hal.load(KEY_ACCOUNT_KEYS, &mut key_buf).unwrap_or(0);
        let ring = AccountKeyRing::load_from_persisted_bytes(&key_buf[..len]);

        #[cfg(feature = "spot")]
        let spot = {
            let mut spot = SpotState::new();
            let mut owner_buf = [0u8; 16];
            if hal.load(KEY_OWNER_KEY, &mut owner_buf).unwrap_or(0) == 16 {
                spot.owner_key = Some(owner_buf);
            }
            let mut eik_buf = [0u8; 32];
            if hal.load(KEY_EPHEMERAL_KEY, &mut eik_buf).unwrap_or(0) == 32 {
                spot.ephemeral_key = Some(eik_buf);
            }
            spot
        };

        let mut engine = Engine {
            hal,
            config,
            ring,
            fast_pair: FastPairEngine::new(),
            #[cfg(feature = "spot")]
            spot,
            scheduler: AdvertScheduler::new(),
            peers: [new_peer_slot(), new_peer_slot()],
            rotation_timer: None,
        };
        engine.arm_rotation_timer();
        Ok(engine)
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    pub fn ring(&self) -> &AccountKeyRing {
        &self.ring
    }

    fn persist_ring(&mut self) -> Result<()> {
        let bytes = self.ring.to_persisted_bytes();
        self.hal.save(KEY_ACCOUNT_KEYS, &bytes)
    }

    /// GATT write entry point for the Key-Based Pairing characteristic.
    pub fn on_key_based_pairing_write(&mut self, peer: PeerId, payload: &[u8]) -> Result<()> {
        let now = self.hal.now_ms();
        let priv_key = self.config.anti_spoofing_private_key;
        self.fast_pair.on_key_based_pairing_write(&mut self.hal, &mut self.ring, peer, now, payload, &priv_key)
    }

    /// GATT write entry point for the Passkey characteristic.
    pub fn on_passkey_write(&mut self, peer: PeerId, payload: &[u8]) -> Result<()> {
        let now = self.hal.now_ms();
        self.fast_pair.on_passkey_write(&mut self.hal, peer, now, payload)
    }

    /// GATT write entry point for the Account-Key characteristic.
    pub fn on_account_key_write(&mut self, peer: PeerId, payload: &[u8]) -> Result<()> {
        let now = self.hal.now_ms();
        self.fast_pair.on_account_key_write(&mut self.ring, peer, now, payload)?;
        self.persist_ring()?;
        self.refresh_advertisement()
    }

    /// GATT write entry point for the Additional-Data characteristic. Only
    /// the personalized-name data id (1) has a defined side effect: it is
    /// persisted and applied to the local device name.
    #[cfg(feature = "additional-data")]
    pub fn on_additional_data_write(&mut self, _peer: PeerId, payload: &[u8]) -> Result<()> {
        if let Some((data_id, plaintext)) = self.fast_pair.on_additional_data_write(payload)? {
            if data_id == 1 {
                self.hal.save(KEY_PERSONALIZED_NAME, &plaintext)?;
                if let Ok(name) = core::str::from_utf8(&plaintext) {
                    self.hal.set_device_name(name)?;
                }
            }
        }
        Ok(())
    }

    /// Called when the BT stack reports a successful bond.
    pub fn on_paired(&mut self, peer: PeerId) -> Result<()> {
        self.fast_pair.on_paired(&mut self.ring, peer)?;
        self.persist_ring()
    }

    /// Rebuilds and republishes whichever advertisement payload is currently
    /// live, per [`AdvertScheduler`]'s interleaving decision.
    pub fn refresh_advertisement(&mut self) -> Result<()> {
        self.scheduler.set_fast_pair_enabled(self.ring.count() > 0 || self.hal.is_in_pairing_mode());
        #[cfg(feature = "spot")]
        self.scheduler.set_spot_enabled(self.spot.has_ephemeral_key());
        self.publish_current_slot()
    }

    fn publish_current_slot(&mut self) -> Result<()> {
        match self.scheduler.current_slot() {
            crate::scheduler::AdvertSlot::NoAdvert => Ok(()),
            crate::scheduler::AdvertSlot::FastPair => {
                #[allow(unused_mut)]
                let mut opts = advertisement::NondiscoverableOptions::default();
                #[cfg(feature = "sass")]
                {
                    opts.sass_enabled = true;
                    opts.in_use_key = self.peers.iter().find_map(|s| s.in_use_account_key);
                }
                let adv =
                    advertisement::build_nondiscoverable(&self.ring, self.hal.rand_u8(), self.hal.tx_level(), &opts);
                self.hal.set_advertisement(&adv, crate::hal::AdvertisingInterval::Slow)
            }
            #[cfg(feature = "spot")]
            crate::scheduler::AdvertSlot::Spot => {
                let eik = self.spot.ephemeral_key.ok_or(crate::error::EngineError::InvalidValue)?;
                let (eid, hashed_byte) = crate::spot::generate_ephemeral_id(&eik, self.hal.persistent_time_s());
                let hashed_flags = if self.spot.utp_on { Some(hashed_byte | 0x01) } else { None };
                let adv = advertisement::build_spot_advertisement(&eid, self.spot.utp_on, hashed_flags);
                self.hal.set_advertisement(&adv, crate::hal::AdvertisingInterval::Slow)
            }
            #[cfg(not(feature = "spot"))]
            crate::scheduler::AdvertSlot::Spot => Ok(()),
        }
    }

    #[cfg(feature = "spot")]
    fn utp_on(&self) -> bool {
        self.spot.utp_on
    }

    #[cfg(not(feature = "spot"))]
    fn utp_on(&self) -> bool {
        false
    }

    fn arm_rotation_timer(&mut self) {
        let jitter = self.hal.rand_u8();
        let period = crate::scheduler::rotation_period_ms(self.utp_on(), jitter);
        let handle = self.hal.start_timer(period);
        self.rotation_timer = Some(handle);
    }

    fn pick_new_ble_address(&mut self) -> PeerId {
        let mut bytes = [0u8; 6];
        for b in bytes.iter_mut() {
            *b = self.hal.rand_u8();
        }
        // Resolvable private address: top two bits fixed to `01`.
        bytes[0] = (bytes[0] & 0x3F) | 0x40;
        let mut addr_bytes = [0u8; 8];
        addr_bytes[2..8].copy_from_slice(&bytes);
        u64::from_be_bytes(addr_bytes)
    }

    /// Disables advertising, picks a new RPA, notifies every connected
    /// Message Stream peer, and republishes. Suppressed while pairing is in
    /// progress outside the windows where an address change is safe.
    fn rotate_ble_address(&mut self) -> Result<()> {
        use crate::fast_pair::PairingState;
        let suppressed = !matches!(
            self.fast_pair.state(),
            PairingState::Idle | PairingState::WaitAccountKeyWrite | PairingState::WaitAdditionalData
        );
        if suppressed {
            self.arm_rotation_timer();
            return Ok(());
        }

        self.hal.set_advertisement(&[], crate::hal::AdvertisingInterval::Disabled)?;
        let new_addr = self.pick_new_ble_address();
        self.hal.set_ble_address(new_addr);

        let addr_bytes = new_addr.to_be_bytes();
        let connected: heapless::Vec<PeerId, MAX_PEERS> = self.peers.iter().filter_map(|s| s.peer).collect();
        for peer in connected {
            let _ = crate::message_stream::send(
                &mut self.hal,
                peer,
                crate::message_stream::GROUP_DEVICE_INFORMATION_EVENT,
                crate::message_stream::CODE_BLE_ADDRESS_UPDATED,
                &addr_bytes[2..8],
            );
        }

        self.refresh_advertisement()?;
        self.arm_rotation_timer();
        Ok(())
    }

    /// Generic timer callback entry point: dispatches to whichever of the
    /// advertisement interleave timer or the BLE address rotation timer fired.
    pub fn on_timer_fired(&mut self, handle: TimerHandle) -> Result<()> {
        if self.scheduler.peek_timer() == Some(handle) {
            self.scheduler.take_timer();
            if let Some((_, delay)) = self.scheduler.on_slot_timer() {
                self.publish_current_slot()?;
                let next = self.hal.start_timer(delay);
                self.scheduler.remember_timer(next);
            }
            return Ok(());
        }
        if self.rotation_timer == Some(handle) {
            self.rotation_timer = None;
            return self.rotate_ble_address();
        }
        Ok(())
    }

    fn allocate_peer_slot(&mut self, peer: PeerId) -> Option<&mut PeerSlot> {
        let idx = self
            .peers
            .iter()
            .position(|s| s.peer == Some(peer))
            .or_else(|| self.peers.iter().position(|s| s.peer.is_none()))?;
        self.peers[idx].peer = Some(peer);
        Some(&mut self.peers[idx])
    }

    /// Feeds one incoming Message Stream byte for `peer`, dispatching any
    /// fully-parsed frame to the built-in handlers.
    pub fn on_rfcomm_byte(&mut self, peer: PeerId, byte: u8) -> Result<()> {
        let Some(slot) = self.allocate_peer_slot(peer) else {
            return Ok(());
        };
        if let Some((group, code, data)) = slot.parser.push_byte(byte) {
            self.dispatch_message(peer, group, code, &data)
        } else {
            Ok(())
        }
    }

    fn dispatch_message(&mut self, peer: PeerId, group: u8, code: u8, data: &[u8]) -> Result<()> {
        use crate::message_stream::*;
        match (group, code) {
            (GROUP_DEVICE_INFORMATION_EVENT, CODE_ACTIVE_COMPONENT_REQUEST) => {
                let response = [self.hal.active_components() & 0x03];
                send(&mut self.hal, peer, GROUP_DEVICE_INFORMATION_EVENT, CODE_ACTIVE_COMPONENT_RESPONSE, &response)
            }
            (GROUP_DEVICE_INFORMATION_EVENT, CODE_CAPABILITIES) => {
                if let Some(slot) = self.peers.iter_mut().find(|s| s.peer == Some(peer)) {
                    slot.capabilities = data.first().copied();
                }
                Ok(())
            }
            (GROUP_DEVICE_INFORMATION_EVENT, CODE_PLATFORM_TYPE) => {
                if let Some(slot) = self.peers.iter_mut().find(|s| s.peer == Some(peer)) {
                    if data.len() >= 2 {
                        slot.platform_type = Some([data[0], data[1]]);
                    }
                }
                Ok(())
            }
            (GROUP_DEVICE_ACTION_EVENT, CODE_RING) => {
                let components = data.first().copied().unwrap_or(0);
                let timeout_ds = data.get(1).map(|&t| (t as u16) * 10).unwrap_or(0);
                match self.hal.ring(components, timeout_ds, 0) {
                    Ok(()) => send_ack(&mut self.hal, peer, group, code),
                    Err(_) => send_nack(&mut self.hal, peer, group, code, 1),
                }
            }
            #[cfg(feature = "sass")]
            (crate::sass::GROUP_SASS, crate::sass::OP_GET_CAPABILITY) => self.handle_sass_get_capability(peer),
            #[cfg(feature = "sass")]
            (crate::sass::GROUP_SASS, crate::sass::OP_INDICATE_IN_USE_ACCOUNT_KEY) => {
                self.handle_sass_indicate_in_use(peer, data)
            }
            #[cfg(feature = "sass")]
            (crate::sass::GROUP_SASS, crate::sass::OP_GET_CONNECTION_STATUS) => {
                self.handle_sass_get_connection_status(peer)
            }
            _ => self.hal.on_message_stream_received(peer, group, code, data),
        }
    }

    #[cfg(feature = "sass")]
    fn handle_sass_get_capability(&mut self, peer: PeerId) -> Result<()> {
        let cap = self.hal.sass_capabilities();
        crate::message_stream::send(&mut self.hal, peer, crate::sass::GROUP_SASS, crate::sass::OP_NOTIFY_CAPABILITY, &[cap])
    }

    /// Verifies the peer's claim to an account key and, on success, marks
    /// that key "in use" — required before any stateful SASS op and the
    /// signal that drives the advertisement bloom filter's in-use bit.
    #[cfg(feature = "sass")]
    fn handle_sass_indicate_in_use(&mut self, peer: PeerId, signed: &[u8]) -> Result<()> {
        use crate::error::EngineError;
        let Some(idx) = self.peers.iter().position(|s| s.peer == Some(peer)) else {
            return Err(EngineError::InvalidInput);
        };
        let session_nonce = self.peers[idx].session_nonce;
        let candidates: heapless::Vec<[u8; 16], { crate::account_keys::N_MAX }> =
            self.ring.iter_unique().map(|e| e.key).collect();

        for key in candidates {
            if let Ok(payload) = crate::sass::verify(&key, &session_nonce, signed) {
                if payload == &key[..] {
                    self.peers[idx].in_use_account_key = Some(key);
                    return crate::message_stream::send_ack(
                        &mut self.hal,
                        peer,
                        crate::sass::GROUP_SASS,
                        crate::sass::OP_INDICATE_IN_USE_ACCOUNT_KEY,
                    );
                }
            }
        }
        crate::message_stream::send_nack(&mut self.hal, peer, crate::sass::GROUP_SASS, crate::sass::OP_INDICATE_IN_USE_ACCOUNT_KEY, 1)
    }

    #[cfg(feature = "sass")]
    fn handle_sass_get_connection_status(&mut self, peer: PeerId) -> Result<()> {
        use crate::error::EngineError;
        let Some(idx) = self.peers.iter().position(|s| s.peer == Some(peer)) else {
            return Err(EngineError::InvalidInput);
        };
        let session_nonce = self.peers[idx].session_nonce;
        let key = self.peers[idx].in_use_account_key.ok_or(EngineError::Unauthenticated)?;

        let cap_flags = u16::from(self.hal.sass_capabilities());
        let body = crate::sass::connection_status_payload(true, 0, cap_flags, &session_nonce);

        let mut message_nonce = [0u8; 8];
        for b in message_nonce.iter_mut() {
            *b = self.hal.rand_u8();
        }
        let signed = crate::sass::sign(&key, &session_nonce, &message_nonce, &body);

        let mut new_session_nonce = [0u8; 8];
        for b in new_session_nonce.iter_mut() {
            *b = self.hal.rand_u8();
        }
        self.peers[idx].session_nonce = new_session_nonce;

        crate::message_stream::send(&mut self.hal, peer, crate::sass::GROUP_SASS, crate::sass::OP_NOTIFY_CONNECTION_STATUS, &signed)
    }

    /// Called by the embedder's audio stack when the active audio source
    /// changes between connected peers; broadcasts the switch event to all
    /// of them.
    #[cfg(feature = "sass")]
    pub fn on_audio_source_switched(&mut self, new_active_peer: PeerId) -> Result<()> {
        let addr = self.hal.ble_address().to_be_bytes();
        let mut trailer = [0u8; 6];
        trailer.copy_from_slice(&addr[2..8]);

        let connected: heapless::Vec<PeerId, MAX_PEERS> = self.peers.iter().filter_map(|s| s.peer).collect();
        for peer in connected {
            let self_or_other =
                if peer == new_active_peer { crate::sass::SWITCH_EVENT_SELF } else { crate::sass::SWITCH_EVENT_OTHER };
            let body = crate::sass::multipoint_switch_event_payload(0, self_or_other, trailer);
            crate::message_stream::send(
                &mut self.hal,
                peer,
                crate::sass::GROUP_SASS,
                crate::sass::OP_NOTIFY_MULTIPOINT_SWITCH_EVENT,
                &body,
            )?;
        }
        Ok(())
    }

    /// Called on each Message Stream connection: emits the fixed startup
    /// message sequence (model id, BLE address, session nonce, battery).
    pub fn on_message_stream_connected(&mut self, peer: PeerId) -> Result<()> {
        use crate::message_stream::*;
        let model_id = self.hal.model_id().to_be_bytes();
        send(&mut self.hal, peer, GROUP_DEVICE_INFORMATION_EVENT, CODE_MODEL_ID, &model_id[1..4])?;

        let addr = self.hal.ble_address().to_be_bytes();
        send(&mut self.hal, peer, GROUP_DEVICE_INFORMATION_EVENT, CODE_BLE_ADDRESS_UPDATED, &addr[2..8])?;

        let mut nonce = [0u8; 8];
        for b in nonce.iter_mut() {
            *b = self.hal.rand_u8();
        }
        send(&mut self.hal, peer, GROUP_DEVICE_INFORMATION_EVENT, CODE_SESSION_NONCE, &nonce)?;
        if let Some(slot) = self.allocate_peer_slot(peer) {
            slot.session_nonce = nonce;
        }

        #[cfg(feature = "battery-notification")]
        if let Some(levels) = self.hal.battery_levels() {
            let charging = self.hal.is_charging();
            let byte0 = ((charging as u8) << 7) | (levels[0] & 0x7F);
            send(&mut self.hal, peer, GROUP_DEVICE_INFORMATION_EVENT, CODE_BATTERY_LEVEL, &[byte0, levels[1], levels[2]])?;
        }
        #[cfg(feature = "battery-notification")]
        if let Some(minutes) = self.hal.battery_remaining_minutes() {
            send(&mut self.hal, peer, GROUP_DEVICE_INFORMATION_EVENT, CODE_BATTERY_TIME, &minutes.to_be_bytes())?;
        }

        self.fast_pair.offer_retroactive(peer, self.hal.now_ms());
        Ok(())
    }

    /// GATT read entry point for the SPOT Read Beacon Parameters characteristic:
    /// latches `peer` as the active reader and returns the fresh-nonce response.
    #[cfg(feature = "spot")]
    pub fn on_spot_read_beacon_parameters(&mut self, peer: PeerId) -> [u8; 9] {
        let mut nonce = [0u8; 8];
        for b in nonce.iter_mut() {
            *b = self.hal.rand_u8();
        }
        self.spot.read_beacon_action(peer, nonce)
    }

    /// GATT write entry point for the SPOT Write Beacon Action characteristic.
    /// Persists the owner/ephemeral keys after every mutation (they are the
    /// only SPOT state that must survive a reboot), and drives the ring HAL
    /// directly for opcodes that carry no GATT response.
    #[cfg(feature = "spot")]
    pub fn on_spot_write_beacon_action(
        &mut self,
        req: crate::spot::WriteBeaconRequest<'_>,
    ) -> Result<crate::spot::WriteBeaconOutcome> {
        let any_keys: heapless::Vec<[u8; 16], { crate::account_keys::N_MAX }> =
            self.ring.iter_unique().map(|e| e.key).collect();
        let owner_key = self.spot.owner_key;
        let hw = crate::spot::BeaconHardwareInfo {
            tx_power: self.hal.tx_level(),
            clock_s: self.hal.persistent_time_s(),
            num_ring_components: self.hal.ring_component_count(),
            ring_volume_caps: self.hal.ring_volume_capabilities(),
        };
        let user_consent = self.hal.is_in_pairing_mode() || self.hal.has_user_consent_for_reading_eik();

        let outcome = self.spot.write_beacon_action(req, owner_key, &any_keys, hw, user_consent)?;

        if let Some(owner) = self.spot.owner_key {
            let _ = self.hal.save(KEY_OWNER_KEY, &owner);
        }
        match self.spot.ephemeral_key {
            Some(eik) => {
                let _ = self.hal.save(KEY_EPHEMERAL_KEY, &eik);
            }
            None => {
                let _ = self.hal.save(KEY_EPHEMERAL_KEY, &[]);
            }
        }

        match &outcome {
            crate::spot::WriteBeaconOutcome::Ring { components, timeout_ds, volume } => {
                let _ = self.hal.ring(*components, *timeout_ds, *volume);
            }
            crate::spot::WriteBeaconOutcome::Response(_) => {
                let _ = self.refresh_advertisement();
            }
        }
        Ok(outcome)
    }
}
