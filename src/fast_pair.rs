//! Fast Pair GATT engine: Key-Based Pairing, Passkey, Account-Key and
//! Additional-Data characteristic writes, plus the pairing sub-state-machine.
//!
//! Grounded on `nearby_fp_client.c`'s `HandleKeyBasedPairingRequest`,
//! `HandlePasskey`, `HandleAccountKeyWrite`, `RunPostPairingSteps`, the
//! retroactive-pairing list, and the failure-throttle counter.

use heapless::Vec;

use crate::account_keys::{AccountKeyEntry, AccountKeyRing};
use crate::crypto::{aes128_ecb_decrypt, aes128_ecb_encrypt, create_shared_secret};
use crate::error::{EngineError, Result};
use crate::hal::{BleHal, BtHal, OsHal, PeerId};

pub const MAX_FAIL: u8 = 10;
const BLOCK_DURATION_MS: u32 = 5 * 60 * 1000;
const PAIRING_REQUEST_TIMEOUT_MS: u32 = 10 * 1000;
const PENDING_ACCOUNT_KEY_TIMEOUT_MS: u32 = 60 * 1000;
const RETROACTIVE_TIMEOUT_MS: u32 = 60 * 1000;
const MAX_RETROACTIVE: usize = 2;

const CHAR_KEY_BASED_PAIRING: u8 = 1;
const CHAR_PASSKEY: u8 = 2;
const CHAR_ADDITIONAL_DATA: u8 = 4;

const FLAG_KEY_BASED_PAIRING_REQUEST: u8 = 0x00;
const FLAG_ACTION_REQUEST: u8 = 0x10;

const BIT_INITIATE_PAIRING: u8 = 1 << 6;
const BIT_NOTIFY_EXISTING_NAME: u8 = 1 << 5;
const BIT_RETROACTIVE_WRITE: u8 = 1 << 4;
const BIT_WILL_WRITE_DATA: u8 = 1 << 6;
const BIT_DEVICE_ACTION: u8 = 1 << 7;

/// Which step of the pairing dance is in progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PairingState {
    Idle,
    WaitPairingRequest,
    WaitPasskey,
    WaitPairingResult,
    WaitAccountKeyWrite,
    WaitAdditionalData,
}

struct RetroactiveEntry {
    peer: PeerId,
    deadline_ms: u32,
}

/// Pairing-failure throttle: after `MAX_FAIL` consecutive rejections, writes
/// are silently accepted but ignored for 5 minutes. This is intentional
/// anti-timing-oracle behavior and must not be "fixed" into an error return.
#[derive(Default)]
struct Throttle {
    consecutive_failures: u8,
    block_deadline_ms: u32,
}

impl Throttle {
    fn is_blocked(&self, now_ms: u32) -> bool {
        self.consecutive_failures >= MAX_FAIL && now_ms < self.block_deadline_ms
    }

    fn record_failure(&mut self, now_ms: u32) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= MAX_FAIL {
            self.block_deadline_ms = now_ms + BLOCK_DURATION_MS;
        }
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }
}

pub struct FastPairEngine {
    state: PairingState,
    state_start_ms: u32,
    active_peer: Option<PeerId>,
    shared_key: Option<[u8; 16]>,
    pending_account_key: Option<([u8; 16], u32)>,
    pending_data_id: Option<u8>,
    throttle: Throttle,
    retroactive: Vec<RetroactiveEntry, MAX_RETROACTIVE>,
}

impl FastPairEngine {
    pub fn new() -> Self {
        FastPairEngine {
            state: PairingState::Idle,
            state_start_ms: 0,
            active_peer: None,
            shared_key: None,
            pending_account_key: None,
            pending_data_id: None,
            throttle: Throttle::default(),
            retroactive: Vec::new(),
        }
    }

    pub fn state(&self) -> PairingState {
        self.state
    }

    fn reset(&mut self) {
        self.state = PairingState::Idle;
        self.active_peer = None;
        self.shared_key = None;
        self.pending_data_id = None;
    }

    fn evict_expired_retroactive(&mut self, now_ms: u32) {
        self.retroactive.retain(|e| e.deadline_ms > now_ms);
    }

    fn is_retroactive_candidate(&self, peer: PeerId, now_ms: u32) -> bool {
        self.retroactive
            .iter()
            .any(|e| e.peer == peer && e.deadline_ms > now_ms)
    }

    fn add_retroactive(&mut self, peer: PeerId, now_ms: u32) {
        if self.retroactive.iter().any(|e| e.peer == peer) {
            return;
        }
        if self.retroactive.len() == MAX_RETROACTIVE {
            self.retroactive.remove(0);
        }
        self.retroactive
            .push(RetroactiveEntry { peer, deadline_ms: now_ms + RETROACTIVE_TIMEOUT_MS })
            .ok();
    }

    /// Handles a Key-Based Pairing characteristic write (16 or 80 bytes).
    pub fn on_key_based_pairing_write<H: BtHal + BleHal + OsHal>(
        &mut self,
        hal: &mut H,
        ring: &mut AccountKeyRing,
        peer: PeerId,
        now_ms: u32,
        payload: &[u8],
        anti_spoofing_priv: &[u8; 32],
    ) -> Result<()> {
        if self.throttle.is_blocked(now_ms) {
            return Ok(());
        }
        if self.throttle.consecutive_failures >= MAX_FAIL {
            self.throttle.record_success();
        }

        let (shared_key, decrypted) = match payload.len() {
            80 => {
                let mut peer_pub = [0u8; 64];
                peer_pub.copy_from_slice(&payload[16..80]);
                let key = create_shared_secret(&peer_pub, anti_spoofing_priv)?;
                let mut block = [0u8; 16];
                block.copy_from_slice(&payload[0..16]);
                aes128_ecb_decrypt(&key, &mut block);
                (key, block)
            }
            16 => {
                let mut found = None;
                for i in 0..ring.count() {
                    let entry = ring.entry(i).expect("index within count");
                    let mut block = [0u8; 16];
                    block.copy_from_slice(payload);
                    aes128_ecb_decrypt(&entry.key, &mut block);
                    let addr_matches = block[1..7] == hal.ble_address().to_be_bytes()[2..8]
                        || block[1..7] == hal.public_address().to_be_bytes()[2..8];
                    if addr_matches {
                        found = Some((i, entry.key, block));
                        break;
                    }
                }
                match found {
                    Some((i, key, block)) => {
                        ring.activate(i);
                        (key, block)
                    }
                    None => {
                        self.throttle.record_failure(now_ms);
                        return Ok(());
                    }
                }
            }
            _ => return Err(EngineError::InvalidInput),
        };

        let flags = decrypted[0];
        if flags != FLAG_KEY_BASED_PAIRING_REQUEST && flags != FLAG_ACTION_REQUEST {
            self.throttle.record_failure(now_ms);
            return Err(EngineError::InvalidInput);
        }

        self.shared_key = Some(shared_key);
        self.active_peer = Some(peer);

        let mut response = [0u8; 16];
        response[0] = 0x01;
        let public_addr = hal.public_address().to_be_bytes();
        response[1..7].copy_from_slice(&public_addr[2..8]);
        for b in response[7..16].iter_mut() {
            *b = hal.rand_u8();
        }
        aes128_ecb_encrypt(&shared_key, &mut response);
        hal.gatt_notify(peer, CHAR_KEY_BASED_PAIRING, &response)?;

        match flags {
            FLAG_KEY_BASED_PAIRING_REQUEST => {
                if decrypted[1] & BIT_RETROACTIVE_WRITE != 0 {
                    if !self.is_retroactive_candidate(peer, now_ms) {
                        self.reset();
                        return Err(EngineError::Unauthenticated);
                    }
                    return Ok(());
                }
                if decrypted[1] & BIT_NOTIFY_EXISTING_NAME != 0 {
                    // Personalized-name notification is handled by the caller
                    // via Additional-Data; nothing further to do here.
                    return Ok(());
                }
                if decrypted[1] & BIT_INITIATE_PAIRING != 0 {
                    let mut addr_bytes = [0u8; 8];
                    addr_bytes[2..8].copy_from_slice(&decrypted[2..8]);
                    let seeker_addr = u64::from_be_bytes(addr_bytes);
                    hal.send_pairing_request(seeker_addr)?;
                    self.state = PairingState::WaitPasskey;
                } else {
                    self.state = PairingState::WaitPairingRequest;
                }
                self.state_start_ms = now_ms;
            }
            FLAG_ACTION_REQUEST => {
                if decrypted[1] & BIT_DEVICE_ACTION != 0 {
                    return Err(EngineError::Unsupported);
                }
                if decrypted[1] & BIT_WILL_WRITE_DATA != 0 {
                    self.state = PairingState::WaitAdditionalData;
                    self.pending_data_id = Some(decrypted[10]);
                    self.state_start_ms = now_ms;
                }
            }
            _ => unreachable!(),
        }

        Ok(())
    }

    /// Handles a Passkey characteristic write.
    pub fn on_passkey_write<H: BtHal + BleHal + OsHal>(
        &mut self,
        hal: &mut H,
        peer: PeerId,
        now_ms: u32,
        payload: &[u8],
    ) -> Result<()> {
        if self.state != PairingState::WaitPasskey
            || self.active_peer != Some(peer)
            || now_ms.saturating_sub(self.state_start_ms) > PAIRING_REQUEST_TIMEOUT_MS
        {
            return Err(EngineError::Unauthenticated);
        }
        let key = self.shared_key.ok_or(EngineError::Unauthenticated)?;
        if payload.len() != 16 {
            return Err(EngineError::InvalidInput);
        }
        let mut block = [0u8; 16];
        block.copy_from_slice(payload);
        aes128_ecb_decrypt(&key, &mut block);
        if block[0] != 0x02 {
            return Err(EngineError::InvalidInput);
        }
        let seeker_passkey = u32::from_be_bytes([0, block[1], block[2], block[3]]);

        let mut response = [0u8; 16];
        response[0] = 0x03;
        let local_passkey = hal.pairing_passkey().to_be_bytes();
        response[1..4].copy_from_slice(&local_passkey[1..4]);
        for b in response[4..16].iter_mut() {
            *b = hal.rand_u8();
        }
        aes128_ecb_encrypt(&key, &mut response);
        hal.gatt_notify(peer, CHAR_PASSKEY, &response)?;

        hal.set_remote_passkey(seeker_passkey)?;
        self.state = PairingState::WaitPairingResult;
        Ok(())
    }

    /// Handles an Account-Key characteristic write.
    pub fn on_account_key_write(
        &mut self,
        ring: &mut AccountKeyRing,
        peer: PeerId,
        now_ms: u32,
        payload: &[u8],
    ) -> Result<()> {
        if payload.len() != 16 {
            return Err(EngineError::InvalidInput);
        }

        self.evict_expired_retroactive(now_ms);
        let via_retroactive = self.is_retroactive_candidate(peer, now_ms);

        let key = match self.state {
            PairingState::WaitPairingRequest | PairingState::WaitPasskey | PairingState::WaitPairingResult => {
                self.shared_key.ok_or(EngineError::Unauthenticated)?
            }
            PairingState::WaitAccountKeyWrite if self.active_peer == Some(peer) => {
                self.shared_key.ok_or(EngineError::Unauthenticated)?
            }
            _ if via_retroactive => self.shared_key.ok_or(EngineError::Unauthenticated)?,
            _ => return Err(EngineError::Unauthenticated),
        };

        let mut block = [0u8; 16];
        block.copy_from_slice(payload);
        aes128_ecb_decrypt(&key, &mut block);
        if block[0] != 0x04 {
            return Err(EngineError::InvalidInput);
        }

        match self.state {
            PairingState::WaitPairingRequest | PairingState::WaitPasskey | PairingState::WaitPairingResult => {
                self.pending_account_key = Some((block, now_ms + PENDING_ACCOUNT_KEY_TIMEOUT_MS));
                Ok(())
            }
            _ => self.run_post_pairing_steps(ring, peer, block),
        }
    }

    /// Called when the BT stack reports a peer has successfully bonded.
    pub fn on_paired(&mut self, ring: &mut AccountKeyRing, peer: PeerId) -> Result<()> {
        if self.active_peer != Some(peer) {
            return Ok(());
        }
        self.throttle.record_success();
        if let Some((key, _deadline)) = self.pending_account_key.take() {
            return self.run_post_pairing_steps(ring, peer, key);
        }
        self.state = PairingState::WaitAccountKeyWrite;
        Ok(())
    }

    fn run_post_pairing_steps(
        &mut self,
        ring: &mut AccountKeyRing,
        peer: PeerId,
        key: [u8; 16],
    ) -> Result<()> {
        ring.add(AccountKeyEntry { key, peer: Some(peer) });
        self.pending_account_key = None;
        self.reset();
        Ok(())
    }

    /// Handles an Additional-Data characteristic write (personalized name etc).
    #[cfg(feature = "additional-data")]
    pub fn on_additional_data_write(&mut self, payload: &[u8]) -> Result<Option<(u8, Vec<u8, 64>)>> {
        if self.state != PairingState::WaitAdditionalData {
            return Err(EngineError::Unauthenticated);
        }
        let key = self.shared_key.ok_or(EngineError::Unauthenticated)?;
        let data_id = self.pending_data_id.ok_or(EngineError::Unauthenticated)?;
        let plaintext = crate::additional_data::decode(&key, payload)?;

        self.reset();

        if data_id == 1 {
            let mut out = Vec::new();
            out.extend_from_slice(&plaintext).ok();
            Ok(Some((data_id, out)))
        } else {
            // Matches a quirk in the reference client where unsupported data
            // ids still complete successfully; see DESIGN.md open questions.
            Ok(None)
        }
    }

    /// Offers a peer as a retroactive-pairing candidate, e.g. on Message
    /// Stream connect after the peer bonded through some other means.
    pub fn offer_retroactive(&mut self, peer: PeerId, now_ms: u32) {
        self.evict_expired_retroactive(now_ms);
        self.add_retroactive(peer, now_ms);
    }
}

impl Default for FastPairEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeHal {
        public_addr: u64,
        ble_addr: u64,
        passkey: u32,
        notifications: std::vec::Vec<(PeerId, u8, std::vec::Vec<u8>)>,
        paired_with: Option<PeerId>,
        remote_passkey: Option<u32>,
        rand_byte: u8,
    }

    impl FakeHal {
        fn new() -> Self {
            FakeHal {
                public_addr: 0xA0A1A2A3A4A5,
                ble_addr: 0xA0A1A2A3A4A5,
                passkey: 123456,
                notifications: std::vec::Vec::new(),
                paired_with: None,
                remote_passkey: None,
                rand_byte: 0x42,
            }
        }
    }

    impl OsHal for FakeHal {
        fn now_ms(&self) -> u32 {
            0
        }
        fn persistent_time_s(&self) -> u32 {
            0
        }
        fn rand_u8(&mut self) -> u8 {
            self.rand_byte = self.rand_byte.wrapping_add(1);
            self.rand_byte
        }
        fn start_timer(&mut self, _delay_ms: u32) -> crate::hal::TimerHandle {
            0
        }
        fn cancel_timer(&mut self, _handle: crate::hal::TimerHandle) {}
        fn has_user_consent_for_reading_eik(&self) -> bool {
            false
        }
    }

    impl BtHal for FakeHal {
        fn model_id(&self) -> u32 {
            0x00_0A_42
        }
        fn tx_level(&self) -> i8 {
            8
        }
        fn public_address(&self) -> PeerId {
            self.public_addr
        }
        fn secondary_public_address(&self) -> Option<PeerId> {
            None
        }
        fn ble_address(&self) -> PeerId {
            self.ble_addr
        }
        fn set_ble_address(&mut self, addr: PeerId) -> PeerId {
            self.ble_addr = addr;
            addr
        }
        fn pairing_passkey(&self) -> u32 {
            self.passkey
        }
        fn set_remote_passkey(&mut self, passkey: u32) -> Result<()> {
            self.remote_passkey = Some(passkey);
            Ok(())
        }
        fn send_pairing_request(&mut self, peer: PeerId) -> Result<()> {
            self.paired_with = Some(peer);
            Ok(())
        }
        fn set_device_name(&mut self, _name: &str) -> Result<()> {
            Ok(())
        }
        fn is_in_pairing_mode(&self) -> bool {
            true
        }
    }

    impl BleHal for FakeHal {
        fn gatt_notify(&mut self, peer: PeerId, characteristic: u8, data: &[u8]) -> Result<()> {
            self.notifications.push((peer, characteristic, data.to_vec()));
            Ok(())
        }
        fn set_advertisement(
            &mut self,
            _data: &[u8],
            _interval: crate::hal::AdvertisingInterval,
        ) -> Result<()> {
            Ok(())
        }
        fn send_message_stream(&mut self, _peer: PeerId, _data: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn unsupported_payload_length_is_rejected_without_throttling() {
        let mut engine = FastPairEngine::new();
        let mut ring = AccountKeyRing::new();
        let mut hal = FakeHal::new();
        let priv_key = [0x11u8; 32];
        let err = engine
            .on_key_based_pairing_write(&mut hal, &mut ring, 1, 0, &[0u8; 20], &priv_key)
            .unwrap_err();
        assert_eq!(err, EngineError::InvalidInput);
        assert_eq!(engine.state(), PairingState::Idle);
    }

    #[test]
    fn repeated_failures_trip_the_throttle() {
        let mut engine = FastPairEngine::new();
        let mut ring = AccountKeyRing::new();
        let mut hal = FakeHal::new();
        let priv_key = [0x11u8; 32];

        // 16-byte branch with no matching ring entry always fails to match.
        for _ in 0..MAX_FAIL {
            let _ = engine.on_key_based_pairing_write(&mut hal, &mut ring, 1, 0, &[0u8; 16], &priv_key);
        }
        // Now blocked: even a structurally invalid write returns Ok (silent).
        let result = engine.on_key_based_pairing_write(&mut hal, &mut ring, 1, 1000, &[0u8; 16], &priv_key);
        assert!(result.is_ok());

        // After the block window, throttle resets and writes are evaluated again.
        let result = engine.on_key_based_pairing_write(
            &mut hal,
            &mut ring,
            1,
            6 * 60 * 1000,
            &[0u8; 20],
            &priv_key,
        );
        assert_eq!(result.unwrap_err(), EngineError::InvalidInput);
    }

    #[test]
    fn post_pairing_steps_install_account_key() {
        let mut engine = FastPairEngine::new();
        let mut ring = AccountKeyRing::new();
        engine.shared_key = Some([0x22u8; 16]);
        engine.active_peer = Some(42);
        engine.state = PairingState::WaitAccountKeyWrite;

        let mut plaintext = [0u8; 16];
        plaintext[0] = 0x04;
        plaintext[1] = 0x99;
        let mut ciphertext = plaintext;
        aes128_ecb_encrypt(&[0x22u8; 16], &mut ciphertext);

        engine.on_account_key_write(&mut ring, 42, 0, &ciphertext).unwrap();
        assert_eq!(ring.count(), 1);
        assert_eq!(ring.entry(0).unwrap().key, plaintext);
        assert_eq!(engine.state(), PairingState::Idle);
    }

    #[test]
    fn early_account_key_write_is_stashed_until_paired() {
        let mut engine = FastPairEngine::new();
        let mut ring = AccountKeyRing::new();
        engine.shared_key = Some([0x33u8; 16]);
        engine.active_peer = Some(7);
        engine.state = PairingState::WaitPasskey;

        let mut plaintext = [0u8; 16];
        plaintext[0] = 0x04;
        let mut ciphertext = plaintext;
        aes128_ecb_encrypt(&[0x33u8; 16], &mut ciphertext);

        engine.on_account_key_write(&mut ring, 7, 0, &ciphertext).unwrap();
        assert_eq!(ring.count(), 0);

        engine.on_paired(&mut ring, 7).unwrap();
        assert_eq!(ring.count(), 1);
    }
}
