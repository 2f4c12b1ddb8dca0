//! SPOT (Find My Device Network) beacon engine.
//!
//! Grounded on `nearby_spot.c` in full: `GenerateEphemeralId`, `ComputeKey`/
//! `ComputeRecoveryKey`/`ComputeRingKey`/`ComputeUnwantedTrackingProtectionKey`,
//! `VerifyOrGenerateAuthenticationKey`, and `nearby_spot_WriteBeaconAction`.

use heapless::Vec;

use crate::crypto::{aes128_ecb_encrypt, aes256_ecb_encrypt, ct_eq, hmac_sha256, secp160r1_public_key, sha256};
use crate::error::{EngineError, Result};
use crate::hal::PeerId;

pub const ROTATION_PERIOD_EXPONENT: u32 = 10;
const CLOCK_MASK: u32 = !((1u32 << ROTATION_PERIOD_EXPONENT) - 1);

pub const OP_READ_BEACON_PARAMETERS: u8 = 0x00;
pub const OP_READ_PROVISIONING_STATE: u8 = 0x01;
pub const OP_SET_EPHEMERAL_IDENTITY_KEY: u8 = 0x02;
pub const OP_CLEAR_EPHEMERAL_IDENTITY_KEY: u8 = 0x03;
pub const OP_READ_EPHEMERAL_IDENTITY_KEY: u8 = 0x04;
pub const OP_RING: u8 = 0x05;
pub const OP_READ_RINGING_STATE: u8 = 0x06;
pub const OP_ACTIVATE_UTP: u8 = 0x07;
pub const OP_DEACTIVATE_UTP: u8 = 0x08;

const AUTH_LEN: usize = 8;
const NONCE_LEN: usize = 8;
const PROTOCOL_MAJOR_VERSION: u8 = 1;

/// `nearby_spot_kCurveType`: this engine always reports secp160r1, the only
/// curve it derives EIDs with.
const CURVE_TYPE_SECP160R1: u8 = 0x00;

/// `ActivateUnwantedTrackingProtection`'s `control_flags` bit that lets `Ring`
/// skip RingKey authentication while UTP is active.
const CONTROL_FLAG_SKIP_RINGING_AUTH: u8 = 0x01;

/// Current ringing command state, reported back by `ReadRingingState`.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct RingingInfo {
    pub components: u8,
    pub timeout_ds: u16,
}

/// Hardware/configuration facts the engine façade supplies for
/// `ReadBeaconParameters` and EID derivation; SPOT itself has no HAL access.
#[derive(Clone, Copy)]
pub struct BeaconHardwareInfo {
    pub tx_power: i8,
    pub clock_s: u32,
    pub num_ring_components: u8,
    pub ring_volume_caps: u8,
}

/// Mutable SPOT state: EIK, owner key, the single-use read nonce, and the
/// Unwanted Tracking Protection mode.
pub struct SpotState {
    pub ephemeral_key: Option<[u8; 32]>,
    pub owner_key: Option<[u8; 16]>,
    nonce: Option<([u8; NONCE_LEN], PeerId)>,
    pub utp_on: bool,
    pub control_flags: u8,
    pub remote_address: Option<PeerId>,
    pub ringing: RingingInfo,
}

impl SpotState {
    pub fn new() -> Self {
        SpotState {
            ephemeral_key: None,
            owner_key: None,
            nonce: None,
            utp_on: false,
            control_flags: 0,
            remote_address: None,
            ringing: RingingInfo::default(),
        }
    }

    pub fn has_ephemeral_key(&self) -> bool {
        self.ephemeral_key.is_some()
    }

    /// Read Beacon Action: latches the reader as `remote_address`, issues a
    /// fresh nonce, and returns the 9-byte response.
    pub fn read_beacon_action(&mut self, reader: PeerId, nonce: [u8; NONCE_LEN]) -> [u8; 9] {
        self.remote_address = Some(reader);
        self.nonce = Some((nonce, reader));

        let mut out = [0u8; 9];
        out[0] = PROTOCOL_MAJOR_VERSION;
        out[1..9].copy_from_slice(&nonce);
        out
    }
}

impl Default for SpotState {
    fn default() -> Self {
        Self::new()
    }
}

/// `SHA-256(EIK || suffix)[0..8]`.
fn compute_key(eik: &[u8; 32], suffix: u8) -> [u8; 8] {
    let mut input = [0u8; 33];
    input[0..32].copy_from_slice(eik);
    input[32] = suffix;
    let digest = sha256(&input);
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[0..8]);
    out
}

pub fn recovery_key(eik: &[u8; 32]) -> [u8; 8] {
    compute_key(eik, 0x01)
}

pub fn ring_key(eik: &[u8; 32]) -> [u8; 8] {
    compute_key(eik, 0x02)
}

pub fn unwanted_tracking_protection_key(eik: &[u8; 32]) -> [u8; 8] {
    compute_key(eik, 0x03)
}

/// Builds the buffer HMAC'd/SHA'd to authenticate a request or response:
/// `major_version || nonce || opcode || data_length || additional [|| trailer]`.
fn auth_message(nonce: &[u8; NONCE_LEN], opcode: u8, additional: &[u8], trailer: Option<u8>) -> Vec<u8, 96> {
    let mut buf: Vec<u8, 96> = Vec::new();
    buf.push(PROTOCOL_MAJOR_VERSION).ok();
    buf.extend_from_slice(nonce).ok();
    buf.push(opcode).ok();
    buf.push(additional.len() as u8).ok();
    buf.extend_from_slice(additional).ok();
    if let Some(t) = trailer {
        buf.push(t).ok();
    }
    buf
}

/// HMAC-based auth tag for a request (key-auth variant).
pub fn hmac_auth_tag(key: &[u8], nonce: &[u8; NONCE_LEN], opcode: u8, additional: &[u8]) -> [u8; 8] {
    let msg = auth_message(nonce, opcode, additional, None);
    let full = hmac_sha256(key, &msg);
    let mut out = [0u8; 8];
    out.copy_from_slice(&full[0..8]);
    out
}

/// HMAC-based auth tag for a response, with the domain-separation trailer byte.
pub fn hmac_response_tag(key: &[u8], nonce: &[u8; NONCE_LEN], opcode: u8, additional: &[u8]) -> [u8; 8] {
    let msg = auth_message(nonce, opcode, additional, Some(0x01));
    let full = hmac_sha256(key, &msg);
    let mut out = [0u8; 8];
    out.copy_from_slice(&full[0..8]);
    out
}

/// Direct proof-of-possession tag: `SHA-256(key || nonce)[0..8]`.
pub fn direct_auth_tag(key: &[u8], nonce: &[u8; NONCE_LEN]) -> [u8; 8] {
    let mut input: Vec<u8, 64> = Vec::new();
    input.extend_from_slice(key).ok();
    input.extend_from_slice(nonce).ok();
    let digest = sha256(&input);
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[0..8]);
    out
}

/// Derives the 20-byte Ephemeral Identifier and a 1-byte selector from the
/// EIK and a persistent clock reading.
pub fn generate_ephemeral_id(eik: &[u8; 32], persistent_time_s: u32) -> ([u8; 20], u8) {
    let masked = persistent_time_s & CLOCK_MASK;
    let masked_be = masked.to_be_bytes();

    let mut buffer = [0u8; 32];
    for b in buffer[0..11].iter_mut() {
        *b = 0xFF;
    }
    buffer[11] = ROTATION_PERIOD_EXPONENT as u8;
    buffer[12..16].copy_from_slice(&masked_be);
    // bytes 16..27 already zero
    buffer[27] = ROTATION_PERIOD_EXPONENT as u8;
    buffer[28..32].copy_from_slice(&masked_be);

    let mut block0 = [0u8; 16];
    block0.copy_from_slice(&buffer[0..16]);
    aes256_ecb_encrypt(eik, &mut block0);
    let mut block1 = [0u8; 16];
    block1.copy_from_slice(&buffer[16..32]);
    aes256_ecb_encrypt(eik, &mut block1);

    let mut encrypted = [0u8; 32];
    encrypted[0..16].copy_from_slice(&block0);
    encrypted[16..32].copy_from_slice(&block1);

    secp160r1_public_key(&encrypted)
}

/// Result of processing a Write Beacon Action request that produces a reply.
pub struct WriteBeaconResult {
    pub response_opcode: u8,
    pub auth_response: [u8; AUTH_LEN],
    pub additional: Vec<u8, 64>,
}

/// Outcome of [`SpotState::write_beacon_action`]. `Ring` carries no GATT
/// response of its own (the ring HAL call's completion is reported later via
/// an unsolicited opcode `0x05` notification), so it is distinguished from
/// `Response`.
pub enum WriteBeaconOutcome {
    Response(WriteBeaconResult),
    Ring { components: u8, timeout_ds: u16, volume: u8 },
}

/// Processes a SPOT Write Beacon Action request.
///
/// `any_account_key`/`owner_key_hmac_ok` etc. are supplied by the caller
/// (the engine façade), which has access to the account key ring; this
/// function focuses purely on the opcode state machine and crypto checks.
pub struct WriteBeaconRequest<'a> {
    pub reader: PeerId,
    pub opcode: u8,
    pub auth: &'a [u8; AUTH_LEN],
    pub additional: &'a [u8],
}

impl SpotState {
    #[allow(clippy::too_many_lines)]
    pub fn write_beacon_action(
        &mut self,
        req: WriteBeaconRequest<'_>,
        owner_key: Option<[u8; 16]>,
        any_account_keys: &[[u8; 16]],
        hw: BeaconHardwareInfo,
        user_consent: bool,
    ) -> Result<WriteBeaconOutcome> {
        if self.remote_address != Some(req.reader) {
            return Err(EngineError::Unauthenticated);
        }
        let (nonce, nonce_peer) = self.nonce.take().ok_or(EngineError::Unauthenticated)?;
        if nonce_peer != req.reader {
            return Err(EngineError::Unauthenticated);
        }

        match req.opcode {
            OP_READ_BEACON_PARAMETERS => {
                let key = self.verify_any_account_key(&nonce, req.opcode, req.additional, req.auth, any_account_keys)?;
                let mut block = [0u8; 16];
                block[0] = hw.tx_power as u8;
                block[1..5].copy_from_slice(&hw.clock_s.to_be_bytes());
                block[5] = CURVE_TYPE_SECP160R1;
                block[6] = hw.num_ring_components;
                block[7] = hw.ring_volume_caps;
                aes128_ecb_encrypt(&key, &mut block);
                let mut additional: Vec<u8, 64> = Vec::new();
                additional.extend_from_slice(&block).ok();
                let auth_response = hmac_response_tag(&key, &nonce, req.opcode, &additional);
                Ok(WriteBeaconOutcome::Response(WriteBeaconResult {
                    response_opcode: req.opcode,
                    auth_response,
                    additional,
                }))
            }
            OP_READ_PROVISIONING_STATE => {
                let key = self.verify_any_account_key(&nonce, req.opcode, req.additional, req.auth, any_account_keys)?;
                if self.owner_key.is_none() {
                    self.owner_key = Some(key);
                }
                let matched_owner = Some(key) == self.owner_key;
                let mut additional: Vec<u8, 64> = Vec::new();
                let status = (self.has_ephemeral_key() as u8) | ((matched_owner as u8) << 1);
                additional.push(status).ok();
                if let Some(eik) = self.ephemeral_key {
                    let (eid, _) = generate_ephemeral_id(&eik, hw.clock_s);
                    additional.extend_from_slice(&eid).ok();
                }
                let auth_response = hmac_response_tag(&key, &nonce, req.opcode, &additional);
                Ok(WriteBeaconOutcome::Response(WriteBeaconResult {
                    response_opcode: req.opcode,
                    auth_response,
                    additional,
                }))
            }
            OP_SET_EPHEMERAL_IDENTITY_KEY => {
                let key = owner_key.ok_or(EngineError::Unauthenticated)?;
                if !ct_eq(&hmac_auth_tag(&key, &nonce, req.opcode, req.additional), req.auth) {
                    return Err(EngineError::Unauthenticated);
                }
                match req.additional.len() {
                    32 if !self.has_ephemeral_key() => {
                        let mut eik = [0u8; 32];
                        let mut b0 = [0u8; 16];
                        b0.copy_from_slice(&req.additional[0..16]);
                        crate::crypto::aes256_ecb_decrypt(&key, &mut b0);
                        let mut b1 = [0u8; 16];
                        b1.copy_from_slice(&req.additional[16..32]);
                        crate::crypto::aes256_ecb_decrypt(&key, &mut b1);
                        eik[0..16].copy_from_slice(&b0);
                        eik[16..32].copy_from_slice(&b1);
                        self.ephemeral_key = Some(eik);
                    }
                    40 if self.has_ephemeral_key() => {
                        let old_eik = self.ephemeral_key.ok_or(EngineError::InvalidValue)?;
                        let proof = &req.additional[32..40];
                        let mut expected = [0u8; 8];
                        expected.copy_from_slice(&sha256(&concat_key_nonce(&old_eik, &nonce))[0..8]);
                        if !ct_eq(&expected, proof) {
                            return Err(EngineError::Unauthenticated);
                        }
                        let mut eik = [0u8; 32];
                        let mut b0 = [0u8; 16];
                        b0.copy_from_slice(&req.additional[0..16]);
                        crate::crypto::aes256_ecb_decrypt(&key, &mut b0);
                        let mut b1 = [0u8; 16];
                        b1.copy_from_slice(&req.additional[16..32]);
                        crate::crypto::aes256_ecb_decrypt(&key, &mut b1);
                        eik[0..16].copy_from_slice(&b0);
                        eik[16..32].copy_from_slice(&b1);
                        self.ephemeral_key = Some(eik);
                    }
                    _ => return Err(EngineError::InvalidValue),
                }
                let additional: Vec<u8, 64> = Vec::new();
                let auth_response = hmac_response_tag(&key, &nonce, req.opcode, &additional);
                Ok(WriteBeaconOutcome::Response(WriteBeaconResult {
                    response_opcode: req.opcode,
                    auth_response,
                    additional,
                }))
            }
            OP_CLEAR_EPHEMERAL_IDENTITY_KEY => {
                let key = owner_key.ok_or(EngineError::Unauthenticated)?;
                if !ct_eq(&hmac_auth_tag(&key, &nonce, req.opcode, req.additional), req.auth) {
                    return Err(EngineError::Unauthenticated);
                }
                let eik = self.ephemeral_key.ok_or(EngineError::InvalidValue)?;
                if req.additional.len() != 8 {
                    return Err(EngineError::InvalidValue);
                }
                let expected = direct_auth_tag(&eik, &nonce);
                if !ct_eq(&expected, req.additional) {
                    return Err(EngineError::Unauthenticated);
                }
                self.ephemeral_key = None;
                let additional: Vec<u8, 64> = Vec::new();
                let auth_response = hmac_response_tag(&key, &nonce, req.opcode, &additional);
                Ok(WriteBeaconOutcome::Response(WriteBeaconResult {
                    response_opcode: req.opcode,
                    auth_response,
                    additional,
                }))
            }
            OP_READ_EPHEMERAL_IDENTITY_KEY => {
                if !user_consent {
                    return Err(EngineError::NoUserConsent);
                }
                let eik = self.ephemeral_key.ok_or(EngineError::InvalidValue)?;
                let key = recovery_key(&eik);
                if !ct_eq(&hmac_auth_tag(&key, &nonce, req.opcode, req.additional), req.auth) {
                    return Err(EngineError::Unauthenticated);
                }
                let owner = self.owner_key.ok_or(EngineError::InvalidValue)?;
                let mut additional: Vec<u8, 64> = Vec::new();
                let mut b0 = [0u8; 16];
                b0.copy_from_slice(&eik[0..16]);
                aes256_ecb_encrypt(&owner, &mut b0);
                let mut b1 = [0u8; 16];
                b1.copy_from_slice(&eik[16..32]);
                aes256_ecb_encrypt(&owner, &mut b1);
                additional.extend_from_slice(&b0).ok();
                additional.extend_from_slice(&b1).ok();
                let auth_response = hmac_response_tag(&key, &nonce, req.opcode, &additional);
                Ok(WriteBeaconOutcome::Response(WriteBeaconResult {
                    response_opcode: req.opcode,
                    auth_response,
                    additional,
                }))
            }
            OP_RING => {
                let eik = self.ephemeral_key.ok_or(EngineError::InvalidValue)?;
                let skip_auth = self.utp_on && (self.control_flags & CONTROL_FLAG_SKIP_RINGING_AUTH != 0);
                if !skip_auth {
                    let key = ring_key(&eik);
                    if !ct_eq(&hmac_auth_tag(&key, &nonce, req.opcode, req.additional), req.auth) {
                        return Err(EngineError::Unauthenticated);
                    }
                }
                let cmd = req.additional.first().copied().unwrap_or(0);
                if cmd == 0 {
                    self.ringing = RingingInfo::default();
                    Ok(WriteBeaconOutcome::Ring { components: 0, timeout_ds: 0, volume: 0 })
                } else {
                    if req.additional.len() < 4 {
                        return Err(EngineError::InvalidValue);
                    }
                    let timeout_ds = u16::from_be_bytes([req.additional[1], req.additional[2]]);
                    let volume = req.additional[3];
                    self.ringing = RingingInfo { components: cmd, timeout_ds };
                    Ok(WriteBeaconOutcome::Ring { components: cmd, timeout_ds, volume })
                }
            }
            OP_READ_RINGING_STATE => {
                let eik = self.ephemeral_key.ok_or(EngineError::InvalidValue)?;
                let key = ring_key(&eik);
                if !ct_eq(&hmac_auth_tag(&key, &nonce, req.opcode, req.additional), req.auth) {
                    return Err(EngineError::Unauthenticated);
                }
                let mut additional: Vec<u8, 64> = Vec::new();
                additional.push(self.ringing.components).ok();
                additional.extend_from_slice(&self.ringing.timeout_ds.to_be_bytes()).ok();
                let auth_response = hmac_response_tag(&key, &nonce, req.opcode, &additional);
                Ok(WriteBeaconOutcome::Response(WriteBeaconResult {
                    response_opcode: req.opcode,
                    auth_response,
                    additional,
                }))
            }
            OP_ACTIVATE_UTP => {
                let eik = self.ephemeral_key.ok_or(EngineError::InvalidValue)?;
                let key = unwanted_tracking_protection_key(&eik);
                if !ct_eq(&hmac_auth_tag(&key, &nonce, req.opcode, req.additional), req.auth) {
                    return Err(EngineError::Unauthenticated);
                }
                self.utp_on = true;
                if let Some(&flags) = req.additional.first() {
                    self.control_flags = flags;
                }
                let additional: Vec<u8, 64> = Vec::new();
                let auth_response = hmac_response_tag(&key, &nonce, req.opcode, &additional);
                Ok(WriteBeaconOutcome::Response(WriteBeaconResult {
                    response_opcode: req.opcode,
                    auth_response,
                    additional,
                }))
            }
            OP_DEACTIVATE_UTP => {
                let eik = self.ephemeral_key.ok_or(EngineError::InvalidValue)?;
                let key = unwanted_tracking_protection_key(&eik);
                if !ct_eq(&hmac_auth_tag(&key, &nonce, req.opcode, req.additional), req.auth) {
                    return Err(EngineError::Unauthenticated);
                }
                if req.additional.len() != 8 {
                    return Err(EngineError::InvalidValue);
                }
                let expected = direct_auth_tag(&eik, &nonce);
                if !ct_eq(&expected, req.additional) {
                    return Err(EngineError::Unauthenticated);
                }
                self.utp_on = false;
                self.control_flags = 0;
                let additional: Vec<u8, 64> = Vec::new();
                let auth_response = hmac_response_tag(&key, &nonce, req.opcode, &additional);
                Ok(WriteBeaconOutcome::Response(WriteBeaconResult {
                    response_opcode: req.opcode,
                    auth_response,
                    additional,
                }))
            }
            _ => Err(EngineError::InvalidInput),
        }
    }

    fn verify_any_account_key(
        &self,
        nonce: &[u8; NONCE_LEN],
        opcode: u8,
        additional: &[u8],
        auth: &[u8; AUTH_LEN],
        any_account_keys: &[[u8; 16]],
    ) -> Result<[u8; 16]> {
        for key in any_account_keys {
            if ct_eq(&hmac_auth_tag(key, nonce, opcode, additional), auth) {
                return Ok(*key);
            }
        }
        Err(EngineError::Unauthenticated)
    }
}

fn concat_key_nonce(key: &[u8; 32], nonce: &[u8; NONCE_LEN]) -> Vec<u8, 40> {
    let mut out: Vec<u8, 40> = Vec::new();
    out.extend_from_slice(key).ok();
    out.extend_from_slice(nonce).ok();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hw() -> BeaconHardwareInfo {
        BeaconHardwareInfo { tx_power: 8, clock_s: 1_000_000, num_ring_components: 1, ring_volume_caps: 0x0F }
    }

    #[test]
    fn ephemeral_id_is_deterministic_for_same_clock_bucket() {
        let eik = [0x5Au8; 32];
        let (id_a, _) = generate_ephemeral_id(&eik, 1_000_000);
        let (id_b, _) = generate_ephemeral_id(&eik, 1_000_000 + 10);
        assert_eq!(id_a, id_b);
    }

    #[test]
    fn ephemeral_id_changes_across_rotation_buckets() {
        let eik = [0x5Au8; 32];
        let (id_a, _) = generate_ephemeral_id(&eik, 0);
        let (id_b, _) = generate_ephemeral_id(&eik, 1 << ROTATION_PERIOD_EXPONENT);
        assert_ne!(id_a, id_b);
    }

    #[test]
    fn provisioning_from_clean_state() {
        let mut state = SpotState::new();
        let owner = [0x10u8; 16];
        let nonce = [0x45u8; 8];
        state.read_beacon_action(1, nonce);

        let eik = [0x20u8; 32];
        let mut additional: Vec<u8, 64> = Vec::new();
        let mut b0 = [0u8; 16];
        b0.copy_from_slice(&eik[0..16]);
        aes256_ecb_encrypt(&owner, &mut b0);
        let mut b1 = [0u8; 16];
        b1.copy_from_slice(&eik[16..32]);
        aes256_ecb_encrypt(&owner, &mut b1);
        additional.extend_from_slice(&b0).ok();
        additional.extend_from_slice(&b1).ok();

        let auth = hmac_auth_tag(&owner, &nonce, OP_SET_EPHEMERAL_IDENTITY_KEY, &additional);
        let outcome = state
            .write_beacon_action(
                WriteBeaconRequest { reader: 1, opcode: OP_SET_EPHEMERAL_IDENTITY_KEY, auth: &auth, additional: &additional },
                Some(owner),
                &[],
                hw(),
                false,
            )
            .unwrap();

        match outcome {
            WriteBeaconOutcome::Response(result) => assert_eq!(result.response_opcode, OP_SET_EPHEMERAL_IDENTITY_KEY),
            WriteBeaconOutcome::Ring { .. } => panic!("expected a Response outcome"),
        }
        assert_eq!(state.ephemeral_key, Some(eik));
    }

    #[test]
    fn nonce_is_single_use() {
        let mut state = SpotState::new();
        let nonce = [7u8; 8];
        state.read_beacon_action(1, nonce);

        let keys = [[0x11u8; 16]];
        let auth = hmac_auth_tag(&keys[0], &nonce, OP_READ_BEACON_PARAMETERS, &[]);
        let req1 = WriteBeaconRequest { reader: 1, opcode: OP_READ_BEACON_PARAMETERS, auth: &auth, additional: &[] };
        assert!(state.write_beacon_action(req1, None, &keys, hw(), false).is_ok());

        let req2 = WriteBeaconRequest { reader: 1, opcode: OP_READ_BEACON_PARAMETERS, auth: &auth, additional: &[] };
        let err = state.write_beacon_action(req2, None, &keys, hw(), false).unwrap_err();
        assert_eq!(err, EngineError::Unauthenticated);
    }

    #[test]
    fn read_ephemeral_identity_key_requires_user_consent() {
        let mut state = SpotState::new();
        let eik = [0x20u8; 32];
        state.ephemeral_key = Some(eik);
        state.owner_key = Some([0x10u8; 16]);
        let nonce = [3u8; 8];
        state.read_beacon_action(1, nonce);

        let key = recovery_key(&eik);
        let auth = hmac_auth_tag(&key, &nonce, OP_READ_EPHEMERAL_IDENTITY_KEY, &[]);
        let req = WriteBeaconRequest { reader: 1, opcode: OP_READ_EPHEMERAL_IDENTITY_KEY, auth: &auth, additional: &[] };
        let err = state.write_beacon_action(req, None, &[], hw(), false).unwrap_err();
        assert_eq!(err, EngineError::NoUserConsent);
    }

    #[test]
    fn ring_has_no_direct_response_and_updates_ringing_state() {
        let mut state = SpotState::new();
        let eik = [0x30u8; 32];
        state.ephemeral_key = Some(eik);
        let nonce = [4u8; 8];
        state.read_beacon_action(1, nonce);

        let key = ring_key(&eik);
        let additional = [1u8, 0x00, 0x0A, 0x05];
        let auth = hmac_auth_tag(&key, &nonce, OP_RING, &additional);
        let req = WriteBeaconRequest { reader: 1, opcode: OP_RING, auth: &auth, additional: &additional };
        let outcome = state.write_beacon_action(req, None, &[], hw(), false).unwrap();
        match outcome {
            WriteBeaconOutcome::Ring { components, timeout_ds, volume } => {
                assert_eq!(components, 1);
                assert_eq!(timeout_ds, 0x000A);
                assert_eq!(volume, 5);
            }
            WriteBeaconOutcome::Response(_) => panic!("Ring must not produce a direct response"),
        }
        assert_eq!(state.ringing, RingingInfo { components: 1, timeout_ds: 0x000A });
    }
}
