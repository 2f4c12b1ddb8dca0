//! Smart Audio Source Switching sub-protocol: HMAC-authenticated messages
//! layered on top of Message Stream group 7.
//!
//! Grounded on `nearby_fp_library.c`'s `nearby_fp_VerifyMessageAuthenticationCode`.

use heapless::Vec;

use crate::crypto::{ct_eq, hmac_sha256};
use crate::error::{EngineError, Result};

pub const GROUP_SASS: u8 = 7;

pub const OP_GET_CAPABILITY: u8 = 0;
pub const OP_NOTIFY_CAPABILITY: u8 = 1;
pub const OP_INDICATE_IN_USE_ACCOUNT_KEY: u8 = 2;
pub const OP_SET_MULTIPOINT_STATE: u8 = 3;
pub const OP_SET_SWITCHING_PREFERENCE: u8 = 4;
pub const OP_GET_SWITCHING_PREFERENCE: u8 = 5;
pub const OP_SWITCH_ACTIVE_AUDIO_SOURCE: u8 = 6;
pub const OP_SWITCH_BACK_AUDIO_SOURCE: u8 = 7;
pub const OP_GET_CONNECTION_STATUS: u8 = 8;
pub const OP_NOTIFY_CONNECTION_STATUS: u8 = 9;
pub const OP_NOTIFY_SASS_INITIATED_CONNECTION: u8 = 10;
pub const OP_SEND_CUSTOM_DATA: u8 = 11;
pub const OP_SET_DROP_CONNECTION_TARGET: u8 = 12;
pub const OP_NOTIFY_MULTIPOINT_SWITCH_EVENT: u8 = 13;

/// `NotifyMultipointSwitchEvent`'s `self_or_other` byte: this device gained
/// the active source.
pub const SWITCH_EVENT_SELF: u8 = 1;
/// `NotifyMultipointSwitchEvent`'s `self_or_other` byte: a different peer
/// gained the active source.
pub const SWITCH_EVENT_OTHER: u8 = 2;

const MESSAGE_NONCE_LEN: usize = 8;
const MAC_LEN: usize = 8;

/// Appends `message_nonce(8) || HMAC-SHA256(account_key, session_nonce||message_nonce||payload)[0..8]`
/// to `payload`, producing a signed SASS message body.
pub fn sign(
    account_key: &[u8; 16],
    session_nonce: &[u8; 8],
    message_nonce: &[u8; MESSAGE_NONCE_LEN],
    payload: &[u8],
) -> Vec<u8, 96> {
    let mut mac_input: Vec<u8, 96> = Vec::new();
    mac_input.extend_from_slice(session_nonce).ok();
    mac_input.extend_from_slice(message_nonce).ok();
    mac_input.extend_from_slice(payload).ok();
    let mac = hmac_sha256(account_key, &mac_input);

    let mut out: Vec<u8, 96> = Vec::new();
    out.extend_from_slice(payload).ok();
    out.extend_from_slice(message_nonce).ok();
    out.extend_from_slice(&mac[0..MAC_LEN]).ok();
    out
}

/// Verifies a signed SASS message, returning the unsigned payload.
pub fn verify<'a>(
    account_key: &[u8; 16],
    session_nonce: &[u8; 8],
    signed: &'a [u8],
) -> Result<&'a [u8]> {
    if signed.len() < MESSAGE_NONCE_LEN + MAC_LEN {
        return Err(EngineError::InvalidInput);
    }
    let split = signed.len() - MESSAGE_NONCE_LEN - MAC_LEN;
    let (payload, tail) = signed.split_at(split);
    let (message_nonce, mac) = tail.split_at(MESSAGE_NONCE_LEN);

    let mut mac_input: Vec<u8, 96> = Vec::new();
    mac_input.extend_from_slice(session_nonce).ok();
    mac_input.extend_from_slice(message_nonce).ok();
    mac_input.extend_from_slice(payload).ok();
    let expected = hmac_sha256(account_key, &mac_input);

    if !ct_eq(&expected[0..MAC_LEN], mac) {
        return Err(EngineError::Unauthenticated);
    }
    Ok(payload)
}

/// Builds the 12-byte `NotifyConnectionStatus` body: `is_this_peer_active(1)
/// || conn_state(1) || cap_flags(2) || session_nonce(8)`.
pub fn connection_status_payload(is_this_peer_active: bool, conn_state: u8, cap_flags: u16, session_nonce: &[u8; 8]) -> [u8; 12] {
    let mut out = [0u8; 12];
    out[0] = is_this_peer_active as u8;
    out[1] = conn_state;
    out[2..4].copy_from_slice(&cap_flags.to_be_bytes());
    out[4..12].copy_from_slice(session_nonce);
    out
}

/// Builds the 8-byte `NotifyMultipointSwitchEvent` body: `reason(1) ||
/// self_or_other(1) || trailing_address_or_name(6)`.
pub fn multipoint_switch_event_payload(reason: u8, self_or_other: u8, trailer: [u8; 6]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[0] = reason;
    out[1] = self_or_other;
    out[2..8].copy_from_slice(&trailer);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_roundtrips() {
        let key = [0x5u8; 16];
        let session_nonce = [9u8; 8];
        let message_nonce = [1, 2, 3, 4, 5, 6, 7, 8];
        let payload = b"switch-source";
        let signed = sign(&key, &session_nonce, &message_nonce, payload);
        let verified = verify(&key, &session_nonce, &signed).unwrap();
        assert_eq!(verified, payload);
    }

    #[test]
    fn wrong_session_nonce_is_rejected() {
        let key = [0x5u8; 16];
        let signed = sign(&key, &[1u8; 8], &[2u8; 8], b"data");
        let err = verify(&key, &[9u8; 8], &signed).unwrap_err();
        assert_eq!(err, EngineError::Unauthenticated);
    }

    #[test]
    fn connection_status_payload_is_twelve_bytes_with_trailing_nonce() {
        let nonce = [9u8; 8];
        let body = connection_status_payload(true, 2, 0x0102, &nonce);
        assert_eq!(body[0], 1);
        assert_eq!(body[1], 2);
        assert_eq!(&body[2..4], &[0x01, 0x02]);
        assert_eq!(&body[4..12], &nonce);
    }

    #[test]
    fn multipoint_switch_event_marks_self_vs_other() {
        let body = multipoint_switch_event_payload(0, SWITCH_EVENT_SELF, [1, 2, 3, 4, 5, 6]);
        assert_eq!(body[1], SWITCH_EVENT_SELF);
        let body = multipoint_switch_event_payload(0, SWITCH_EVENT_OTHER, [1, 2, 3, 4, 5, 6]);
        assert_eq!(body[1], SWITCH_EVENT_OTHER);
    }
}
