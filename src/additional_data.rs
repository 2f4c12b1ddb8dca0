//! Additional Data codec: HMAC-then-CTR framing used by the Additional-Data
//! GATT characteristic and by SPOT's encrypted payloads.
//!
//! Grounded on `nearby_fp_library.c`'s `nearby_fp_EncodeAdditionalData` /
//! `nearby_fp_DecodeAdditionalData`. The reference implementation verifies
//! the HMAC prefix with a plain `memcmp`; this module uses [`crate::crypto::ct_eq`]
//! instead, per the spec's explicit constant-time requirement.

use heapless::Vec;

use crate::crypto::{aes_ctr, ct_eq, hmac_sha256};
use crate::error::{EngineError, Result};

const HMAC_PREFIX_LEN: usize = 8;
const IV_LEN: usize = 16;
const NONCE_LEN: usize = 8;
const MAX_PLAINTEXT: usize = 64;

/// Encrypts `plaintext` under `account_key`, producing
/// `HMAC[0..8] || IV(16) || ciphertext`. `nonce` supplies the first 8 bytes
/// of the IV; the embedder is expected to pass fresh random bytes.
pub fn encode(
    account_key: &[u8; 16],
    nonce: &[u8; 8],
    plaintext: &[u8],
) -> Result<Vec<u8, { HMAC_PREFIX_LEN + IV_LEN + MAX_PLAINTEXT }>> {
    if plaintext.len() > MAX_PLAINTEXT {
        return Err(EngineError::InvalidInput);
    }

    let mut ctr_buf: Vec<u8, { NONCE_LEN + MAX_PLAINTEXT }> = Vec::new();
    ctr_buf.extend_from_slice(nonce).ok();
    ctr_buf.extend_from_slice(plaintext).ok();
    aes_ctr(account_key, &mut ctr_buf);

    let mut iv = [0u8; IV_LEN];
    iv[0..NONCE_LEN].copy_from_slice(nonce);

    let mut hmac_input: Vec<u8, { IV_LEN + MAX_PLAINTEXT }> = Vec::new();
    hmac_input.extend_from_slice(&iv).ok();
    hmac_input.extend_from_slice(&ctr_buf[NONCE_LEN..]).ok();
    let mac = hmac_sha256(account_key, &hmac_input);

    let mut out = Vec::new();
    out.extend_from_slice(&mac[0..HMAC_PREFIX_LEN]).ok();
    out.extend_from_slice(&hmac_input).ok();
    Ok(out)
}

/// Verifies and decrypts a frame produced by [`encode`].
pub fn decode(account_key: &[u8; 16], frame: &[u8]) -> Result<Vec<u8, MAX_PLAINTEXT>> {
    if frame.len() < HMAC_PREFIX_LEN + IV_LEN {
        return Err(EngineError::InvalidInput);
    }
    let (prefix, rest) = frame.split_at(HMAC_PREFIX_LEN);
    let mac = hmac_sha256(account_key, rest);
    if !ct_eq(&mac[0..HMAC_PREFIX_LEN], prefix) {
        return Err(EngineError::Unauthenticated);
    }

    let (iv, ciphertext) = rest.split_at(IV_LEN);
    let mut ctr_buf: Vec<u8, { NONCE_LEN + MAX_PLAINTEXT }> = Vec::new();
    ctr_buf.extend_from_slice(&iv[0..NONCE_LEN]).ok();
    ctr_buf.extend_from_slice(ciphertext).ok();
    aes_ctr(account_key, &mut ctr_buf);

    let mut out = Vec::new();
    out.extend_from_slice(&ctr_buf[NONCE_LEN..]).ok();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_roundtrips() {
        let key = [0x77u8; 16];
        let nonce = [1, 2, 3, 4, 5, 6, 7, 8];
        let plaintext = b"hello accessory";
        let frame = encode(&key, &nonce, plaintext).unwrap();
        let decoded = decode(&key, &frame).unwrap();
        assert_eq!(&decoded[..], plaintext);
    }

    #[test]
    fn tampering_with_ciphertext_is_rejected() {
        let key = [0x77u8; 16];
        let nonce = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut frame = encode(&key, &nonce, b"hello").unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert_eq!(decode(&key, &frame).unwrap_err(), EngineError::Unauthenticated);
    }
}
