//! Crypto kit: thin wrappers over RustCrypto primitives plus the one
//! hand-rolled curve (`secp160r1`) that has no off-the-shelf crate.
//!
//! Every function here is a direct analogue of one `nearby_fp_library.c`
//! primitive; see DESIGN.md for the mapping.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes256};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{EngineError, Result};
use crate::secp160r1;

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Streaming SHA-256, mirroring `nearby_fp_HmacSha256Start/Update/Finish`'s
/// incremental shape for callers that build the digest input piecewise.
pub struct Sha256Ctx(Sha256);

impl Sha256Ctx {
    pub fn new() -> Self {
        Sha256Ctx(Sha256::new())
    }
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }
    pub fn finish(self) -> [u8; 32] {
        self.0.finalize().into()
    }
}

impl Default for Sha256Ctx {
    fn default() -> Self {
        Self::new()
    }
}

/// AES-128 ECB encrypt a single 16-byte block in place.
pub fn aes128_ecb_encrypt(key: &[u8; 16], block: &mut [u8; 16]) {
    let cipher = Aes128::new(key.into());
    cipher.encrypt_block(block.into());
}

/// AES-128 ECB decrypt a single 16-byte block in place.
pub fn aes128_ecb_decrypt(key: &[u8; 16], block: &mut [u8; 16]) {
    let cipher = Aes128::new(key.into());
    cipher.decrypt_block(block.into());
}

/// AES-256 ECB encrypt a single 16-byte block in place.
pub fn aes256_ecb_encrypt(key: &[u8; 32], block: &mut [u8; 16]) {
    let cipher = Aes256::new(key.into());
    cipher.encrypt_block(block.into());
}

/// AES-256 ECB decrypt a single 16-byte block in place.
pub fn aes256_ecb_decrypt(key: &[u8; 32], block: &mut [u8; 16]) {
    let cipher = Aes256::new(key.into());
    cipher.decrypt_block(block.into());
}

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA-256 over `data` under `key`, matching `nearby_fp_library.c`'s
/// `PadKey` + ipad/opad construction (the `hmac` crate implements the same
/// RFC 2104 padding internally).
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// HKDF-Extract (RFC 5869), `nearby_fp_HkdfExtractSha256`.
pub fn hkdf_extract_sha256(salt: &[u8], ikm: &[u8]) -> [u8; 32] {
    let (prk, _) = Hkdf::<Sha256>::extract(Some(salt), ikm);
    prk.into()
}

/// HKDF-Expand (RFC 5869), `nearby_fp_HkdfExpandSha256`.
pub fn hkdf_expand_sha256(prk: &[u8; 32], info: &[u8], out: &mut [u8]) -> Result<()> {
    let hk = Hkdf::<Sha256>::from_prk(prk).map_err(|_| EngineError::InvalidInput)?;
    hk.expand(info, out).map_err(|_| EngineError::InvalidInput)
}

/// Derives the SASS Random Resolvable Field encryption key from an account key:
/// `HKDF(extract(salt=None, ikm=account_key), expand(info="SASS-RRD-KEY", len=16))`.
pub fn get_rrd_key(account_key: &[u8; 16]) -> [u8; 16] {
    let prk = hkdf_extract_sha256(&[], account_key);
    let mut out = [0u8; 16];
    hkdf_expand_sha256(&prk, b"SASS-RRD-KEY", &mut out).expect("16 bytes is a valid HKDF length");
    out
}

/// ECDH over P-256, returning the raw 32-byte shared X-coordinate.
///
/// `peer_pub_64` is the peer's uncompressed public key (X || Y, 32 bytes each,
/// no leading 0x04 tag — the wire format used by Key-Based Pairing's 80-byte
/// branch). `our_priv_32` is this device's anti-spoofing private key.
pub fn ecdh_p256_shared_secret(peer_pub_64: &[u8; 64], our_priv_32: &[u8; 32]) -> Result<[u8; 32]> {
    use p256::elliptic_curve::sec1::FromEncodedPoint;
    use p256::{ecdh::diffie_hellman, AffinePoint, EncodedPoint, PublicKey, SecretKey};

    let mut sec1 = [0u8; 65];
    sec1[0] = 0x04;
    sec1[1..33].copy_from_slice(&peer_pub_64[0..32]);
    sec1[33..65].copy_from_slice(&peer_pub_64[32..64]);
    let encoded = EncodedPoint::from_bytes(&sec1).map_err(|_| EngineError::InvalidInput)?;
    let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
        .ok_or(EngineError::InvalidInput)?;
    let peer_public = PublicKey::from_affine(affine).map_err(|_| EngineError::InvalidInput)?;

    let our_secret = SecretKey::from_slice(our_priv_32).map_err(|_| EngineError::InvalidInput)?;

    let shared = diffie_hellman(our_secret.to_nonzero_scalar(), peer_public.as_affine());
    let mut out = [0u8; 32];
    out.copy_from_slice(shared.raw_secret_bytes().as_slice());
    Ok(out)
}

/// The Fast Pair "anti-spoofing key": `SHA-256(ECDH(peer_pub, our_priv))[0..16]`.
pub fn create_shared_secret(peer_pub_64: &[u8; 64], our_priv_32: &[u8; 32]) -> Result<[u8; 16]> {
    let shared = ecdh_p256_shared_secret(peer_pub_64, our_priv_32)?;
    let digest = sha256(&shared);
    let mut key = [0u8; 16];
    key.copy_from_slice(&digest[0..16]);
    Ok(key)
}

/// AES-CTR keystream XOR, matching `nearby_fp_AesCtr`: the first 8 bytes of
/// `buf` are an embedded nonce and are left untouched; the remaining bytes are
/// XORed in place with `AES-128-ECB(key, iv)` where `iv`'s low 8 bytes are the
/// nonce and byte 8 is a per-block counter.
pub fn aes_ctr(key: &[u8; 16], buf: &mut [u8]) {
    const NONCE_SIZE: usize = 8;
    if buf.len() <= NONCE_SIZE {
        return;
    }
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&buf[0..NONCE_SIZE]);

    let mut offset = NONCE_SIZE;
    let mut counter: u8 = 0;
    while offset < buf.len() {
        let mut iv = [0u8; 16];
        iv[0..NONCE_SIZE].copy_from_slice(&nonce);
        iv[NONCE_SIZE] = counter;
        aes128_ecb_encrypt(key, &mut iv);

        let chunk_len = core::cmp::min(16, buf.len() - offset);
        for i in 0..chunk_len {
            buf[offset + i] ^= iv[i];
        }
        offset += chunk_len;
        counter = counter.wrapping_add(1);
    }
}

/// Constant-time byte-slice comparison. Used everywhere a peer-supplied tag is
/// checked against a locally computed HMAC or SHA-256 prefix.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Derives a 20-byte public key plus a hashed selector byte from a 32-byte
/// scalar buffer, by reducing it mod the secp160r1 curve order and performing
/// scalar-multiplication with the generator. Used by SPOT's EID derivation,
/// which otherwise treats this as an opaque HAL call
/// (`nearby_platform_GetSecp160r1PublicKey`) — this crate implements it
/// locally since no external curve HAL is assumed.
pub fn secp160r1_public_key(scalar_be_32: &[u8; 32]) -> ([u8; 20], u8) {
    let scalar = secp160r1::U192::from_be_bytes_32(scalar_be_32);
    let point = secp160r1::scalar_mul_generator(&scalar);
    let affine = point
        .to_affine()
        .unwrap_or(secp160r1::AffinePoint { x: secp160r1::U160::ZERO, y: secp160r1::U160::ZERO });
    let pub_bytes = affine.x.to_be_bytes();
    let digest = sha256(&pub_bytes);
    (pub_bytes, digest[31])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes_ctr_is_its_own_inverse() {
        let key = [0x42u8; 16];
        let mut buf = [0u8; 8 + 20];
        buf[0..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        for i in 8..buf.len() {
            buf[i] = i as u8;
        }
        let original = buf;
        aes_ctr(&key, &mut buf);
        assert_ne!(&buf[8..], &original[8..]);
        aes_ctr(&key, &mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    fn ct_eq_matches_eq() {
        assert!(ct_eq(b"abc", b"abc"));
        assert!(!ct_eq(b"abc", b"abd"));
        assert!(!ct_eq(b"abc", b"ab"));
    }

    #[test]
    fn hmac_is_deterministic() {
        let a = hmac_sha256(b"key", b"data");
        let b = hmac_sha256(b"key", b"data");
        assert_eq!(a, b);
    }

    #[test]
    fn hkdf_roundtrip_is_deterministic() {
        let prk = hkdf_extract_sha256(b"salt", b"ikm");
        let mut out1 = [0u8; 16];
        let mut out2 = [0u8; 16];
        hkdf_expand_sha256(&prk, b"info", &mut out1).unwrap();
        hkdf_expand_sha256(&prk, b"info", &mut out2).unwrap();
        assert_eq!(out1, out2);
    }
}
