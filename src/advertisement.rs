//! Advertisement frame builders: Fast Pair discoverable/non-discoverable and
//! the SPOT beacon frame.
//!
//! Grounded on `nearby_fp_library.c`'s `nearby_fp_CreateDiscoverableAdvertisement`,
//! `CreateNondiscoverableAdvertisement`, and `nearby_fp_SetBloomFilter`.

use heapless::Vec;

use crate::account_keys::AccountKeyRing;
use crate::crypto::sha256;

pub const FP_SERVICE_UUID: u16 = 0xFE2C;
const MAX_ADV_LEN: usize = 62;

const SALT_FIELD_LENGTH: u8 = 1;

/// Builds the 10-byte discoverable advertisement: service-data header, the
/// little-endian FP service UUID, a 3-byte big-endian model id, and the
/// trailing TX-power stanza.
pub fn build_discoverable(model_id: u32, tx_power: i8) -> Vec<u8, MAX_ADV_LEN> {
    let mut out = Vec::new();
    let model_bytes = model_id.to_be_bytes();

    // AD structure: length | type(0x16) | uuid_le(2) | model_id(3)
    out.push(1 + 2 + 3).ok(); // length byte (excludes itself)
    out.push(0x16).ok(); // GAP_DATA_TYPE_SERVICE_DATA_UUID
    out.extend_from_slice(&FP_SERVICE_UUID.to_le_bytes()).ok();
    out.extend_from_slice(&model_bytes[1..4]).ok();

    append_tx_power(&mut out, tx_power);
    out
}

/// Options controlling which optional LTVs appear in the non-discoverable
/// advertisement.
#[derive(Clone, Copy, Default)]
pub struct NondiscoverableOptions {
    pub sass_enabled: bool,
    /// Whether the Seeker-side pairing-indicator UI should be shown for keys
    /// in this filter. Defaults to `false` ("don't show", bloom-filter type 2).
    pub show_pairing_indicator: bool,
    pub in_use_key: Option<[u8; 16]>,
    pub battery: Option<BatteryAdvertisement>,
}

#[derive(Clone, Copy)]
pub struct BatteryAdvertisement {
    pub show_ui: bool,
    pub charging: bool,
    pub levels: [u8; 3],
}

/// Builds the account-key (non-discoverable) advertisement: bloom filter LTV,
/// salt LTV, optional battery LTV, optional TX power.
pub fn build_nondiscoverable(
    ring: &AccountKeyRing,
    salt: u8,
    tx_power: i8,
    options: &NondiscoverableOptions,
) -> Vec<u8, MAX_ADV_LEN> {
    let n = ring.unique_count();
    let filter_bytes = bloom_filter_size_bytes(n);

    let mut payload: Vec<u8, MAX_ADV_LEN> = Vec::new();
    payload.push(if options.sass_enabled { 0x10 } else { 0x00 }).ok();

    // Low nibble is the pairing-indicator type (0 = show, 2 = don't show),
    // per `nearby_fp_library.c`'s `kAccountKeyFilterType`/`kAccountKeyFilterNoNotificationType`;
    // this is independent of SASS, which is only signaled by the 0x10 header byte.
    let filter_type = if options.show_pairing_indicator { 0 } else { 2 };
    payload.push(((filter_bytes as u8) << 4) | filter_type).ok();
    for _ in 0..filter_bytes {
        payload.push(0).ok();
    }

    let filter_start = 2;
    set_bloom_filter(
        &mut payload[filter_start..filter_start + filter_bytes],
        ring,
        salt,
        options,
    );

    payload.push((SALT_FIELD_LENGTH << 4) | 1).ok();
    payload.push(salt).ok();

    if let Some(battery) = &options.battery {
        let ltv_type = if battery.show_ui { 3 } else { 4 };
        payload.push((3u8 << 4) | ltv_type).ok();
        payload.push(encode_battery_byte(battery.charging, battery.levels[0])).ok();
        payload.push(encode_battery_byte(false, battery.levels[1])).ok();
        payload.push(encode_battery_byte(false, battery.levels[2])).ok();
    }

    // Prefix with service-data header (length, type, uuid) same as discoverable.
    let mut out: Vec<u8, MAX_ADV_LEN> = Vec::new();
    out.push((1 + 2 + payload.len()) as u8).ok();
    out.push(0x16).ok();
    out.extend_from_slice(&FP_SERVICE_UUID.to_le_bytes()).ok();
    out.extend_from_slice(&payload).ok();

    append_tx_power(&mut out, tx_power);
    out
}

fn encode_battery_byte(charging: bool, level: u8) -> u8 {
    ((charging as u8) << 7) | (level & 0x7F)
}

/// `s = ceil(6n/5)` bytes, matching `(6n + 15) / 5` integer arithmetic in the source.
pub fn bloom_filter_size_bytes(unique_keys: usize) -> usize {
    if unique_keys == 0 {
        return 0;
    }
    (6 * unique_keys + 15) / 5
}

/// Populates `filter` (already zeroed, `filter.len()` bytes) with one bit per
/// SHA-256 word derived from each unique account key.
fn set_bloom_filter(
    filter: &mut [u8],
    ring: &AccountKeyRing,
    salt: u8,
    options: &NondiscoverableOptions,
) {
    let filter_bits = filter.len() * 8;
    if filter_bits == 0 {
        return;
    }

    for (i, entry) in ring.iter_unique().enumerate() {
        let mut flags = entry.key[0];
        if options.sass_enabled {
            if i == 0 {
                flags |= 0x01; // most-recently-used
            }
            if options.in_use_key == Some(entry.key) {
                flags |= 0x02; // in-use
            }
        }

        let mut input: Vec<u8, 32> = Vec::new();
        input.push(flags).ok();
        input.extend_from_slice(&entry.key[1..16]).ok();
        input.push(salt).ok();
        if let Some(battery) = &options.battery {
            let ltv_type = if battery.show_ui { 3 } else { 4 };
            input.push((3u8 << 4) | ltv_type).ok();
            input.push(encode_battery_byte(battery.charging, battery.levels[0])).ok();
            input.push(encode_battery_byte(false, battery.levels[1])).ok();
            input.push(encode_battery_byte(false, battery.levels[2])).ok();
        }

        let digest = sha256(&input);
        for word_idx in 0..8 {
            let w = u32::from_be_bytes([
                digest[word_idx * 4],
                digest[word_idx * 4 + 1],
                digest[word_idx * 4 + 2],
                digest[word_idx * 4 + 3],
            ]);
            let m = (w as usize) % filter_bits;
            filter[m / 8] |= 1 << (m % 8);
        }
    }
}

fn append_tx_power(out: &mut Vec<u8, MAX_ADV_LEN>, tx_power: i8) {
    out.push(2).ok();
    out.push(0x0A).ok(); // GAP_DATA_TYPE_TX_POWER
    out.push(tx_power as u8).ok();
}

/// Builds the SPOT beacon advertisement frame.
///
/// `frame_type` is `0x40` normally or `0x41` when Unwanted Tracking
/// Protection is active; `hashed_flags` is `None` when neither UTP nor
/// battery contributes a bit.
pub fn build_spot_advertisement(
    eid: &[u8; 20],
    utp_active: bool,
    hashed_flags: Option<u8>,
) -> Vec<u8, MAX_ADV_LEN> {
    let mut out: Vec<u8, MAX_ADV_LEN> = Vec::new();
    let frame_type = if utp_active { 0x41 } else { 0x40 };
    let len = 1 + 1 + 20 + hashed_flags.map_or(0, |_| 1);
    out.push(len as u8).ok();
    out.push(0x16).ok();
    out.extend_from_slice(&FP_SERVICE_UUID.to_le_bytes()).ok();
    out.push(frame_type).ok();
    out.extend_from_slice(eid).ok();
    if let Some(flags) = hashed_flags {
        out.push(flags).ok();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account_keys::AccountKeyEntry;

    #[test]
    fn bloom_filter_size_matches_formula() {
        assert_eq!(bloom_filter_size_bytes(0), 0);
        assert_eq!(bloom_filter_size_bytes(1), 4);
        assert_eq!(bloom_filter_size_bytes(2), 5);
        assert_eq!(bloom_filter_size_bytes(5), 9);
    }

    #[test]
    fn discoverable_advertisement_is_ten_bytes() {
        let adv = build_discoverable(0x00_0A_42, 8);
        assert_eq!(adv.len(), 10);
        assert_eq!(adv[0], 6);
        assert_eq!(adv[1], 0x16);
    }

    #[test]
    fn nondiscoverable_advertisement_is_deterministic() {
        let mut ring = AccountKeyRing::new();
        let mut key = [0x04u8; 16];
        key[15] = 0xFF;
        ring.add(AccountKeyEntry { key, peer: None });

        let opts = NondiscoverableOptions::default();
        let a = build_nondiscoverable(&ring, 0xC7, 8, &opts);
        let b = build_nondiscoverable(&ring, 0xC7, 8, &opts);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_ring_still_encodes_zero_length_filter() {
        let ring = AccountKeyRing::new();
        let opts = NondiscoverableOptions::default();
        let adv = build_nondiscoverable(&ring, 0xC7, 8, &opts);
        // header(1)+type(1)+uuid(2) then filter-header byte with length nibble 0
        assert_eq!(adv[4] >> 4, 0);
    }
}
