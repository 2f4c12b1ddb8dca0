//! Advertisement interleaving and BLE address rotation.
//!
//! Re-expresses the teacher's `adv_scheduler.rs` priority-preemption concept
//! (SPOT normally dominant, Fast Pair briefly preempting) as a plain
//! synchronous state machine advanced by explicit timer callbacks, since the
//! engine as a whole may not suspend or hold an internal mutex.

use crate::hal::TimerHandle;

/// Target mean BLE address rotation period when Unwanted Tracking Protection
/// is off (~1024 seconds, jittered).
pub const ROTATION_PERIOD_MS: u32 = 1024 * 1000;
pub const ROTATION_JITTER_MS: u32 = 200 * 1000;
/// Rotation period while Unwanted Tracking Protection is active: exactly 24h.
pub const UTP_ROTATION_PERIOD_MS: u32 = 24 * 60 * 60 * 1000;

const SPOT_SLOT_MS: u32 = 2000;
const FAST_PAIR_SLOT_MS: u32 = 100;

/// Which payload currently owns the (possibly shared) advertising handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvertSlot {
    NoAdvert,
    FastPair,
    Spot,
}

/// Drives which payload is live on single-advertiser hardware.
pub struct AdvertScheduler {
    slot: AdvertSlot,
    fast_pair_enabled: bool,
    spot_enabled: bool,
    slot_timer: Option<TimerHandle>,
}

impl AdvertScheduler {
    pub fn new() -> Self {
        AdvertScheduler {
            slot: AdvertSlot::NoAdvert,
            fast_pair_enabled: false,
            spot_enabled: false,
            slot_timer: None,
        }
    }

    pub fn current_slot(&self) -> AdvertSlot {
        self.slot
    }

    /// Enables a payload; returns the delay (ms) the caller should arm a
    /// timer for before calling [`Self::on_slot_timer`], if interleaving is
    /// now required.
    pub fn set_fast_pair_enabled(&mut self, enabled: bool) -> Option<u32> {
        self.fast_pair_enabled = enabled;
        self.recompute()
    }

    pub fn set_spot_enabled(&mut self, enabled: bool) -> Option<u32> {
        self.spot_enabled = enabled;
        self.recompute()
    }

    fn recompute(&mut self) -> Option<u32> {
        match (self.fast_pair_enabled, self.spot_enabled) {
            (false, false) => {
                self.slot = AdvertSlot::NoAdvert;
                None
            }
            (true, false) => {
                self.slot = AdvertSlot::FastPair;
                None
            }
            (false, true) => {
                self.slot = AdvertSlot::Spot;
                None
            }
            (true, true) => {
                // Both active: begin interleaving from the SPOT slot, the
                // normally-dominant payload.
                self.slot = AdvertSlot::Spot;
                Some(SPOT_SLOT_MS)
            }
        }
    }

    /// Called when the interleave timer fires; returns the next slot and the
    /// delay (ms) to re-arm for, if both payloads are still enabled.
    pub fn on_slot_timer(&mut self) -> Option<(AdvertSlot, u32)> {
        if !(self.fast_pair_enabled && self.spot_enabled) {
            return None;
        }
        let (next, delay) = match self.slot {
            AdvertSlot::Spot => (AdvertSlot::FastPair, FAST_PAIR_SLOT_MS),
            _ => (AdvertSlot::Spot, SPOT_SLOT_MS),
        };
        self.slot = next;
        Some((next, delay))
    }

    pub fn remember_timer(&mut self, handle: TimerHandle) {
        self.slot_timer = Some(handle);
    }

    pub fn take_timer(&mut self) -> Option<TimerHandle> {
        self.slot_timer.take()
    }

    pub fn peek_timer(&self) -> Option<TimerHandle> {
        self.slot_timer
    }
}

impl Default for AdvertScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// BLE address rotation gating. Rotation is suppressed while a pairing flow
/// is in any state other than Idle, WaitAccountKeyWrite, or WaitAdditionalData.
pub fn rotation_period_ms(utp_active: bool, rand_jitter_byte: u8) -> u32 {
    if utp_active {
        UTP_ROTATION_PERIOD_MS
    } else {
        let jitter = (rand_jitter_byte as u32 * ROTATION_JITTER_MS) / 255;
        ROTATION_PERIOD_MS - ROTATION_JITTER_MS / 2 + jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_payload_does_not_interleave() {
        let mut sched = AdvertScheduler::new();
        assert_eq!(sched.set_fast_pair_enabled(true), None);
        assert_eq!(sched.current_slot(), AdvertSlot::FastPair);
    }

    #[test]
    fn both_payloads_interleave_starting_with_spot() {
        let mut sched = AdvertScheduler::new();
        sched.set_fast_pair_enabled(true);
        let delay = sched.set_spot_enabled(true);
        assert_eq!(sched.current_slot(), AdvertSlot::Spot);
        assert_eq!(delay, Some(SPOT_SLOT_MS));

        let (next, delay) = sched.on_slot_timer().unwrap();
        assert_eq!(next, AdvertSlot::FastPair);
        assert_eq!(delay, FAST_PAIR_SLOT_MS);
    }

    #[test]
    fn disabling_one_payload_collapses_interleaving() {
        let mut sched = AdvertScheduler::new();
        sched.set_fast_pair_enabled(true);
        sched.set_spot_enabled(true);
        sched.set_fast_pair_enabled(false);
        assert_eq!(sched.current_slot(), AdvertSlot::Spot);
        assert!(sched.on_slot_timer().is_none());
    }

    #[test]
    fn utp_rotation_is_exactly_24h() {
        assert_eq!(rotation_period_ms(true, 0), UTP_ROTATION_PERIOD_MS);
        assert_eq!(rotation_period_ms(true, 255), UTP_ROTATION_PERIOD_MS);
    }

    #[test]
    fn normal_rotation_is_jittered_around_1024s() {
        let min = rotation_period_ms(false, 0);
        let max = rotation_period_ms(false, 255);
        assert!(min < ROTATION_PERIOD_MS);
        assert!(max > ROTATION_PERIOD_MS);
    }
}
