//! Binds the audio sample timebase to video I-frame realignment (spec §4.6).
//!
//! The audio decoder is the sync master: its sample clock is
//! hardware-precise, while video decode jitter is tolerated because every
//! minute boundary forces a realignment to a pre-scanned I-frame offset.

/// One-slot signal from the sample-rate interrupt to the main loop,
/// initialized to `-1` (no pending minute).
const NO_PENDING_MINUTE: i64 = -1;

pub struct SyncController {
    samples_per_minute: u64,
    current_audio_minute: u64,
    next_minute_sample: u64,
    /// The pending minute to hand video, or `NO_PENDING_MINUTE`.
    pending_minute: i64,
}

impl SyncController {
    pub fn new(sample_rate: u32) -> SyncController {
        let samples_per_minute = sample_rate as u64 * 60;
        SyncController {
            samples_per_minute,
            current_audio_minute: 0,
            next_minute_sample: samples_per_minute,
            pending_minute: NO_PENDING_MINUTE,
        }
    }

    pub fn samples_per_minute(&self) -> u64 {
        self.samples_per_minute
    }

    pub fn current_audio_minute(&self) -> u64 {
        self.current_audio_minute
    }

    /// Called after each audio decode call with the decoder's monotonic
    /// `samples_decoded` counter. Advances the minute and arms the pending
    /// signal when the counter has crossed `next_minute_sample`.
    pub fn observe_samples_decoded(&mut self, samples_decoded: u64) {
        while samples_decoded >= self.next_minute_sample {
            self.current_audio_minute += 1;
            self.next_minute_sample += self.samples_per_minute;
            self.pending_minute = self.current_audio_minute as i64;
        }
    }

    /// Polled by the main loop. Clears the slot on a non-negative read.
    pub fn take_pending_minute(&mut self) -> Option<u64> {
        if self.pending_minute == NO_PENDING_MINUTE {
            None
        } else {
            let m = self.pending_minute as u64;
            self.pending_minute = NO_PENDING_MINUTE;
            Some(m)
        }
    }

    /// `seek_minute` resets this controller to minute `m`, as part of the
    /// atomic `stop -> reset -> start` sequence.
    pub fn reset_to_minute(&mut self, m: u64) {
        self.current_audio_minute = m;
        self.next_minute_sample = (m + 1) * self.samples_per_minute;
        self.pending_minute = NO_PENDING_MINUTE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_no_pending_minute() {
        let mut ctrl = SyncController::new(22050);
        assert_eq!(ctrl.take_pending_minute(), None);
        assert_eq!(ctrl.current_audio_minute(), 0);
    }

    #[test]
    fn crossing_a_minute_boundary_arms_the_signal_once() {
        let mut ctrl = SyncController::new(22050);
        let spm = ctrl.samples_per_minute();
        ctrl.observe_samples_decoded(spm - 1);
        assert_eq!(ctrl.take_pending_minute(), None);

        ctrl.observe_samples_decoded(spm);
        assert_eq!(ctrl.take_pending_minute(), Some(1));
        // Slot clears after one read.
        assert_eq!(ctrl.take_pending_minute(), None);
        assert_eq!(ctrl.current_audio_minute(), 1);
    }

    #[test]
    fn multiple_minutes_in_one_observation_still_advance_correctly() {
        let mut ctrl = SyncController::new(22050);
        let spm = ctrl.samples_per_minute();
        ctrl.observe_samples_decoded(spm * 3);
        assert_eq!(ctrl.current_audio_minute(), 3);
        assert_eq!(ctrl.take_pending_minute(), Some(3));
    }

    #[test]
    fn seek_reset_is_idempotent_from_the_main_loops_perspective() {
        let mut ctrl = SyncController::new(22050);
        ctrl.reset_to_minute(5);
        assert_eq!(ctrl.current_audio_minute(), 5);
        assert_eq!(ctrl.take_pending_minute(), None);
        ctrl.reset_to_minute(5);
        assert_eq!(ctrl.current_audio_minute(), 5);
    }
}
