//! Binds `VideoFrameDecoder`, `AudioBlockDecoder` and `SyncController` into
//! the single-threaded cooperative playback loop described in spec §5: one
//! producer loop, one timer-driven interrupt-equivalent tick that swaps PCM
//! buffers and refills the freed one, and a VBlank-style suspension point.
//!
//! There is no real interrupt here -- a portable host calls `audio_tick`
//! from wherever its sample-rate timer fires and `video_tick` once per frame
//! interval -- but the call-and-effect boundaries mirror the original
//! ISR/main split described in the concurrency model.

use crate::audio::{AudioBlockDecoder, OutputBuffers};
use crate::sync::SyncController;
use crate::video::{Reference, VideoFrameDecoder, FRAME_BYTES};
use crate::Result;

/// Owns both halves of the double-buffered PCM ring, one channel slot per
/// side for mono modes and both for stereo (mode 0). `active` is the pair
/// currently being drained by PCM transport; the other pair is what the
/// audio tick refills. A swap happens before every refill, matching the
/// documented ordering (PCM swap happens before refill).
struct PcmRing {
    left: [Vec<i8>; 2],
    right: [Vec<i8>; 2],
    stereo: bool,
    active: usize,
}

impl PcmRing {
    fn new(buffer_len: usize, stereo: bool) -> PcmRing {
        PcmRing {
            left: [vec![0i8; buffer_len], vec![0i8; buffer_len]],
            right: [vec![0i8; buffer_len], vec![0i8; buffer_len]],
            stereo,
            active: 0,
        }
    }

    fn swap(&mut self) {
        self.active = 1 - self.active;
    }

    fn decode_as_output(&mut self) -> OutputBuffers {
        let side = 1 - self.active;
        if self.stereo {
            OutputBuffers::Stereo(&mut self.left[side], &mut self.right[side])
        } else {
            OutputBuffers::Mono(&mut self.left[side])
        }
    }

    fn active_buffer(&self) -> &[i8] {
        &self.left[self.active]
    }

    fn active_right_buffer(&self) -> Option<&[i8]> {
        if self.stereo {
            Some(&self.right[self.active])
        } else {
            None
        }
    }
}

/// Drives one video + audio stream pair. Owns the frame buffer, the
/// reference frame, and the PCM ring; the decoders themselves hold no
/// buffers of their own (resource policy: decoders receive mutable slices
/// and never allocate -- this driver is where the allocation lives).
pub struct PlaybackDriver<'a> {
    gbm: &'a [u8],
    gbs: &'a [u8],
    video: VideoFrameDecoder,
    audio: AudioBlockDecoder,
    sync: SyncController,
    iframe_table: Vec<usize>,

    frame_buffer: Vec<u8>,
    reference_buffer: Vec<u8>,
    have_reference: bool,
    video_cursor: usize,

    pcm: PcmRing,
    playing: bool,
}

impl<'a> PlaybackDriver<'a> {
    pub fn open(gbm: &'a [u8], gbs: &'a [u8], pcm_buffer_len: usize) -> Result<PlaybackDriver<'a>> {
        let video = VideoFrameDecoder::open(gbm)?;
        let audio = AudioBlockDecoder::open(gbs)?;
        let sync = SyncController::new(audio.mode_info().rate);
        let iframe_table = video.scan_iframe_table(gbm);

        Ok(PlaybackDriver {
            gbm,
            gbs,
            video,
            audio,
            sync,
            iframe_table,
            frame_buffer: vec![0u8; FRAME_BYTES],
            reference_buffer: vec![0u8; FRAME_BYTES],
            have_reference: false,
            video_cursor: crate::video::HEADER_SIZE,
            pcm: PcmRing::new(pcm_buffer_len, audio.mode_info().channels == 2),
            playing: true,
        })
    }

    /// The once-per-100ms video step: decodes the frame at the current
    /// cursor into the frame buffer, then promotes it to the reference for
    /// the next frame. Wraps to the first frame on an end-of-stream marker.
    pub fn video_tick(&mut self) -> Result<()> {
        let reference =
            if self.have_reference { Reference::Frame(&self.reference_buffer) } else { Reference::Intra };

        // decode_frame's unchanged-copy branch is a no-op, so the frame
        // buffer must already hold the reference's content going in.
        if self.have_reference {
            self.frame_buffer.copy_from_slice(&self.reference_buffer);
        }

        let next = self.video.decode_frame(self.gbm, self.video_cursor, &mut self.frame_buffer, reference)?;
        match next {
            Some(next_offset) => {
                self.reference_buffer.copy_from_slice(&self.frame_buffer);
                self.have_reference = true;
                self.video_cursor = next_offset;
            }
            None => {
                self.video_cursor = crate::video::HEADER_SIZE;
                self.have_reference = false;
            }
        }
        Ok(())
    }

    /// The sample-rate tick: swaps PCM buffer indices, then refills the
    /// just-freed buffer via the audio decoder, then observes the new sample
    /// count for a minute-boundary crossing.
    pub fn audio_tick(&mut self) -> Result<()> {
        if !self.playing {
            return Ok(());
        }
        self.pcm.swap();
        let buffer_len = self.pcm.active_buffer().len();
        let mut out = self.pcm.decode_as_output();
        self.audio.decode(self.gbs, &mut out, buffer_len)?;
        self.sync.observe_samples_decoded(self.audio.samples_decoded());

        if let Some(minute) = self.sync.take_pending_minute() {
            if let Some(&offset) = self.iframe_table.get(minute as usize) {
                self.video_cursor = offset;
                self.have_reference = false;
            }
        }
        Ok(())
    }

    pub fn frame_buffer(&self) -> &[u8] {
        &self.frame_buffer
    }

    /// The left (or mono) channel of the buffer currently ready for PCM
    /// transport.
    pub fn active_pcm_buffer(&self) -> &[i8] {
        self.pcm.active_buffer()
    }

    /// The right channel of the active buffer, or `None` outside mode 0.
    pub fn active_pcm_right_buffer(&self) -> Option<&[i8]> {
        self.pcm.active_right_buffer()
    }

    /// Disables the sample timer and cancels in-flight PCM transport; any
    /// tick that fires after `stop()` is a no-op.
    pub fn stop(&mut self) {
        self.playing = false;
    }

    pub fn start(&mut self) {
        self.playing = true;
    }

    /// `stop -> reset -> start`, atomic from the caller's perspective.
    pub fn seek_minute(&mut self, m: u64) -> Result<()> {
        self.stop();
        self.audio.seek_minute(self.gbs, m, self.sync.samples_per_minute())?;
        self.sync.reset_to_minute(m);
        if let Some(&offset) = self.iframe_table.get(m as usize) {
            self.video_cursor = offset;
            self.have_reference = false;
        }
        self.start();
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.audio.is_finished()
    }
}
