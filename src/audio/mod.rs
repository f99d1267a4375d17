//! The GBS audio decoder: header/mode table, block header parsing, and the
//! block-walking decoder that drains ADPCM data into caller-supplied PCM
//! buffers (spec §4.5).

pub mod kernels;

use bitflags::bitflags;

use crate::errors::{malformed_header_error, unsupported_error};
use crate::Result;
use kernels::{bit2_step, bit3_step, ima4_step, stereo4_step};

pub const HEADER_SIZE: usize = 512;
const IDENTIFIER: &[u8; 4] = b"GBAL";
const MARKER: &[u8; 4] = b"MUSI";

/// One row of the mode table (spec §3).
#[derive(Clone, Copy)]
pub struct ModeInfo {
    pub name: &'static str,
    pub rate: u32,
    pub channels: usize,
    pub block_size: usize,
    pub header_size: usize,
}

pub const MODE_TABLE: [ModeInfo; 5] = [
    ModeInfo { name: "stereo 4-bit IMA", rate: 22050, channels: 2, block_size: 1024, header_size: 8 },
    ModeInfo { name: "mono 3-bit", rate: 11025, channels: 1, block_size: 1024, header_size: 4 },
    ModeInfo { name: "mono 4-bit IMA", rate: 22050, channels: 1, block_size: 512, header_size: 4 },
    ModeInfo { name: "mono 2-bit", rate: 22050, channels: 1, block_size: 512, header_size: 4 },
    ModeInfo { name: "mono 2-bit small", rate: 22050, channels: 1, block_size: 256, header_size: 4 },
];

/// The fixed 512-byte GBS header.
pub struct GbsHeader {
    pub mode: usize,
}

impl GbsHeader {
    pub fn parse(payload: &[u8]) -> Result<GbsHeader> {
        if payload.len() < HEADER_SIZE {
            return malformed_header_error("gbs payload shorter than header");
        }
        if &payload[0..4] != IDENTIFIER {
            return malformed_header_error("bad GBAL identifier");
        }
        if &payload[4..8] != MARKER {
            return malformed_header_error("bad MUSI marker");
        }
        let mode = u32::from_le_bytes([payload[8], payload[9], payload[10], payload[11]]);
        if mode > 4 {
            return unsupported_error("gbs mode");
        }
        Ok(GbsHeader { mode: mode as usize })
    }

    pub fn info(&self) -> &'static ModeInfo {
        &MODE_TABLE[self.mode]
    }
}

/// Per-channel predictor/step-index state, reset at every block boundary.
///
/// For the IMA modes (0, 2) `predictor` is the true signed accumulator; for
/// the 3-bit and 2-bit modes it is the unsigned accumulator and samples are
/// emitted via `predictor - 0x8000`.
#[derive(Clone, Copy, Default)]
struct ChannelState {
    predictor: i32,
    step_index: i32,
}

bitflags! {
    /// Compact status register, the part of the audio decoder's state an
    /// interrupt handler would flip and the main loop would poll (spec §5).
    struct DecoderStatus: u8 {
        const PLAYING = 0b001;
        const PAUSED  = 0b010;
        const FINISHED = 0b100;
    }
}

/// Walks a GBS payload's blocks, producing PCM into caller-supplied buffers.
pub struct AudioBlockDecoder {
    mode: usize,
    total_blocks: usize,
    block_index: usize,
    /// Byte offset of the current block's data region, within `gbm`... GBS payload.
    data_region_start: usize,
    /// Position within the current block's data region.
    byte_pos: usize,
    channels: [ChannelState; 2],
    code_queue: [u8; 8],
    queue_len: u8,
    queue_pos: u8,
    samples_decoded: u64,
    status: DecoderStatus,
}

/// Buffers for one `decode` call: one slice for mono modes, two for stereo.
pub enum OutputBuffers<'a> {
    Mono(&'a mut [i8]),
    Stereo(&'a mut [i8], &'a mut [i8]),
}

impl AudioBlockDecoder {
    /// Opens a GBS payload, validating its header and parsing the first block.
    pub fn open(gbs: &[u8]) -> Result<AudioBlockDecoder> {
        let header = GbsHeader::parse(gbs)?;
        let info = header.info();
        if gbs.len() < HEADER_SIZE + info.block_size {
            return malformed_header_error("gbs payload shorter than one block");
        }
        let total_blocks = (gbs.len() - HEADER_SIZE) / info.block_size;
        let mut decoder = AudioBlockDecoder {
            mode: header.mode,
            total_blocks,
            block_index: 0,
            data_region_start: 0,
            byte_pos: 0,
            channels: [ChannelState::default(); 2],
            code_queue: [0; 8],
            queue_len: 0,
            queue_pos: 0,
            samples_decoded: 0,
            status: DecoderStatus::PLAYING,
        };
        decoder.reparse_block(gbs, 0)?;
        Ok(decoder)
    }

    pub fn mode_info(&self) -> &'static ModeInfo {
        &MODE_TABLE[self.mode]
    }

    pub fn samples_decoded(&self) -> u64 {
        self.samples_decoded
    }

    pub fn is_finished(&self) -> bool {
        self.status.contains(DecoderStatus::FINISHED)
    }

    pub fn is_playing(&self) -> bool {
        self.status.contains(DecoderStatus::PLAYING)
    }

    /// `playing -> paused`.
    pub fn pause(&mut self) {
        self.status.remove(DecoderStatus::PLAYING);
        self.status.insert(DecoderStatus::PAUSED);
    }

    /// `paused -> playing`.
    pub fn resume(&mut self) {
        self.status.remove(DecoderStatus::PAUSED);
        self.status.insert(DecoderStatus::PLAYING);
    }

    /// Rewinds to block 0 and resets the sample counter.
    pub fn restart(&mut self, gbs: &[u8]) -> Result<()> {
        self.samples_decoded = 0;
        self.status.remove(DecoderStatus::FINISHED);
        self.reparse_block(gbs, 0)
    }

    /// Seeks to the block containing the start of minute `m`.
    pub fn seek_minute(&mut self, gbs: &[u8], m: u64, samples_per_minute: u64) -> Result<()> {
        let info = self.mode_info();
        let samples_per_block = self.samples_per_block(info);
        let target_block = ((m * samples_per_minute) / samples_per_block as u64) as usize;
        let target_block = if target_block >= self.total_blocks { 0 } else { target_block };
        self.status.remove(DecoderStatus::FINISHED);
        self.reparse_block(gbs, target_block)
    }

    fn samples_per_block(&self, info: &ModeInfo) -> usize {
        let data_len = info.block_size - info.header_size;
        match self.mode {
            0 => data_len,       // 1 stereo pair per byte
            1 => (data_len / 3) * 8, // 8 codes per 3 bytes
            2 => data_len * 2,   // 2 codes per byte
            _ => data_len * 4,   // 2-bit: 4 codes per byte
        }
    }

    fn reparse_block(&mut self, gbs: &[u8], block_index: usize) -> Result<()> {
        let info = self.mode_info();
        self.data_region_start = HEADER_SIZE + block_index * info.block_size + info.header_size;
        let header_start = HEADER_SIZE + block_index * info.block_size;
        let header = &gbs[header_start..header_start + info.header_size];

        let ima_predictor = self.mode == 0 || self.mode == 2;
        let read_channel = |bytes: &[u8]| -> ChannelState {
            let raw_predictor = u16::from_le_bytes([bytes[0], bytes[1]]);
            let raw_step = u16::from_le_bytes([bytes[2], bytes[3]]);
            let predictor = if ima_predictor {
                raw_predictor as i32 - 0x8000
            } else {
                raw_predictor as i32
            };
            ChannelState { predictor, step_index: raw_step as i32 }
        };

        if self.mode == 0 {
            self.channels[0] = read_channel(&header[0..4]);
            self.channels[1] = read_channel(&header[4..8]);
        } else {
            self.channels[0] = read_channel(&header[0..4]);
        }

        self.block_index = block_index;
        self.byte_pos = 0;
        self.queue_len = 0;
        self.queue_pos = 0;
        Ok(())
    }

    /// Pulls the next unpack unit (1 or 3 bytes, depending on mode) from the
    /// current block's data region into `code_queue`, advancing `byte_pos`.
    fn refill_queue(&mut self, gbs: &[u8]) {
        let info = self.mode_info();
        let data = &gbs[self.data_region_start..self.data_region_start + (info.block_size - info.header_size)];
        match self.mode {
            1 => {
                let b0 = data[self.byte_pos] as u32;
                let b1 = data[self.byte_pos + 1] as u32;
                let b2 = data[self.byte_pos + 2] as u32;
                let combined = b0 | (b1 << 8) | (b2 << 16);
                for i in 0..8 {
                    self.code_queue[i] = ((combined >> (3 * i)) & 0b111) as u8;
                }
                self.queue_len = 8;
                self.byte_pos += 3;
            }
            2 => {
                let byte = data[self.byte_pos];
                self.code_queue[0] = byte & 0x0F;
                self.code_queue[1] = (byte >> 4) & 0x0F;
                self.queue_len = 2;
                self.byte_pos += 1;
            }
            _ => {
                let byte = data[self.byte_pos];
                for i in 0..4 {
                    self.code_queue[i] = (byte >> (2 * i)) & 0b11;
                }
                self.queue_len = 4;
                self.byte_pos += 1;
            }
        }
        self.queue_pos = 0;
    }

    fn data_region_len(&self) -> usize {
        let info = self.mode_info();
        info.block_size - info.header_size
    }

    /// Advances past the current block, reparsing the next one, or setting
    /// `finished` once the last block is exhausted.
    fn advance_block(&mut self, gbs: &[u8]) -> Result<()> {
        let next = self.block_index + 1;
        if next >= self.total_blocks {
            self.status.insert(DecoderStatus::FINISHED);
            Ok(())
        } else {
            self.reparse_block(gbs, next)
        }
    }

    /// Decodes up to `n` samples (per channel) into `out`, zero-filling any
    /// tail left over once the stream finishes mid-call.
    pub fn decode(&mut self, gbs: &[u8], out: &mut OutputBuffers, n: usize) -> Result<usize> {
        if self.mode == 0 {
            let (left, right) = match out {
                OutputBuffers::Stereo(l, r) => (l, r),
                OutputBuffers::Mono(_) => return unsupported_error("mode 0 requires stereo output buffers"),
            };
            let mut emitted = 0;
            while emitted < n {
                if self.is_finished() {
                    break;
                }
                if self.byte_pos >= self.data_region_len() {
                    self.advance_block(gbs)?;
                    if self.is_finished() {
                        break;
                    }
                }
                let data = &gbs[self.data_region_start..self.data_region_start + self.data_region_len()];
                let byte = data[self.byte_pos];
                self.byte_pos += 1;
                let (l, r) = stereo4_step(
                    (self.channels[0].predictor, self.channels[0].step_index),
                    (self.channels[1].predictor, self.channels[1].step_index),
                    byte,
                );
                self.channels[0] = ChannelState { predictor: l.0, step_index: l.1 };
                self.channels[1] = ChannelState { predictor: r.0, step_index: r.1 };
                left[emitted] = (l.2 >> 8) as i8;
                right[emitted] = (r.2 >> 8) as i8;
                emitted += 1;
                self.samples_decoded += 1;
            }
            for slot in left[emitted..].iter_mut().chain(right[emitted..].iter_mut()) {
                *slot = 0;
            }
            return Ok(emitted);
        }

        let out = match out {
            OutputBuffers::Mono(m) => m,
            OutputBuffers::Stereo(..) => return unsupported_error("mono mode requires a mono output buffer"),
        };

        let mut emitted = 0;
        while emitted < n {
            if self.is_finished() {
                break;
            }
            if self.queue_pos >= self.queue_len {
                if self.byte_pos >= self.data_region_len() {
                    self.advance_block(gbs)?;
                    if self.is_finished() {
                        break;
                    }
                }
                self.refill_queue(gbs);
            }
            let code = self.code_queue[self.queue_pos as usize];
            self.queue_pos += 1;

            let ch = self.channels[0];
            let sample = match self.mode {
                1 => {
                    let (p, s, sample) = bit3_step(ch.predictor as u16, ch.step_index, code);
                    self.channels[0] = ChannelState { predictor: p as i32, step_index: s };
                    sample
                }
                2 => {
                    let (p, s, sample) = ima4_step(ch.predictor, ch.step_index, code);
                    self.channels[0] = ChannelState { predictor: p, step_index: s };
                    sample
                }
                _ => {
                    let (p, s, sample) = bit2_step(ch.predictor as u16, ch.step_index, code);
                    self.channels[0] = ChannelState { predictor: p as i32, step_index: s };
                    sample
                }
            };
            out[emitted] = (sample >> 8) as i8;
            emitted += 1;
            self.samples_decoded += 1;
        }
        for slot in out[emitted..].iter_mut() {
            *slot = 0;
        }
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gbs_header(mode: u32) -> Vec<u8> {
        let mut h = vec![0u8; HEADER_SIZE];
        h[0..4].copy_from_slice(IDENTIFIER);
        h[4..8].copy_from_slice(MARKER);
        h[8..12].copy_from_slice(&mode.to_le_bytes());
        h
    }

    #[test]
    fn rejects_bad_identifier() {
        let mut bytes = gbs_header(0);
        bytes[0] = b'X';
        assert!(GbsHeader::parse(&bytes).is_err());
    }

    #[test]
    fn rejects_unsupported_mode() {
        let bytes = gbs_header(9);
        assert!(GbsHeader::parse(&bytes).is_err());
    }

    #[test]
    fn mode_table_matches_spec_rates_and_sizes() {
        assert_eq!(MODE_TABLE[0].rate, 22050);
        assert_eq!(MODE_TABLE[0].channels, 2);
        assert_eq!(MODE_TABLE[1].rate, 11025);
        assert_eq!(MODE_TABLE[2].block_size, 512);
        assert_eq!(MODE_TABLE[3].block_size, 512);
        assert_eq!(MODE_TABLE[4].block_size, 256);
    }

    /// Spec S4: mode 3 (mono 2-bit), one 512-byte block, predictor=0x8000,
    /// step=0, all-zero codes. A full block must yield exactly 2032 samples
    /// and never panic walking the block boundary.
    #[test]
    fn mode3_single_block_yields_2032_samples() {
        let mut gbs = gbs_header(3);
        let mut block = vec![0u8; 512];
        block[0..2].copy_from_slice(&0x8000u16.to_le_bytes());
        block[2..4].copy_from_slice(&0u16.to_le_bytes());
        gbs.extend_from_slice(&block);

        let mut decoder = AudioBlockDecoder::open(&gbs).unwrap();
        let mut out = vec![0i8; 2032];
        let mut buf = OutputBuffers::Mono(&mut out);
        let emitted = decoder.decode(&gbs, &mut buf, 2032).unwrap();
        assert_eq!(emitted, 2032);
        assert_eq!(decoder.samples_decoded(), 2032);
    }

    #[test]
    fn decode_past_end_sets_finished_and_zero_fills_tail() {
        let mut gbs = gbs_header(2);
        let mut block = vec![0u8; 512];
        block[0..2].copy_from_slice(&0x8000u16.to_le_bytes());
        gbs.extend_from_slice(&block);

        let mut decoder = AudioBlockDecoder::open(&gbs).unwrap();
        let samples_per_block = (512 - 4) * 2;
        let mut out = vec![7i8; samples_per_block + 10];
        let mut buf = OutputBuffers::Mono(&mut out);
        let emitted = decoder.decode(&gbs, &mut buf, samples_per_block + 10).unwrap();
        assert_eq!(emitted, samples_per_block);
        assert!(decoder.is_finished());
        for &v in &out[samples_per_block..] {
            assert_eq!(v, 0);
        }
    }

    #[test]
    fn restart_rewinds_block_and_sample_count() {
        let mut gbs = gbs_header(2);
        let mut block = vec![0u8; 512];
        block[0..2].copy_from_slice(&0x8000u16.to_le_bytes());
        gbs.extend_from_slice(&block.clone());
        gbs.extend_from_slice(&block);

        let mut decoder = AudioBlockDecoder::open(&gbs).unwrap();
        let mut out = vec![0i8; 100];
        let mut buf = OutputBuffers::Mono(&mut out);
        decoder.decode(&gbs, &mut buf, 100).unwrap();
        assert_eq!(decoder.samples_decoded(), 100);

        decoder.restart(&gbs).unwrap();
        assert_eq!(decoder.samples_decoded(), 0);
        assert!(!decoder.is_finished());
    }

    #[test]
    fn block_boundary_reparses_channel_state_from_header() {
        let mut gbs = gbs_header(2);
        let mut block0 = vec![0u8; 512];
        block0[0..2].copy_from_slice(&0x8000u16.to_le_bytes());
        let mut block1 = vec![0u8; 512];
        block1[0..2].copy_from_slice(&0x9000u16.to_le_bytes());
        gbs.extend_from_slice(&block0);
        gbs.extend_from_slice(&block1);

        let mut decoder = AudioBlockDecoder::open(&gbs).unwrap();
        let samples_per_block = (512 - 4) * 2;
        let mut out = vec![0i8; samples_per_block + 1];
        let mut buf = OutputBuffers::Mono(&mut out);
        decoder.decode(&gbs, &mut buf, samples_per_block + 1).unwrap();
        // One sample past the block boundary forces a reparse of block 1's header.
        assert_eq!(decoder.channels[0].predictor, 0x9000i32 - 0x8000);
    }
}
