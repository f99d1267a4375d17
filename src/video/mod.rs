//! The GBM video decoder: header parsing, frame-record walking and the
//! recursive block tree that reconstructs a 240x160 RGB555 frame buffer.

pub mod block_ops;
pub mod codebook;
pub mod tree;

use tracing::{debug, warn};

use crate::errors::{malformed_header_error, truncated_stream_error, unsupported_error};
use crate::io::BitReader;
use crate::Result;

pub use block_ops::{Reference, FRAME_BYTES, FRAME_HEIGHT, FRAME_WIDTH, STRIDE};
use tree::{decode_block, PaletteReader, PayloadReader};

/// Size, in bytes, of the GBM payload header that precedes the first frame record.
pub const HEADER_SIZE: usize = 512;
const IDENTIFIER: &[u8; 4] = b"GBAM";

/// Frames are laid out 20 rows x 30 columns of 8x8 macroblocks.
pub const MACROBLOCK_ROWS: usize = 20;
pub const MACROBLOCK_COLS: usize = 30;
pub const MACROBLOCK_SIZE: usize = 8;

/// A frame record whose `frame_len` is one of these sentinels marks the end
/// of the GBM stream; the player loops back to the first frame record.
const END_OF_STREAM_LENS: [u16; 2] = [0x0000, 0xFFFF];

/// Resolves the XOR key used to deobfuscate a frame record's flag-byte count.
fn version_key(version: u8) -> Result<u16> {
    match version {
        0x06 => Ok(0xD669),
        0x05 => Ok(0xD6AC),
        0x04 => Ok(0x0000),
        _ => unsupported_error("gbm format version"),
    }
}

/// The fixed 512-byte GBM payload header.
pub struct GbmHeader {
    pub version: u8,
    version_key: u16,
}

impl GbmHeader {
    /// Parses the header at the start of `payload`. `payload` must be at
    /// least `HEADER_SIZE` bytes; the frame stream begins immediately after.
    pub fn parse(payload: &[u8]) -> Result<GbmHeader> {
        if payload.len() < HEADER_SIZE {
            return malformed_header_error("gbm payload shorter than header");
        }
        if &payload[0..4] != IDENTIFIER {
            return malformed_header_error("bad GBAM identifier");
        }
        let version = payload[4];
        let version_key = version_key(version)?;
        Ok(GbmHeader { version, version_key })
    }
}

/// The three sub-streams of one frame record, plus where the next record starts.
struct FrameRecord<'a> {
    flag_stream: &'a [u8],
    palette_stream: &'a [u8],
    payload_stream: &'a [u8],
    next_offset: usize,
}

/// Reads the 6-byte frame record header at `offset` and slices out its three
/// sub-streams. Returns `Ok(None)` if `frame_len` is an end-of-stream marker.
fn read_frame_record<'a>(gbm: &'a [u8], offset: usize, version_key: u16) -> Result<Option<FrameRecord<'a>>> {
    if offset + 6 > gbm.len() {
        return truncated_stream_error("frame record header truncated");
    }
    let frame_len = u16::from_le_bytes([gbm[offset], gbm[offset + 1]]);
    if END_OF_STREAM_LENS.contains(&frame_len) {
        debug!(offset, "end-of-stream marker, wrapping to first frame");
        return Ok(None);
    }
    let bit_enc = u16::from_le_bytes([gbm[offset + 2], gbm[offset + 3]]);
    let palette_bytes = u16::from_le_bytes([gbm[offset + 4], gbm[offset + 5]]) as usize;
    let flag_bytes = (bit_enc ^ version_key) as usize;
    let frame_len = frame_len as usize;

    if flag_bytes + palette_bytes > frame_len.saturating_sub(4) {
        return malformed_header_error("flag_bytes + palette_bytes exceeds frame_len");
    }
    let payload_bytes = frame_len - 4 - flag_bytes - palette_bytes;

    let flag_start = offset + 6;
    let palette_start = flag_start + flag_bytes;
    let payload_start = palette_start + palette_bytes;
    let payload_end = payload_start + payload_bytes;
    if payload_end > gbm.len() {
        return truncated_stream_error("frame record extends past end of buffer");
    }

    Ok(Some(FrameRecord {
        flag_stream: &gbm[flag_start..palette_start],
        palette_stream: &gbm[palette_start..payload_start],
        payload_stream: &gbm[payload_start..payload_end],
        next_offset: offset + 2 + frame_len,
    }))
}

/// Decodes GBM frame records against a caller-supplied frame buffer.
///
/// Holds only the version key; frame buffers, the reference frame and the
/// byte cursor are owned by the caller (the playback driver), per the
/// resource policy of statically-allocated, exclusively-owned buffers.
pub struct VideoFrameDecoder {
    version_key: u16,
}

impl VideoFrameDecoder {
    /// Opens a GBM payload, validating its header.
    pub fn open(gbm: &[u8]) -> Result<VideoFrameDecoder> {
        let header = GbmHeader::parse(gbm)?;
        Ok(VideoFrameDecoder { version_key: header.version_key })
    }

    /// Decodes one frame record at `offset` into `dst` (which must be
    /// `FRAME_BYTES` long), using `reference` as the motion/delta source.
    ///
    /// Precondition: for every region the flag stream marks unchanged-copy
    /// (`00`), `dst` must already hold the same content as `reference` --
    /// the unchanged-copy branch is a no-op rather than an explicit copy.
    /// Callers that don't keep `dst` and `reference` as the same buffer
    /// (intra mode) must pre-seed `dst` with `reference`'s content before
    /// calling this, e.g. by copying the prior frame in before decoding
    /// the next one.
    ///
    /// Returns the byte offset of the next frame record, or `None` if this
    /// record is an end-of-stream marker -- callers should wrap to
    /// `HEADER_SIZE` and retry.
    pub fn decode_frame(
        &self,
        gbm: &[u8],
        offset: usize,
        dst: &mut [u8],
        reference: Reference,
    ) -> Result<Option<usize>> {
        debug_assert_eq!(dst.len(), FRAME_BYTES);
        let record = match read_frame_record(gbm, offset, self.version_key)? {
            Some(record) => record,
            None => return Ok(None),
        };

        let mut bits = BitReader::new(record.flag_stream);
        let mut palette = PaletteReader::new(record.palette_stream);
        let mut payload = PayloadReader::new(record.payload_stream);

        for mb_row in 0..MACROBLOCK_ROWS {
            for mb_col in 0..MACROBLOCK_COLS {
                decode_block(
                    &mut bits,
                    &mut palette,
                    &mut payload,
                    dst,
                    reference,
                    mb_row * MACROBLOCK_SIZE,
                    mb_col * MACROBLOCK_SIZE,
                    MACROBLOCK_SIZE,
                    MACROBLOCK_SIZE,
                )?;
            }
        }

        Ok(Some(record.next_offset))
    }

    /// Walks every frame record once, from the first frame to the first
    /// end-of-stream marker (or end of buffer), recording the byte offset of
    /// every 600th frame -- the I-frame anchor for one minute of playback at
    /// the fixed 100ms/frame pace.
    pub fn scan_iframe_table(&self, gbm: &[u8]) -> Vec<usize> {
        const FRAMES_PER_MINUTE: usize = 600;

        let mut table = Vec::new();
        let mut offset = HEADER_SIZE;
        let mut frame_index = 0usize;

        while offset + 6 <= gbm.len() {
            match read_frame_record(gbm, offset, self.version_key) {
                Ok(Some(record)) => {
                    if frame_index % FRAMES_PER_MINUTE == 0 {
                        table.push(offset);
                    }
                    offset = record.next_offset;
                    frame_index += 1;
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(offset, %err, "iframe scan stopped on a malformed frame record");
                    break;
                }
            }
        }

        table
    }
}
