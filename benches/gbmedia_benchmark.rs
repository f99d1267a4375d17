use criterion::{black_box, criterion_group, criterion_main, Criterion};

use gbmedia::audio::{AudioBlockDecoder, OutputBuffers};
use gbmedia::video::{Reference, VideoFrameDecoder, FRAME_BYTES, HEADER_SIZE};

/// A synthetic GBM stream of `frames` all-unchanged-copy frames, version 4
/// (key 0) so `bit_enc` is the flag byte count directly.
fn synthetic_gbm(frames: usize) -> Vec<u8> {
    const FLAG_BYTES: usize = 150; // 600 macroblocks * 2 bits, rounded up.
    let mut gbm = vec![0u8; HEADER_SIZE];
    gbm[0..4].copy_from_slice(b"GBAM");
    gbm[4] = 0x04;
    for _ in 0..frames {
        let frame_len = (4 + FLAG_BYTES) as u16;
        gbm.extend_from_slice(&frame_len.to_le_bytes());
        gbm.extend_from_slice(&(FLAG_BYTES as u16).to_le_bytes());
        gbm.extend_from_slice(&0u16.to_le_bytes());
        gbm.extend_from_slice(&vec![0u8; FLAG_BYTES]);
    }
    gbm.extend_from_slice(&0x0000u16.to_le_bytes());
    gbm
}

/// A synthetic GBS stream (mode 2, mono 4-bit IMA) of `blocks` silent blocks.
fn synthetic_gbs(mode: u32, blocks: usize) -> Vec<u8> {
    let mut gbs = vec![0u8; gbmedia::audio::HEADER_SIZE];
    gbs[0..4].copy_from_slice(b"GBAL");
    gbs[4..8].copy_from_slice(b"MUSI");
    gbs[8..12].copy_from_slice(&mode.to_le_bytes());
    let block_size = gbmedia::audio::MODE_TABLE[mode as usize].block_size;
    for _ in 0..blocks {
        gbs.extend_from_slice(&vec![0u8; block_size]);
    }
    gbs
}

fn bench_video_decode(c: &mut Criterion) {
    let gbm = synthetic_gbm(64);
    let decoder = VideoFrameDecoder::open(&gbm).unwrap();
    let mut dst = vec![0u8; FRAME_BYTES];

    c.bench_function("video_decode_frame_all_unchanged", |b| {
        b.iter(|| {
            let mut offset = HEADER_SIZE;
            loop {
                match decoder.decode_frame(black_box(&gbm), offset, &mut dst, Reference::Intra).unwrap() {
                    Some(next) => offset = next,
                    None => break,
                }
            }
        })
    });
}

fn bench_audio_decode(c: &mut Criterion) {
    let gbs = synthetic_gbs(2, 64);
    let mut out = vec![0i8; 16_384];

    c.bench_function("audio_decode_mode2_ima4", |b| {
        b.iter(|| {
            let mut decoder = AudioBlockDecoder::open(black_box(&gbs)).unwrap();
            while !decoder.is_finished() {
                let mut buf = OutputBuffers::Mono(&mut out);
                decoder.decode(&gbs, &mut buf, out.len()).unwrap();
            }
        })
    });
}

criterion_group!(benches, bench_video_decode, bench_audio_decode);
criterion_main!(benches);
