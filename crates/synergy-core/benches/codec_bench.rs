//! Criterion benchmarks for the record codec and the framing layer.
//!
//! Key and mouse records are on the hot path: every local input event on the
//! primary becomes one of them while a secondary is active.
//!
//! Run with:
//! ```bash
//! cargo bench --package synergy-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use synergy_core::keymap::{keys, KeyId, ModifierMask};
use synergy_core::protocol::{encode_frame, FrameDecoder, Message, OptionId, ScreenInfo};
use synergy_core::ClipboardId;

// ── Message fixtures ──────────────────────────────────────────────────────────

fn make_key_down() -> Message {
    Message::KeyDown {
        id: KeyId(0x41),
        mask: ModifierMask::SHIFT,
        button: 38,
    }
}

fn make_key_repeat() -> Message {
    Message::KeyRepeat {
        id: keys::BACKSPACE,
        mask: ModifierMask::empty(),
        count: 3,
        button: 22,
    }
}

fn make_mouse_move() -> Message {
    Message::MouseMove { x: 960, y: 540 }
}

fn make_enter() -> Message {
    Message::Enter {
        x: 1,
        y: 540,
        seq: 7,
        mask: ModifierMask::NUM_LOCK,
    }
}

fn make_info() -> Message {
    Message::Info(ScreenInfo {
        x: 0,
        y: 0,
        width: 1920,
        height: 1080,
        warp_zone: 1,
        cursor_x: 960,
        cursor_y: 540,
    })
}

fn make_options() -> Message {
    Message::SetOptions(vec![
        (OptionId::HALF_DUPLEX_CAPS_LOCK, 1),
        (OptionId::HALF_DUPLEX_NUM_LOCK, 0),
        (OptionId::HEARTBEAT, 3000),
    ])
}

fn make_clipboard_data() -> Message {
    Message::ClipboardData {
        id: ClipboardId::CLIPBOARD,
        seq: 12,
        data: vec![b'x'; 4096],
    }
}

fn fixtures() -> Vec<(&'static str, Message)> {
    vec![
        ("KeyDown", make_key_down()),
        ("KeyRepeat", make_key_repeat()),
        ("MouseMove", make_mouse_move()),
        ("Enter", make_enter()),
        ("Info", make_info()),
        ("SetOptions", make_options()),
        ("ClipboardData4K", make_clipboard_data()),
    ]
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for (name, msg) in fixtures() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &msg, |b, msg| {
            b.iter(|| black_box(msg).encode().unwrap())
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for (name, msg) in fixtures() {
        let payload = msg.encode().unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &payload, |b, payload| {
            b.iter(|| Message::decode(black_box(payload)).unwrap())
        });
    }
    group.finish();
}

/// A burst of 100 mouse moves arriving in one socket read.
fn bench_frame_burst(c: &mut Criterion) {
    let payload = make_mouse_move().encode().unwrap();
    let frame = encode_frame(&payload).unwrap();
    let burst: Vec<u8> = frame.iter().copied().cycle().take(frame.len() * 100).collect();

    c.bench_function("unframe_100_mouse_moves", |b| {
        b.iter(|| {
            let mut decoder = FrameDecoder::new();
            decoder.push(black_box(&burst));
            let mut n = 0;
            while let Some(frame) = decoder.next_frame().unwrap() {
                black_box(Message::decode(&frame).unwrap());
                n += 1;
            }
            n
        })
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_frame_burst);
criterion_main!(benches);
