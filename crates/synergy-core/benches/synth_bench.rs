//! Criterion benchmarks for the key synthesizer.
//!
//! Covers the cheap case (plain letter, modifiers already right) and the
//! expensive ones (modifier bridging, keypad with NumLock flipping).
//!
//! Run with:
//! ```bash
//! cargo bench --package synergy-core --bench synth_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use synergy_core::keymap::layouts::us_pc105;
use synergy_core::keymap::{keys, KeyAction, KeyId, KeySynthesizer, LocalKeyMap, ModifierMask};

fn synthesizer() -> KeySynthesizer {
    KeySynthesizer::new(LocalKeyMap::build(us_pc105()).expect("built-in layout is valid"))
}

fn bench_keymap_build(c: &mut Criterion) {
    c.bench_function("local_keymap_build_us", |b| {
        b.iter(|| LocalKeyMap::build(black_box(us_pc105())).unwrap())
    });
}

fn bench_map_key(c: &mut Criterion) {
    let plain = synthesizer();
    let mut numlocked = synthesizer();
    numlocked.set_mask(ModifierMask::NUM_LOCK);

    let mut group = c.benchmark_group("map_key");
    group.bench_function("plain_letter", |b| {
        b.iter(|| plain.map_key(black_box(KeyId(0x61)), ModifierMask::empty(), KeyAction::Press))
    });
    group.bench_function("shift_bridged_letter", |b| {
        b.iter(|| plain.map_key(black_box(KeyId(0x41)), ModifierMask::SHIFT, KeyAction::Press))
    });
    group.bench_function("keypad_numlock_flip", |b| {
        b.iter(|| {
            numlocked.map_key(black_box(keys::KP_HOME), ModifierMask::NUM_LOCK, KeyAction::Press)
        })
    });
    group.finish();
}

fn bench_typing(c: &mut Criterion) {
    let text = "The Quick Brown Fox, 1234!";
    c.bench_function("type_sentence", |b| {
        b.iter(|| {
            let mut synth = synthesizer();
            let mut strokes = 0;
            for ch in black_box(text).chars() {
                let Some(id) = KeyId::from_char(ch) else { continue };
                let mask = if ch.is_ascii_uppercase() {
                    ModifierMask::SHIFT
                } else {
                    ModifierMask::empty()
                };
                strokes += synth.key_down(id, mask).len();
                strokes += synth.key_up(id, mask).len();
            }
            strokes
        })
    });
}

criterion_group!(benches, bench_keymap_build, bench_map_key, bench_typing);
criterion_main!(benches);
