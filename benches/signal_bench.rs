// ── Luma Engine: signal extraction benchmarks ──────────────────────────────
//
// The extractors run on every keystroke-to-send path, so they need to stay
// comfortably sub-millisecond per utterance.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use luma_engine::engine::assembler::assemble;
use luma_engine::engine::journey::JourneyState;
use luma_engine::engine::recovery::RecoveryState;
use luma_engine::{EmotionState, SituationalFacts, TurnSignals};

const UTTERANCES: &[&str] = &[
    "remind me to call mom in 10 minutes",
    "I'm so stressed, deadline tomorrow",
    "do you remember what I said about the trip?",
    "my exam and homework schedule is packed this semester",
    "good evening, how are you?",
    "can't sleep, up all night again working on the pitch deck for the investor",
];

fn bench_extract(c: &mut Criterion) {
    let now = Utc::now();
    let trend = [EmotionState::Stressed, EmotionState::Stressed];

    c.bench_function("extract_all_signals", |b| {
        b.iter(|| {
            for u in UTTERANCES {
                black_box(TurnSignals::extract(black_box(u), &trend, now));
            }
        })
    });
}

fn bench_assemble(c: &mut Criterion) {
    let now = Utc::now();
    let signals = TurnSignals::extract("remind me to call mom in 10 minutes", &[], now);
    let recovery = RecoveryState::default();
    let journey = JourneyState::default();

    c.bench_function("assemble_directive", |b| {
        b.iter(|| {
            black_box(assemble(
                black_box(&signals),
                &recovery,
                &journey,
                SituationalFacts::default(),
            ))
        })
    });
}

criterion_group!(benches, bench_extract, bench_assemble);
criterion_main!(benches);
