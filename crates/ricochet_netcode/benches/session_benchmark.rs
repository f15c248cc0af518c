//! Benchmarks for the per-tick hot path.
//!
//! TARGET: a full 8-player tick well under 1 ms (budget is 16.6 ms at 60 Hz)
//!
//! Run with: cargo bench --package ricochet_netcode --bench session_benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use ricochet_netcode::{HistoryStore, NetcodeConfig, NullReplication, PredictionBuffer, Session};
use ricochet_shared::{
    AuthoritativeState, EntityId, FireRequest, HistoryFrame, InputCommand, Vec2, Vec3,
};

fn arena_config() -> NetcodeConfig {
    let mut config = NetcodeConfig::default();
    config.simulation.spawn_points = (0..8)
        .map(|i| [i as f32 * 2.0, 0.0, 10.0 + (i % 2) as f32])
        .collect();
    config.weapon.capacity = u32::MAX;
    config
}

fn benchmark_full_tick(c: &mut Criterion) {
    let mut session = Session::new(arena_config(), NullReplication);
    let handles: Vec<_> = (0..8).filter_map(|_| session.connect().ok()).collect();

    let mut group = c.benchmark_group("session_tick");
    group.throughput(Throughput::Elements(handles.len() as u64));

    group.bench_function("8_players_moving_and_firing", |b| {
        let mut sequence = 0u32;
        b.iter(|| {
            sequence += 1;
            let now = session.now();
            for (i, handle) in handles.iter().enumerate() {
                let angle = (sequence as f32 * 0.05) + i as f32;
                let command =
                    InputCommand::new(sequence, Vec2::new(angle.cos(), angle.sin()), 15.0, now)
                        .unwrap_or_default();
                let _ = handle.send_input(command);
                if sequence % 6 == 0 {
                    let _ = handle.send_fire(FireRequest::new(
                        Vec3::new(i as f32 * 2.0, 1.0, 0.0),
                        Vec3::Z,
                        now - 0.1,
                    ));
                }
            }
            black_box(session.tick())
        });
    });

    group.finish();
}

fn benchmark_reconciliation(c: &mut Criterion) {
    let config = NetcodeConfig::default();

    c.bench_function("reconcile_replay_60_pending", |b| {
        b.iter_batched(
            || {
                let mut buffer = PredictionBuffer::new(&config, Vec3::ZERO);
                for seq in 1..=61 {
                    let command = InputCommand::new(seq, Vec2::new(0.3, 0.9), 20.0, 0.0)
                        .unwrap_or_default();
                    let _ = buffer.enqueue(command);
                }
                buffer
            },
            |mut buffer| {
                let state = AuthoritativeState {
                    position: Vec3::new(0.5, 0.0, 0.5),
                    grounded: true,
                    ..AuthoritativeState::default()
                };
                black_box(buffer.on_authoritative_update(&state, Some(1)))
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn benchmark_rewind(c: &mut Criterion) {
    let mut history = HistoryStore::new(1.0);
    for entity in 0..8 {
        for tick in 0..60u64 {
            history.record(
                EntityId(entity),
                HistoryFrame {
                    tick,
                    time: tick as f32 / 60.0,
                    position: Vec3::new(tick as f32 * 0.1, 0.0, entity as f32),
                    yaw: 0.0,
                },
            );
        }
    }

    c.bench_function("history_rewind", |b| {
        let mut t = 0.0f32;
        b.iter(|| {
            t = (t + 0.013) % 1.0;
            black_box(history.rewind(black_box(EntityId(3)), black_box(t)))
        });
    });
}

criterion_group!(
    benches,
    benchmark_full_tick,
    benchmark_reconciliation,
    benchmark_rewind
);
criterion_main!(benches);
