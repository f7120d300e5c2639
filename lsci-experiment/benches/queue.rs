use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lsci_experiment::{SessionConfig, SessionQueue};

fn large_session() -> SessionConfig {
    SessionConfig {
        subjects: (1..=40).map(|i| format!("P{i:02}")).collect(),
        repetitions: 10,
        shape_reps_per_subsession: 3,
        ..SessionConfig::default()
    }
}

fn bench_build(c: &mut Criterion) {
    let config = large_session();
    c.bench_function("session_queue_build", |b| {
        b.iter(|| SessionQueue::build(black_box(&config)))
    });
}

fn bench_walk(c: &mut Criterion) {
    let config = large_session();
    let queue = SessionQueue::build(&config).unwrap();
    c.bench_function("session_queue_walk", |b| {
        b.iter(|| {
            let mut queue = queue.clone();
            let mut boundaries = 0usize;
            while !queue.is_complete() {
                if queue.is_last_shape_in_current_subsession() {
                    boundaries += 1;
                }
                queue.advance();
            }
            black_box(boundaries)
        })
    });
}

criterion_group!(benches, bench_build, bench_walk);
criterion_main!(benches);
