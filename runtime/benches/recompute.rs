//! Lifted state machine benchmarks
//!
//! - Appending an action: only the new tip is computed
//! - Toggling an early action: the whole history is replayed
//! - Controller throughput: perform + flush through the fold loop
//!
//! Run with: `cargo bench -p rewind-runtime`

#![allow(missing_docs)]
#![allow(clippy::expect_used)]

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rewind_core::{LiftOptions, LiftedAction, LiftedReducer, LiftedState};
use rewind_runtime::{DevtoolsConfig, DevtoolsExtension, StoreDevtools};
use rewind_testing::{CounterAction, CounterReducer, CounterState, test_clock};
use std::sync::Arc;

fn engine(max_age: Option<usize>) -> LiftedReducer<CounterState, CounterAction> {
    LiftedReducer::new(
        CounterState::default(),
        None,
        LiftOptions {
            max_age,
            clock: Arc::new(test_clock()),
        },
    )
}

fn history(
    engine: &LiftedReducer<CounterState, CounterAction>,
    len: usize,
) -> LiftedState<CounterState, CounterAction> {
    let clock = test_clock();
    let mut lifted = engine.reduce(&CounterReducer, engine.initial_state(), &LiftedAction::Init);
    for _ in 0..len {
        let perform = LiftedAction::perform(CounterAction::Increment, &clock).expect("typed action");
        lifted = engine.reduce(&CounterReducer, lifted, &perform);
    }
    lifted
}

fn benchmark_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    group.throughput(Throughput::Elements(1));
    let clock = test_clock();

    for len in [10, 50, 500] {
        let engine = engine(None);
        let lifted = history(&engine, len);
        let perform = LiftedAction::perform(CounterAction::Increment, &clock).expect("typed action");

        group.bench_with_input(BenchmarkId::from_parameter(len), &lifted, |b, lifted| {
            b.iter(|| engine.reduce(&CounterReducer, black_box(lifted.clone()), &perform));
        });
    }

    group.bench_function("max_age_50", |b| {
        let engine = engine(Some(50));
        let lifted = history(&engine, 49);
        let perform = LiftedAction::perform(CounterAction::Increment, &clock).expect("typed action");
        b.iter(|| engine.reduce(&CounterReducer, black_box(lifted.clone()), &perform));
    });

    group.finish();
}

fn benchmark_toggle(c: &mut Criterion) {
    let mut group = c.benchmark_group("toggle_first_action");

    for len in [10, 50, 500] {
        let engine = engine(None);
        let lifted = history(&engine, len);
        let toggle = LiftedAction::ToggleAction { id: 1 };
        group.throughput(Throughput::Elements(len as u64));

        group.bench_with_input(BenchmarkId::from_parameter(len), &lifted, |b, lifted| {
            b.iter(|| engine.reduce(&CounterReducer, black_box(lifted.clone()), &toggle));
        });
    }

    group.finish();
}

fn benchmark_controller(c: &mut Criterion) {
    let mut group = c.benchmark_group("controller");
    group.throughput(Throughput::Elements(1));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    group.bench_function("perform_and_flush", |b| {
        let (scanned_tx, _scanned_rx) = tokio::sync::mpsc::unbounded_channel();
        let devtools = runtime.block_on(async {
            StoreDevtools::new(
                futures::stream::pending(),
                Arc::new(CounterReducer),
                DevtoolsExtension::detached(),
                scanned_tx,
                CounterState::default(),
                DevtoolsConfig::default().with_clock(Arc::new(test_clock())),
            )
            .expect("valid config")
        });

        b.to_async(&runtime).iter(|| async {
            devtools
                .dispatcher()
                .perform_action(black_box(CounterAction::Increment))
                .expect("running");
            devtools.flush().await.expect("running");
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_append, benchmark_toggle, benchmark_controller);
criterion_main!(benches);
