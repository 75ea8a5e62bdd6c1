//! Live update path: ordering, idempotency, append contract, pipeline.

#![allow(clippy::unwrap_used)]

mod common;

use common::{account, credit, debit, in_partition, ledger_record, stack};
use ledger_stream_core::event_store::{EventStore, EventStoreError};
use ledger_stream_core::projection::ProjectionStore;
use ledger_stream_core::stream::Version;
use ledger_stream_engine::pipeline::{PipelineConfig, ProjectionPipeline};
use ledger_stream_engine::updater::{ApplyOutcome, UpdaterError};
use ledger_stream_testing::EventSequence;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn debit_then_credit_materializes_the_running_balance() {
    let stack = stack().await;
    let aggregate = account("acct-1");
    let mut sequence = EventSequence::new(aggregate.clone());

    stack
        .commit(&mut sequence, &debit(100), in_partition())
        .await;
    assert_eq!(stack.balance(&aggregate.id).await.balance_minor, 100);

    stack
        .commit(&mut sequence, &credit(40), in_partition())
        .await;
    let balance = stack.balance(&aggregate.id).await;
    assert_eq!(balance.balance_minor, 60);
    assert_eq!(balance.entry_count, 2);
}

#[tokio::test]
async fn replaying_an_applied_event_is_a_no_op() {
    let stack = stack().await;
    let aggregate = account("acct-1");
    let mut sequence = EventSequence::new(aggregate.clone());

    let event = stack
        .commit(&mut sequence, &debit(100), in_partition())
        .await;

    let outcome = stack.updater.apply(&event).await.unwrap();
    assert_eq!(outcome, ApplyOutcome::AlreadyApplied);
    assert_eq!(stack.balance(&aggregate.id).await.balance_minor, 100);
    assert_eq!(stack.balance(&aggregate.id).await.entry_count, 1);
}

#[tokio::test]
async fn events_that_skip_ahead_are_deferred_not_folded() {
    let stack = stack().await;
    let aggregate = account("acct-1");
    let mut sequence = EventSequence::new(aggregate.clone());

    let first = ledger_record(&mut sequence, &debit(100), in_partition());
    let second = ledger_record(&mut sequence, &credit(40), in_partition());

    // Deliver v2 before v1.
    let outcome = stack.updater.apply(&second).await.unwrap();
    assert_eq!(
        outcome,
        ApplyOutcome::Deferred {
            expected: Version::FIRST
        }
    );
    assert!(
        stack
            .projections
            .load(aggregate.id.clone())
            .await
            .unwrap()
            .is_none()
    );

    // Once the gap fills, both fold in order.
    assert_eq!(
        stack.updater.apply(&first).await.unwrap(),
        ApplyOutcome::Applied
    );
    assert_eq!(
        stack.updater.apply(&second).await.unwrap(),
        ApplyOutcome::Applied
    );
    assert_eq!(stack.balance(&aggregate.id).await.balance_minor, 60);
}

#[tokio::test]
async fn version_never_advances_except_consecutively() {
    let stack = stack().await;
    let aggregate = account("acct-1");
    let mut sequence = EventSequence::new(aggregate.clone());

    let records: Vec<_> = (0..5)
        .map(|_| ledger_record(&mut sequence, &debit(10), in_partition()))
        .collect();

    // Adversarial delivery order with redeliveries mixed in. At every
    // step the projection either stays put or advances by exactly one.
    let mut high_water = Version::NONE;
    for index in [4, 2, 0, 3, 1, 4, 2, 3, 1, 0] {
        let _ = stack.updater.apply(&records[index]).await.unwrap();
        let projection = stack
            .projections
            .load(aggregate.id.clone())
            .await
            .unwrap();
        let version = projection.map_or(Version::NONE, |p| p.last_event_version);
        assert!(
            version == high_water || version == high_water.next(),
            "version jumped from {high_water} to {version}"
        );
        high_water = version;
    }

    // Redeliver in order; the stream settles completely.
    for record in &records {
        let _ = stack.updater.apply(record).await.unwrap();
    }
    assert_eq!(stack.balance(&aggregate.id).await.balance_minor, 50);
    assert_eq!(stack.balance(&aggregate.id).await.entry_count, 5);
}

#[tokio::test]
async fn concurrent_writers_race_for_one_version() {
    let stack = stack().await;
    let aggregate = account("acct-1");
    let mut sequence = EventSequence::new(aggregate.clone());
    for _ in 0..4 {
        stack
            .events
            .append(ledger_record(&mut sequence, &debit(1), in_partition()))
            .await
            .unwrap();
    }

    // Both writers derived version 5 from the same read.
    let mut left = EventSequence::new(aggregate.clone());
    let mut right = EventSequence::new(aggregate.clone());
    let mut contender_a = ledger_record(&mut left, &debit(5), in_partition());
    let mut contender_b = ledger_record(&mut right, &debit(7), in_partition());
    contender_a.version = Version::new(5);
    contender_b.version = Version::new(5);

    let (first, second) = tokio::join!(
        stack.events.append(contender_a),
        stack.events.append(contender_b)
    );
    let failures = [&first, &second]
        .iter()
        .filter(|r| matches!(r, Err(EventStoreError::VersionConflict { version, .. }) if *version == Version::new(5)))
        .count();
    assert_eq!(failures, 1, "exactly one writer must lose");
    assert_eq!(
        stack.events.max_version(aggregate).await.unwrap(),
        Version::new(5)
    );
}

#[tokio::test]
async fn conflicted_write_retries_until_it_wins() {
    let stack = stack().await;
    let aggregate = account("acct-1");
    let mut sequence = EventSequence::new(aggregate.clone());
    stack
        .commit(&mut sequence, &debit(100), in_partition())
        .await;

    let second = ledger_record(&mut sequence, &credit(40), in_partition());
    // Two lost races fit inside the three-retry schedule.
    stack.projections.inject_conflicts(2);

    let outcome = stack.updater.apply(&second).await.unwrap();
    assert_eq!(outcome, ApplyOutcome::Applied);
    let balance = stack.balance(&aggregate.id).await;
    assert_eq!(balance.balance_minor, 60);
    assert_eq!(balance.entry_count, 2);
}

#[tokio::test]
async fn exhausted_cas_retries_surface_as_a_persistent_conflict() {
    let stack = stack().await;
    let aggregate = account("acct-1");
    let mut sequence = EventSequence::new(aggregate.clone());
    stack
        .commit(&mut sequence, &debit(100), in_partition())
        .await;

    let second = ledger_record(&mut sequence, &credit(40), in_partition());
    // One conflict per attempt the schedule allows: initial try + 3 retries.
    stack.projections.inject_conflicts(4);

    let err = stack.updater.apply(&second).await.unwrap_err();
    assert!(matches!(
        err,
        UpdaterError::PersistentConflict { version, .. } if version == Version::new(2)
    ));
    // The failed write left the projection untouched.
    assert_eq!(stack.balance(&aggregate.id).await.balance_minor, 100);

    // Redelivery succeeds once the contention clears.
    assert_eq!(
        stack.updater.apply(&second).await.unwrap(),
        ApplyOutcome::Applied
    );
    assert_eq!(stack.balance(&aggregate.id).await.balance_minor, 60);
}

#[tokio::test]
async fn pipeline_redelivers_after_a_persistent_conflict() {
    let stack = stack().await;
    let aggregate = account("acct-1");
    let mut sequence = EventSequence::new(aggregate.clone());
    stack
        .commit(&mut sequence, &debit(100), in_partition())
        .await;
    let second = ledger_record(&mut sequence, &credit(40), in_partition());

    let pipeline = ProjectionPipeline::start(
        Arc::clone(&stack.updater),
        PipelineConfig {
            requeue_delay: Duration::from_millis(5),
            ..PipelineConfig::default()
        },
    );

    // Contention outlasts one whole retry schedule, then clears; the
    // event must come back around instead of being dropped.
    stack.projections.inject_conflicts(4);
    pipeline.publish(second).await.unwrap();
    pipeline.drain().await;

    let balance = stack.balance(&aggregate.id).await;
    assert_eq!(balance.balance_minor, 60);
    assert_eq!(balance.entry_count, 2);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn pipeline_settles_out_of_order_deliveries() {
    let stack = stack().await;
    let aggregate = account("acct-1");
    let mut sequence = EventSequence::new(aggregate.clone());
    let first = ledger_record(&mut sequence, &debit(100), in_partition());
    let second = ledger_record(&mut sequence, &credit(40), in_partition());
    let third = ledger_record(&mut sequence, &debit(25), in_partition());

    let pipeline = ProjectionPipeline::start(
        Arc::clone(&stack.updater),
        PipelineConfig {
            requeue_delay: Duration::from_millis(5),
            ..PipelineConfig::default()
        },
    );

    // Worst case: reverse order.
    pipeline.publish(third).await.unwrap();
    pipeline.publish(second).await.unwrap();
    pipeline.publish(first).await.unwrap();
    pipeline.drain().await;

    let balance = stack.balance(&aggregate.id).await;
    assert_eq!(balance.balance_minor, 85);
    assert_eq!(balance.entry_count, 3);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn pipeline_keeps_independent_aggregates_independent() {
    let stack = stack().await;
    let pipeline = ProjectionPipeline::start(
        Arc::clone(&stack.updater),
        PipelineConfig::default(),
    );

    for id in ["acct-1", "acct-2", "acct-3"] {
        let mut sequence = EventSequence::new(account(id));
        for _ in 0..4 {
            pipeline
                .publish(ledger_record(&mut sequence, &debit(10), in_partition()))
                .await
                .unwrap();
        }
    }
    pipeline.drain().await;

    for id in ["acct-1", "acct-2", "acct-3"] {
        let balance = stack.balance(&account(id).id).await;
        assert_eq!(balance.balance_minor, 40);
    }
    pipeline.shutdown().await;
}

#[tokio::test]
async fn shutdown_processes_buffered_events_first() {
    let stack = stack().await;
    let pipeline = ProjectionPipeline::start(
        Arc::clone(&stack.updater),
        PipelineConfig::default(),
    );
    let aggregate = account("acct-1");
    let mut sequence = EventSequence::new(aggregate.clone());
    for _ in 0..3 {
        pipeline
            .publish(ledger_record(&mut sequence, &debit(10), in_partition()))
            .await
            .unwrap();
    }

    // No drain: shutdown itself must flush the lanes.
    pipeline.shutdown().await;
    assert_eq!(stack.balance(&aggregate.id).await.entry_count, 3);
}
