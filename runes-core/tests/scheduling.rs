//! Deferred Wave Tests
//!
//! These tests drive graphs built with the `LocalTaskScheduler`, where waves
//! run as tasks on a tokio `LocalSet` instead of on an explicit flush.

use std::cell::Cell;
use std::rc::Rc;

use runes_core::reactive::{Graph, LocalTaskScheduler};
use tokio::task::{self, LocalSet};

/// Test that a burst of writes is coalesced into one deferred wave.
#[tokio::test]
async fn burst_of_writes_runs_one_wave() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let graph = Graph::builder().scheduler(LocalTaskScheduler).build();
            let a = graph.state(0);
            let runs = Rc::new(Cell::new(0));
            let doubled = graph.derived({
                let (a, runs) = (a.clone(), Rc::clone(&runs));
                move || {
                    runs.set(runs.get() + 1);
                    a.get() * 2
                }
            });

            a.set(1);
            a.set(2);
            a.set(3);
            assert!(graph.has_pending_wave());
            assert_eq!(doubled.get(), 0);

            task::yield_now().await;

            assert!(!graph.has_pending_wave());
            assert_eq!(doubled.get(), 6);
            assert_eq!(runs.get(), 2);
        })
        .await;
}

/// Test that a subscriber write schedules a follow-up wave.
#[tokio::test]
async fn subscriber_writes_are_deferred_again() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let graph = Graph::builder().scheduler(LocalTaskScheduler).build();
            let source = graph.state(1);
            let echo = graph.state(0);
            let _subscription = graph.subscribe(source.id(), {
                let (source, echo) = (source.clone(), echo.clone());
                move || echo.set(source.peek())
            });

            let echoed = Rc::new(Cell::new(0));
            let _echo_subscription = graph.subscribe(echo.id(), {
                let echoed = Rc::clone(&echoed);
                move || echoed.set(echoed.get() + 1)
            });

            source.set(5);
            // One wave notifies the subscriber, which writes `echo`; a
            // second wave reports that change.
            task::yield_now().await;
            task::yield_now().await;

            assert_eq!(echo.get(), 5);
            assert_eq!(echoed.get(), 1);
            assert!(!graph.has_pending_wave());
        })
        .await;
}

/// Test that a deferred wave whose graph is gone does nothing.
#[tokio::test]
async fn wave_after_graph_drop_is_a_no_op() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let graph = Graph::builder().scheduler(LocalTaskScheduler).build();
            let a = graph.state(0);
            a.set(1);
            drop(graph);

            task::yield_now().await;
            assert!(a.try_get().is_err());
        })
        .await;
}

/// Test that an explicit flush still works and the deferred task then
/// finds nothing to do.
#[tokio::test]
async fn flush_preempts_the_deferred_wave() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let graph = Graph::builder().scheduler(LocalTaskScheduler).build();
            let a = graph.state(0);
            let notified = Rc::new(Cell::new(0));
            let _subscription = graph.subscribe(a.id(), {
                let notified = Rc::clone(&notified);
                move || notified.set(notified.get() + 1)
            });

            a.set(1);
            let report = graph.flush().unwrap();
            assert_eq!(report.passes, 1);

            task::yield_now().await;
            assert_eq!(notified.get(), 1);
        })
        .await;
}
