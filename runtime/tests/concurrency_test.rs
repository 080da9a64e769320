//! Races between concurrent writers.
//!
//! Each test spawns real tasks on a multi-threaded runtime. Interleavings that
//! timing alone would rarely produce are forced through the in-memory
//! repository hooks.

#![allow(clippy::unwrap_used, clippy::panic)]

use arena_core::environment::Clock;
use arena_core::error::{EngineError, IssuanceBlocker};
use arena_core::ticket::{Ticket, TicketStatus};
use arena_core::types::UserId;
use arena_runtime::{Engine, EngineConfig};
use arena_testing::{
    InMemoryTicketRepository, InMemoryTournamentRepository, ManualClock, RecordingNotifier,
    TournamentFixture, init_tracing, test_clock,
};
use chrono::Duration;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

type TestEngine = Engine<InMemoryTicketRepository, InMemoryTournamentRepository>;

struct Harness {
    clock: ManualClock,
    tickets: InMemoryTicketRepository,
    engine: Arc<TestEngine>,
}

fn harness_with(config: &EngineConfig) -> Harness {
    init_tracing();
    let clock = ManualClock::new(test_clock().now());
    let tickets = InMemoryTicketRepository::new();
    let engine = Engine::from_config(
        config,
        InMemoryTournamentRepository::new(),
        tickets.clone(),
        Arc::new(clock.clone()),
        Arc::new(RecordingNotifier::new()),
    )
    .unwrap();
    Harness {
        clock,
        tickets,
        engine: Arc::new(engine),
    }
}

fn harness() -> Harness {
    harness_with(&EngineConfig::default())
}

async fn published(engine: &TestEngine, capacity: u32) -> arena_core::types::TournamentId {
    let draft = engine
        .tournaments
        .create(TournamentFixture::paid(capacity).input())
        .await
        .unwrap();
    engine.tournaments.publish(draft.id()).await.unwrap().id()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn capacity_holds_under_concurrent_registration() {
    let h = harness();
    let id = published(&h.engine, 5).await;

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let engine = Arc::clone(&h.engine);
            tokio::spawn(async move {
                engine
                    .tournaments
                    .register_participant(id, UserId::new(), None)
                    .await
            })
        })
        .collect();

    let mut accepted = 0;
    let mut full = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(EngineError::CapacityExceeded { max: 5 }) => full += 1,
            Err(other) => panic!("unexpected registration error: {other}"),
        }
    }

    assert_eq!(accepted, 5);
    assert_eq!(full, 15);
    let tournament = h.engine.tournaments.get(id).await.unwrap();
    assert_eq!(tournament.current_participants(), 5);
    assert!(tournament.is_full());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn issuance_holds_capacity_under_concurrent_requests() {
    let h = harness();
    let id = published(&h.engine, 3).await;

    let issued = join_all((0..10).map(|_| {
        let engine = Arc::clone(&h.engine);
        tokio::spawn(async move { engine.tickets.issue(id, UserId::new()).await })
    }))
    .await;

    let mut accepted = 0;
    let mut full = 0;
    for joined in issued {
        match joined.unwrap() {
            Ok(_) => accepted += 1,
            Err(EngineError::TicketNotIssuable {
                reason: IssuanceBlocker::NoCapacity,
            }) => full += 1,
            Err(other) => panic!("unexpected issuance error: {other}"),
        }
    }

    assert_eq!(accepted, 3);
    assert_eq!(full, 7);
    assert_eq!(h.tickets.all().await.len(), 3);
    let tournament = h.engine.tournaments.get(id).await.unwrap();
    assert_eq!(tournament.held_ticket_slots(), 3);
    assert!(tournament.is_full());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_issuance_yields_unique_codes() {
    let mut config = EngineConfig::default();
    config.conflicts.max_retries = 100;
    config.conflicts.max_delay_ms = 20;
    let h = harness_with(&config);
    let id = published(&h.engine, 100).await;

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let engine = Arc::clone(&h.engine);
            tokio::spawn(async move { engine.tickets.issue(id, UserId::new()).await })
        })
        .collect();

    let mut codes = HashSet::new();
    for handle in handles {
        let ticket = handle.await.unwrap().unwrap();
        codes.insert(ticket.code().clone());
    }
    assert_eq!(codes.len(), 50);
    assert_eq!(h.tickets.all().await.len(), 50);
    assert_eq!(
        h.engine.tournaments.get(id).await.unwrap().held_ticket_slots(),
        50
    );
}

#[tokio::test]
async fn insert_collisions_within_budget_are_absorbed() {
    let h = harness();
    let id = published(&h.engine, 10).await;

    h.tickets.force_code_collisions(2).await;
    let ticket = h.engine.tickets.issue(id, UserId::new()).await.unwrap();
    assert_eq!(ticket.status(), TicketStatus::Reserved);
    assert_eq!(h.tickets.all().await.len(), 1);
}

#[tokio::test]
async fn insert_collisions_beyond_budget_exhaust_generation() {
    let mut config = EngineConfig::default();
    config.codes.max_attempts = 3;
    let h = harness_with(&config);
    let id = published(&h.engine, 10).await;

    h.tickets.force_code_collisions(3).await;
    let result = h.engine.tickets.issue(id, UserId::new()).await;
    assert!(matches!(
        result,
        Err(EngineError::CodeGenerationExhausted { attempts: 3 })
    ));
    assert!(h.tickets.all().await.is_empty());
    assert_eq!(
        h.engine.tournaments.get(id).await.unwrap().held_ticket_slots(),
        0
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn double_payment_succeeds_once() {
    let h = harness();
    let id = published(&h.engine, 10).await;
    let ticket = h.engine.tickets.issue(id, UserId::new()).await.unwrap();

    let payments: Vec<_> = ["ref-a", "ref-b"]
        .into_iter()
        .map(|reference| {
            let engine = Arc::clone(&h.engine);
            let ticket_id = ticket.id();
            tokio::spawn(async move { engine.tickets.pay(ticket_id, reference).await })
        })
        .collect();

    let mut paid = Vec::new();
    for handle in payments {
        match handle.await.unwrap() {
            Ok(ticket) => paid.push(ticket),
            Err(
                EngineError::ConcurrentModification { .. }
                | EngineError::InvalidStateTransition { .. },
            ) => {}
            Err(other) => panic!("unexpected payment error: {other}"),
        }
    }

    assert_eq!(paid.len(), 1);
    let stored = h.engine.tickets.get(ticket.id()).await.unwrap();
    assert_eq!(stored.status(), TicketStatus::Paid);
    assert_eq!(stored.payment_reference(), paid[0].payment_reference());
}

#[tokio::test]
async fn sweep_skips_a_ticket_cancelled_mid_flight() {
    let h = harness();
    let id = published(&h.engine, 10).await;
    let ticket = h.engine.tickets.issue(id, UserId::new()).await.unwrap();
    let cancelled_at = ticket.expiration_date();

    h.clock.set(ticket.expiration_date() + Duration::minutes(5));
    h.tickets
        .interleave_write(
            ticket.id(),
            Box::new(move |t: &mut Ticket| {
                let _ = t.cancel(cancelled_at);
            }),
        )
        .await;

    let report = h.engine.sweep.run().await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.expired, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(
        h.engine.tickets.get(ticket.id()).await.unwrap().status(),
        TicketStatus::Cancelled
    );
}

#[tokio::test]
async fn sweep_retries_a_non_terminal_conflict() {
    let h = harness();
    let id = published(&h.engine, 10).await;
    let ticket = h.engine.tickets.issue(id, UserId::new()).await.unwrap();

    h.clock.set(ticket.expiration_date());
    h.tickets
        .interleave_write(ticket.id(), Box::new(|_: &mut Ticket| {}))
        .await;

    let report = h.engine.sweep.run().await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(
        h.engine.tickets.get(ticket.id()).await.unwrap().status(),
        TicketStatus::Expired
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_sweeps_expire_each_ticket_once() {
    let h = harness();
    let id = published(&h.engine, 20).await;
    for _ in 0..10 {
        h.engine.tickets.issue(id, UserId::new()).await.unwrap();
    }
    h.clock.advance(Duration::days(30));
    assert!(h.clock.now() > h.tickets.all().await[0].expiration_date());

    let runs = (0..3).map(|_| {
        let engine = Arc::clone(&h.engine);
        tokio::spawn(async move { engine.sweep.run().await })
    });

    let mut expired = 0;
    for joined in join_all(runs).await {
        let report = joined.unwrap().unwrap();
        assert_eq!(report.failed, 0);
        expired += report.expired;
    }
    assert_eq!(expired, 10);
    assert_eq!(
        h.engine.tournaments.get(id).await.unwrap().held_ticket_slots(),
        0
    );
    assert!(
        h.tickets
            .all()
            .await
            .iter()
            .all(|t| t.status() == TicketStatus::Expired)
    );
}
