//! Business metrics for the lifecycle engine.
//!
//! Recorded through the `metrics` facade; installing an exporter is up to the
//! host application. Without one, recording is a no-op.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `arena_tournament_transitions_total{to}` - Committed tournament transitions
//! - `arena_registrations_total{outcome}` - Participant registration attempts
//! - `arena_tickets_total{status}` - Ticket transitions (issued, paid, used, expired, cancelled)
//! - `arena_commission_cents_total` - Commission snapshotted at issuance
//! - `arena_code_collisions_total` - Code candidates rejected as taken at insert
//! - `arena_write_conflicts_total{entity}` - Optimistic-concurrency conflicts
//! - `arena_notification_failures_total` - Notifier deliveries that failed
//!
//! ## Histograms
//! - `arena_sweep_expired` - Tickets expired per sweep run
//! - `arena_sweep_duration_seconds` - Wall time of a sweep run

use arena_core::money::Money;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use rust_decimal::prelude::ToPrimitive;
use std::time::Duration;

/// Register descriptions of every engine metric.
///
/// Call once at startup, after the exporter is installed.
pub fn register_engine_metrics() {
    describe_counter!(
        "arena_tournament_transitions_total",
        "Committed tournament lifecycle transitions by target status"
    );
    describe_counter!(
        "arena_registrations_total",
        "Participant registration attempts by outcome (accepted, rejected, withdrawn)"
    );
    describe_counter!(
        "arena_tickets_total",
        "Ticket lifecycle transitions by status (issued, paid, used, expired, cancelled)"
    );
    describe_counter!(
        "arena_commission_cents_total",
        "Platform commission snapshotted on issued tickets, in cents"
    );
    describe_counter!(
        "arena_code_collisions_total",
        "Ticket code candidates rejected as already in use at insert"
    );
    describe_counter!(
        "arena_write_conflicts_total",
        "Optimistic-concurrency conflicts by aggregate"
    );
    describe_counter!(
        "arena_notification_failures_total",
        "Lifecycle notifications that could not be delivered"
    );
    describe_counter!(
        "arena_ticket_slot_release_failures_total",
        "Ticket slots that could not be given back to their tournament"
    );
    describe_histogram!("arena_sweep_expired", "Tickets expired per sweep run");
    describe_histogram!(
        "arena_sweep_duration_seconds",
        "Wall time of one expiration sweep run"
    );

    tracing::info!("Engine metrics registered");
}

/// Tournament metrics recorder.
pub struct TournamentMetrics;

impl TournamentMetrics {
    /// Record a committed transition.
    pub fn record_transition(to: &'static str) {
        counter!("arena_tournament_transitions_total", "to" => to).increment(1);
    }

    /// Record an accepted registration.
    pub fn record_registration() {
        counter!("arena_registrations_total", "outcome" => "accepted").increment(1);
    }

    /// Record a rejected registration.
    pub fn record_registration_rejected() {
        counter!("arena_registrations_total", "outcome" => "rejected").increment(1);
    }

    /// Record a withdrawal.
    pub fn record_withdrawal() {
        counter!("arena_registrations_total", "outcome" => "withdrawn").increment(1);
    }
}

/// Ticket metrics recorder.
pub struct TicketMetrics;

impl TicketMetrics {
    /// Record an issued ticket and its commission.
    pub fn record_issued(commission: Money) {
        counter!("arena_tickets_total", "status" => "issued").increment(1);
        let cents = (commission.amount() * rust_decimal::Decimal::ONE_HUNDRED)
            .to_u64()
            .unwrap_or(0);
        counter!("arena_commission_cents_total").increment(cents);
    }

    /// Record a ticket transition.
    pub fn record_transition(status: &'static str) {
        counter!("arena_tickets_total", "status" => status).increment(1);
    }

    /// Record a code collision at insert.
    pub fn record_code_collision() {
        counter!("arena_code_collisions_total").increment(1);
    }
}

/// Concurrency and delivery metrics recorder.
pub struct EngineMetrics;

impl EngineMetrics {
    /// Record an optimistic-concurrency conflict.
    pub fn record_conflict(entity: &'static str) {
        counter!("arena_write_conflicts_total", "entity" => entity).increment(1);
    }

    /// Record a ticket slot that could not be given back.
    pub fn record_slot_release_failure() {
        counter!("arena_ticket_slot_release_failures_total").increment(1);
    }

    /// Record a failed notification.
    pub fn record_notification_failure() {
        counter!("arena_notification_failures_total").increment(1);
    }

    /// Record one sweep run.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_sweep(expired: usize, duration: Duration) {
        histogram!("arena_sweep_expired").record(expired as f64);
        histogram!("arena_sweep_duration_seconds").record(duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_exporter_is_a_noop() {
        register_engine_metrics();
        TournamentMetrics::record_transition("PUBLISHED");
        TicketMetrics::record_issued(Money::from_cents(250));
        EngineMetrics::record_sweep(3, Duration::from_millis(12));
        EngineMetrics::record_slot_release_failure();
    }
}
