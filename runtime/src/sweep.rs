//! Expiration sweep.
//!
//! Finds tickets past their expiration date and expires them one by one. Only
//! the policy and the operation live here; scheduling the run is the host's
//! job.
//!
//! Each expired ticket gives its capacity slot back to the tournament.
//!
//! The sweep is idempotent. A ticket that another writer moved to a terminal
//! state between selection and save is reloaded, found terminal, and skipped
//! without error.

use crate::emit;
use crate::metrics::{EngineMetrics, TicketMetrics};
use crate::retry::{RetryPolicy, retry_on_conflict};
use crate::slots::TicketSlots;
use arena_core::environment::Clock;
use arena_core::event::{LifecycleEvent, LifecycleNotifier};
use arena_core::repository::{TicketRepository, TournamentRepository};
use arena_core::ticket::ExpiryOutcome;
use arena_core::types::{TicketId, TournamentId};
use arena_core::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Outcome of one sweep run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Candidates returned by the repository
    pub examined: usize,
    /// Tickets moved to `Expired`
    pub expired: usize,
    /// Candidates that were already terminal or not yet due on reload
    pub skipped: usize,
    /// Candidates that could not be processed
    pub failed: usize,
}

/// Periodic ticket expiration.
pub struct ExpirationSweep<K, R> {
    tickets: K,
    slots: TicketSlots<R>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn LifecycleNotifier>,
    batch_size: usize,
    retry: RetryPolicy,
}

impl<K: TicketRepository, R: TournamentRepository> ExpirationSweep<K, R> {
    /// Creates a sweep examining at most `batch_size` tickets per run.
    pub fn new(
        tickets: K,
        slots: TicketSlots<R>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn LifecycleNotifier>,
        batch_size: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            tickets,
            slots,
            clock,
            notifier,
            batch_size,
            retry,
        }
    }

    async fn expire_one(
        &self,
        id: TicketId,
        now: DateTime<Utc>,
    ) -> Result<(ExpiryOutcome, TournamentId)> {
        retry_on_conflict(&self.retry, "expire_ticket", || async move {
            let loaded = self.tickets.load(id).await?;
            let mut ticket = loaded.value;
            let tournament_id = ticket.tournament();
            let outcome = ticket.mark_as_expired(now);
            if outcome != ExpiryOutcome::Expired {
                return Ok((outcome, tournament_id));
            }
            match self.tickets.save(ticket, loaded.version).await {
                Ok(_) => Ok((outcome, tournament_id)),
                Err(err @ EngineError::ConcurrentModification { .. }) => {
                    EngineMetrics::record_conflict("ticket");
                    Err(err)
                }
                Err(err) => Err(err),
            }
        })
        .await
    }

    /// Runs one sweep.
    ///
    /// Per-ticket failures are counted and logged, never propagated.
    ///
    /// # Errors
    ///
    /// `Storage` if the candidate query fails.
    pub async fn run(&self) -> Result<SweepReport> {
        let started = Instant::now();
        let now = self.clock.now();
        let candidates = self.tickets.find_expirable(now, self.batch_size).await?;
        let mut report = SweepReport {
            examined: candidates.len(),
            ..SweepReport::default()
        };

        for id in candidates {
            match self.expire_one(id, now).await {
                Ok((ExpiryOutcome::Expired, tournament_id)) => {
                    report.expired += 1;
                    TicketMetrics::record_transition("expired");
                    tracing::info!(ticket_id = %id, %tournament_id, "Ticket expired");
                    self.slots.release(tournament_id).await;
                    emit(
                        self.notifier.as_ref(),
                        LifecycleEvent::TicketExpired {
                            ticket_id: id,
                            tournament_id,
                            at: now,
                        },
                    )
                    .await;
                }
                Ok((outcome, _)) => {
                    report.skipped += 1;
                    tracing::debug!(ticket_id = %id, ?outcome, "Expiry no longer applicable");
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(ticket_id = %id, error = %err, "Ticket expiry failed");
                }
            }
        }

        EngineMetrics::record_sweep(report.expired, started.elapsed());
        tracing::info!(
            examined = report.examined,
            expired = report.expired,
            skipped = report.skipped,
            failed = report.failed,
            "Expiration sweep finished"
        );
        Ok(report)
    }
}
