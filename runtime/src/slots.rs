//! Ticket slots on the tournament roster.
//!
//! A reserved or paid ticket holds one unit of its tournament's capacity.
//! Holding checks the issuance preconditions and increments the counter in a
//! single compare-and-set save, re-run on a conflicting write so capacity is
//! re-validated against the latest tournament. Cancellation and expiry give
//! the slot back; a used ticket keeps it.

use crate::metrics::EngineMetrics;
use crate::retry::{RetryPolicy, retry_on_conflict};
use arena_core::environment::Clock;
use arena_core::repository::{TournamentRepository, Version};
use arena_core::ticket::{self, ExpiryPolicy};
use arena_core::tournament::Tournament;
use arena_core::types::TournamentId;
use arena_core::{EngineError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Capacity bookkeeping for tickets.
#[derive(Clone)]
pub struct TicketSlots<R> {
    tournaments: R,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl<R: TournamentRepository> TicketSlots<R> {
    /// Creates the bookkeeping over `tournaments`.
    pub fn new(tournaments: R, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            tournaments,
            clock,
            retry,
        }
    }

    /// The underlying tournament repository
    pub const fn tournaments(&self) -> &R {
        &self.tournaments
    }

    async fn save(&self, tournament: Tournament, expected: Version) -> Result<Version> {
        let id = tournament.id();
        match self.tournaments.save(tournament, expected).await {
            Err(err @ EngineError::ConcurrentModification { .. }) => {
                EngineMetrics::record_conflict("tournament");
                tracing::debug!(tournament_id = %id, error = %err, "Ticket slot write conflict");
                Err(err)
            }
            other => other,
        }
    }

    /// Holds one slot for a ticket issued at `now`.
    ///
    /// Returns the tournament as it was before the hold, which is what the
    /// new ticket snapshots.
    ///
    /// # Errors
    ///
    /// - `TicketNotIssuable` naming the failed precondition
    /// - `ConcurrentModification` once the retry budget is spent
    /// - `NotFound`, `Storage`
    pub async fn hold(
        &self,
        tournament_id: TournamentId,
        policy: &ExpiryPolicy,
        now: DateTime<Utc>,
    ) -> Result<Tournament> {
        retry_on_conflict(&self.retry, "hold_ticket_slot", || async move {
            let loaded = self.tournaments.load(tournament_id).await?;
            let before = loaded.value.clone();
            let mut tournament = loaded.value;
            ticket::reserve_issuance_slot(&mut tournament, policy, now)?;
            let held = tournament.held_ticket_slots();
            self.save(tournament, loaded.version).await?;
            tracing::debug!(%tournament_id, held, "Ticket slot held");
            Ok(before)
        })
        .await
    }

    /// Gives back the slot held by a ticket that was cancelled or expired,
    /// or whose issuance failed after the hold.
    ///
    /// The ticket transition is already committed, so a failure here is
    /// logged and counted rather than returned.
    pub async fn release(&self, tournament_id: TournamentId) {
        let result = retry_on_conflict(&self.retry, "release_ticket_slot", || async move {
            let loaded = self.tournaments.load(tournament_id).await?;
            let mut tournament = loaded.value;
            if !tournament.release_ticket_slot(self.clock.now()) {
                return Ok(false);
            }
            self.save(tournament, loaded.version).await?;
            Ok(true)
        })
        .await;

        match result {
            Ok(true) => tracing::debug!(%tournament_id, "Ticket slot released"),
            Ok(false) => tracing::warn!(%tournament_id, "No ticket slot held to release"),
            Err(err) => {
                EngineMetrics::record_slot_release_failure();
                tracing::warn!(%tournament_id, error = %err, "Ticket slot release failed");
            }
        }
    }
}
