//! Tournament orchestration.
//!
//! Every operation is a load → mutate → compare-and-set cycle against the
//! [`TournamentRepository`]. Registration and withdrawal re-run the cycle on a
//! conflicting write, so capacity is re-validated against the latest roster;
//! all other operations surface the conflict to the caller.

use crate::emit;
use crate::metrics::{EngineMetrics, TournamentMetrics};
use crate::retry::{RetryPolicy, retry_on_conflict};
use arena_core::environment::Clock;
use arena_core::event::{LifecycleEvent, LifecycleNotifier};
use arena_core::money::{CommissionRate, Money};
use arena_core::repository::TournamentRepository;
use arena_core::tournament::{BasicInfoUpdate, NewTournament, Pricing, Schedule, Streaming, Tournament};
use arena_core::types::{TournamentId, UserId};
use arena_core::{EngineError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Tournament lifecycle service.
pub struct TournamentService<R> {
    repository: R,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn LifecycleNotifier>,
    retry: RetryPolicy,
}

impl<R: TournamentRepository> TournamentService<R> {
    /// Creates a service.
    pub fn new(
        repository: R,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn LifecycleNotifier>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            repository,
            clock,
            notifier,
            retry,
        }
    }

    /// The underlying repository
    pub const fn repository(&self) -> &R {
        &self.repository
    }

    /// Load → mutate → save at the loaded version.
    async fn modify<F>(&self, id: TournamentId, mutate: F) -> Result<(Tournament, DateTime<Utc>)>
    where
        F: FnOnce(&mut Tournament, DateTime<Utc>) -> Result<()> + Send,
    {
        let loaded = self.repository.load(id).await?;
        let mut tournament = loaded.value;
        let now = self.clock.now();
        mutate(&mut tournament, now)?;
        match self.repository.save(tournament.clone(), loaded.version).await {
            Ok(version) => {
                tracing::debug!(tournament_id = %id, %version, "Tournament saved");
                Ok((tournament, now))
            }
            Err(err @ EngineError::ConcurrentModification { .. }) => {
                EngineMetrics::record_conflict("tournament");
                tracing::debug!(tournament_id = %id, error = %err, "Tournament write conflict");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Creates a draft tournament.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for invalid input, `Storage` on backend failure.
    pub async fn create(&self, input: NewTournament) -> Result<Tournament> {
        let tournament = Tournament::create(input, self.clock.now())?;
        self.repository.insert(tournament.clone()).await?;
        tracing::info!(
            tournament_id = %tournament.id(),
            organizer = %tournament.organizer(),
            "Tournament created"
        );
        Ok(tournament)
    }

    /// Loads a tournament.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub async fn get(&self, id: TournamentId) -> Result<Tournament> {
        Ok(self.repository.load(id).await?.value)
    }

    /// Whether registration is currently open with free capacity.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub async fn can_register_participants(&self, id: TournamentId) -> Result<bool> {
        let tournament = self.get(id).await?;
        Ok(tournament.can_register_participants(self.clock.now()))
    }

    /// Commission estimate over the current roster.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub async fn total_commission(&self, id: TournamentId) -> Result<Money> {
        Ok(self.get(id).await?.calculate_total_commission())
    }

    async fn transition<F>(
        &self,
        id: TournamentId,
        to: &'static str,
        mutate: F,
        event: fn(TournamentId, DateTime<Utc>) -> LifecycleEvent,
    ) -> Result<Tournament>
    where
        F: FnOnce(&mut Tournament, DateTime<Utc>) -> Result<()> + Send,
    {
        let (tournament, at) = self.modify(id, mutate).await?;
        TournamentMetrics::record_transition(to);
        tracing::info!(tournament_id = %id, status = to, "Tournament transitioned");
        emit(self.notifier.as_ref(), event(id, at)).await;
        Ok(tournament)
    }

    /// `Draft → Published`.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition`, `ConcurrentModification`, `NotFound`.
    pub async fn publish(&self, id: TournamentId) -> Result<Tournament> {
        self.transition(id, "PUBLISHED", |t, now| t.publish(now), |tournament_id, at| {
            LifecycleEvent::TournamentPublished { tournament_id, at }
        })
        .await
    }

    /// `Published → InProgress`.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition`, `InsufficientParticipants`,
    /// `ConcurrentModification`, `NotFound`.
    pub async fn start(&self, id: TournamentId) -> Result<Tournament> {
        self.transition(id, "IN_PROGRESS", |t, now| t.start(now), |tournament_id, at| {
            LifecycleEvent::TournamentStarted { tournament_id, at }
        })
        .await
    }

    /// `InProgress → Finished`.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition`, `ConcurrentModification`, `NotFound`.
    pub async fn finish(&self, id: TournamentId) -> Result<Tournament> {
        self.transition(id, "FINISHED", |t, now| t.finish(now), |tournament_id, at| {
            LifecycleEvent::TournamentFinished { tournament_id, at }
        })
        .await
    }

    /// Cancels a live tournament.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition`, `ConcurrentModification`, `NotFound`.
    pub async fn cancel(&self, id: TournamentId) -> Result<Tournament> {
        self.transition(id, "CANCELLED", |t, now| t.cancel(now), |tournament_id, at| {
            LifecycleEvent::TournamentCancelled { tournament_id, at }
        })
        .await
    }

    /// Soft-deletes a tournament. Deleting twice emits one event.
    ///
    /// # Errors
    ///
    /// `DeletionNotAllowed` while running, `ConcurrentModification`,
    /// `NotFound`.
    pub async fn delete(&self, id: TournamentId) -> Result<Tournament> {
        let loaded = self.repository.load(id).await?;
        if loaded.value.is_deleted() {
            return Ok(loaded.value);
        }
        self.transition(id, "DELETED", |t, now| t.delete(now), |tournament_id, at| {
            LifecycleEvent::TournamentDeleted { tournament_id, at }
        })
        .await
    }

    /// Registers `user`, re-validating capacity on every conflicting write.
    ///
    /// # Errors
    ///
    /// `RegistrationClosed`, `AlreadyRegistered`, `CapacityExceeded`,
    /// `InvalidArgument`, `NotFound`, or `ConcurrentModification` once the
    /// retry budget is spent.
    pub async fn register_participant(
        &self,
        id: TournamentId,
        user: UserId,
        team_name: Option<String>,
    ) -> Result<Tournament> {
        let result = retry_on_conflict(&self.retry, "register_participant", || {
            let team_name = team_name.clone();
            self.modify(id, move |t, now| t.add_participant(user, team_name, now))
        })
        .await;

        match result {
            Ok((tournament, at)) => {
                TournamentMetrics::record_registration();
                tracing::info!(
                    tournament_id = %id,
                    user_id = %user,
                    participants = tournament.current_participants(),
                    max = tournament.max_participants(),
                    "Participant registered"
                );
                emit(
                    self.notifier.as_ref(),
                    LifecycleEvent::ParticipantRegistered {
                        tournament_id: id,
                        user_id: user,
                        at,
                    },
                )
                .await;
                Ok(tournament)
            }
            Err(err) => {
                TournamentMetrics::record_registration_rejected();
                tracing::info!(tournament_id = %id, user_id = %user, error = %err, "Registration rejected");
                Err(err)
            }
        }
    }

    /// Withdraws `user` while registration is open.
    ///
    /// # Errors
    ///
    /// `RegistrationClosed`, `NotFound`, or `ConcurrentModification` once the
    /// retry budget is spent.
    pub async fn withdraw_participant(&self, id: TournamentId, user: UserId) -> Result<Tournament> {
        let (tournament, at) = retry_on_conflict(&self.retry, "withdraw_participant", || {
            self.modify(id, move |t, now| t.remove_participant(user, now))
        })
        .await?;
        TournamentMetrics::record_withdrawal();
        tracing::info!(tournament_id = %id, user_id = %user, "Participant withdrawn");
        emit(
            self.notifier.as_ref(),
            LifecycleEvent::ParticipantWithdrawn {
                tournament_id: id,
                user_id: user,
                at,
            },
        )
        .await;
        Ok(tournament)
    }

    /// Edits name, description, capacity or rules of a draft.
    ///
    /// # Errors
    ///
    /// `TournamentNotEditable`, `InvalidArgument`, `ConcurrentModification`,
    /// `NotFound`.
    pub async fn update_basic_info(&self, id: TournamentId, update: BasicInfoUpdate) -> Result<Tournament> {
        let (tournament, _) = self
            .modify(id, move |t, now| t.update_basic_info(update, now))
            .await?;
        Ok(tournament)
    }

    /// Replaces the schedule of a draft.
    ///
    /// # Errors
    ///
    /// `TournamentNotEditable`, `ConcurrentModification`, `NotFound`.
    pub async fn update_dates(&self, id: TournamentId, schedule: Schedule) -> Result<Tournament> {
        let (tournament, _) = self
            .modify(id, move |t, now| t.update_dates(schedule, now))
            .await?;
        Ok(tournament)
    }

    /// Sets or clears streaming metadata of a draft.
    ///
    /// # Errors
    ///
    /// `TournamentNotEditable`, `ConcurrentModification`, `NotFound`.
    pub async fn configure_streaming(
        &self,
        id: TournamentId,
        streaming: Option<Streaming>,
    ) -> Result<Tournament> {
        let (tournament, _) = self
            .modify(id, move |t, now| t.configure_streaming(streaming, now))
            .await?;
        Ok(tournament)
    }

    /// Replaces the pricing of a draft.
    ///
    /// # Errors
    ///
    /// `TournamentNotEditable`, `ConcurrentModification`, `NotFound`.
    pub async fn update_pricing(&self, id: TournamentId, pricing: Pricing) -> Result<Tournament> {
        let (tournament, _) = self
            .modify(id, move |t, now| t.update_pricing(pricing, now))
            .await?;
        Ok(tournament)
    }

    /// Adjusts the commission rate of a draft or published tournament.
    ///
    /// # Errors
    ///
    /// `TournamentNotEditable`, `ConcurrentModification`, `NotFound`.
    pub async fn update_commission_rate(
        &self,
        id: TournamentId,
        rate: CommissionRate,
    ) -> Result<Tournament> {
        let (tournament, _) = self
            .modify(id, move |t, now| t.update_commission_rate(rate, now))
            .await?;
        tracing::info!(tournament_id = %id, %rate, "Commission rate updated");
        Ok(tournament)
    }
}
