//! Ticket orchestration.
//!
//! Issuance first holds a capacity slot on the tournament (see
//! [`TicketSlots`]), then runs the bounded code loop: draw a candidate the
//! oracle reports as free, insert, and on an insert-time
//! [`EngineError::CodeCollision`] draw again. Oracle rejections and insert
//! collisions share one attempt budget. If no ticket is inserted the slot is
//! given back.
//!
//! Every later transition is load → mutate → save at the loaded version. A
//! conflicting concurrent write is surfaced as
//! [`EngineError::ConcurrentModification`], so of two simultaneous payments
//! exactly one succeeds.

use crate::emit;
use crate::metrics::{EngineMetrics, TicketMetrics};
use crate::slots::TicketSlots;
use arena_core::code::{CodeGenerator, TicketCode};
use arena_core::environment::Clock;
use arena_core::event::{LifecycleEvent, LifecycleNotifier};
use arena_core::qr::QrPayload;
use arena_core::repository::{TicketRepository, TournamentRepository, Version};
use arena_core::tournament::Tournament;
use arena_core::ticket::{ExpiryPolicy, Ticket};
use arena_core::types::{TicketId, TournamentId, UserId};
use arena_core::{EngineError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Ticket lifecycle service.
pub struct TicketService<K, R> {
    tickets: K,
    slots: TicketSlots<R>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn LifecycleNotifier>,
    codes: CodeGenerator,
    expiry: ExpiryPolicy,
}

impl<K: TicketRepository, R: TournamentRepository> TicketService<K, R> {
    /// Creates a service.
    pub fn new(
        tickets: K,
        slots: TicketSlots<R>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn LifecycleNotifier>,
        codes: CodeGenerator,
        expiry: ExpiryPolicy,
    ) -> Self {
        Self {
            tickets,
            slots,
            clock,
            notifier,
            codes,
            expiry,
        }
    }

    /// The underlying ticket repository
    pub const fn tickets(&self) -> &K {
        &self.tickets
    }

    /// Issues a reserved ticket for `holder`.
    ///
    /// # Errors
    ///
    /// - `TicketNotIssuable` naming the failed precondition
    /// - `CodeGenerationExhausted` if no free code was found within budget
    /// - `ConcurrentModification` if the slot could not be held within the
    ///   retry budget
    /// - `NotFound` for an unknown tournament
    /// - `Storage` on backend failure
    pub async fn issue(&self, tournament_id: TournamentId, holder: UserId) -> Result<Ticket> {
        let now = self.clock.now();
        let tournament = match self.slots.hold(tournament_id, &self.expiry, now).await {
            Ok(tournament) => tournament,
            Err(EngineError::TicketNotIssuable { reason }) => {
                tracing::info!(%tournament_id, holder_id = %holder, %reason, "Ticket not issuable");
                return Err(EngineError::TicketNotIssuable { reason });
            }
            Err(err) => return Err(err),
        };

        let result = self.insert_with_fresh_code(&tournament, holder, now).await;
        if result.is_err() {
            self.slots.release(tournament_id).await;
        }
        let ticket = result?;

        TicketMetrics::record_issued(ticket.commission());
        tracing::info!(
            ticket_id = %ticket.id(),
            %tournament_id,
            holder_id = %holder,
            code = %ticket.code(),
            price = %ticket.price(),
            commission = %ticket.commission(),
            "Ticket issued"
        );
        emit(
            self.notifier.as_ref(),
            LifecycleEvent::TicketIssued {
                ticket_id: ticket.id(),
                tournament_id,
                holder_id: holder,
                code: ticket.code().clone(),
                at: now,
            },
        )
        .await;
        Ok(ticket)
    }

    /// The bounded code loop against `tournament` as it was before the hold.
    async fn insert_with_fresh_code(
        &self,
        tournament: &Tournament,
        holder: UserId,
        now: DateTime<Utc>,
    ) -> Result<Ticket> {
        let tournament_id = tournament.id();
        let budget = self.codes.max_attempts();
        let mut drawn = 0;
        while drawn < budget {
            let (code, spent) = match self.codes.generate_within(&self.tickets, budget - drawn).await
            {
                Ok(found) => found,
                Err(EngineError::CodeGenerationExhausted { .. }) => break,
                Err(err) => return Err(err),
            };
            drawn += spent;

            let ticket = Ticket::issue(tournament, holder, code, &self.expiry, now)?;
            match self.tickets.insert(ticket.clone()).await {
                Ok(_) => return Ok(ticket),
                Err(EngineError::CodeCollision { code }) => {
                    TicketMetrics::record_code_collision();
                    tracing::debug!(%code, attempt = drawn, "Ticket code taken at insert, regenerating");
                }
                Err(err) => return Err(err),
            }
        }

        tracing::warn!(%tournament_id, attempts = budget, "Ticket code generation exhausted");
        Err(EngineError::CodeGenerationExhausted { attempts: budget })
    }

    /// Loads a ticket.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub async fn get(&self, id: TicketId) -> Result<Ticket> {
        Ok(self.tickets.load(id).await?.value)
    }

    /// Loads a ticket by its public code.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown code.
    pub async fn find_by_code(&self, code: &TicketCode) -> Result<Ticket> {
        Ok(self.tickets.find_by_code(code).await?.value)
    }

    /// Whether the ticket admits its holder right now.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub async fn is_valid_for_use(&self, id: TicketId) -> Result<bool> {
        Ok(self.get(id).await?.is_valid_for_use(self.clock.now()))
    }

    async fn save(&self, ticket: &Ticket, expected: Version) -> Result<Version> {
        match self.tickets.save(ticket.clone(), expected).await {
            Err(err @ EngineError::ConcurrentModification { .. }) => {
                EngineMetrics::record_conflict("ticket");
                tracing::warn!(ticket_id = %ticket.id(), error = %err, "Ticket write conflict");
                Err(err)
            }
            other => other,
        }
    }

    async fn modify<F>(&self, id: TicketId, mutate: F) -> Result<(Ticket, DateTime<Utc>)>
    where
        F: FnOnce(&mut Ticket, DateTime<Utc>) -> Result<()> + Send,
    {
        let loaded = self.tickets.load(id).await?;
        let mut ticket = loaded.value;
        let now = self.clock.now();
        mutate(&mut ticket, now)?;
        self.save(&ticket, loaded.version).await?;
        Ok((ticket, now))
    }

    /// Records payment of a reserved ticket.
    ///
    /// # Errors
    ///
    /// `InvalidArgument`, `InvalidStateTransition`, `TicketExpired`,
    /// `ConcurrentModification`, `NotFound`.
    pub async fn pay(&self, id: TicketId, payment_reference: &str) -> Result<Ticket> {
        let (ticket, at) = self
            .modify(id, |t, now| t.mark_as_paid(payment_reference, now))
            .await?;
        TicketMetrics::record_transition("paid");
        tracing::info!(ticket_id = %id, "Ticket paid");
        emit(
            self.notifier.as_ref(),
            LifecycleEvent::TicketPaid {
                ticket_id: id,
                tournament_id: ticket.tournament(),
                payment_reference: ticket.payment_reference().unwrap_or_default().to_string(),
                at,
            },
        )
        .await;
        Ok(ticket)
    }

    async fn committed_use(&self, ticket: Ticket, at: DateTime<Utc>) -> Ticket {
        TicketMetrics::record_transition("used");
        tracing::info!(ticket_id = %ticket.id(), "Ticket used");
        emit(
            self.notifier.as_ref(),
            LifecycleEvent::TicketUsed {
                ticket_id: ticket.id(),
                tournament_id: ticket.tournament(),
                at,
            },
        )
        .await;
        ticket
    }

    /// Redeems a paid ticket.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition`, `TicketExpired`, `ConcurrentModification`,
    /// `NotFound`.
    pub async fn use_ticket(&self, id: TicketId) -> Result<Ticket> {
        let (ticket, at) = self.modify(id, |t, now| t.mark_as_used(now)).await?;
        Ok(self.committed_use(ticket, at).await)
    }

    /// Redeems the ticket a scanned QR payload was produced for.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the payload is malformed or does not match the
    ///   stored ticket
    /// - `InvalidStateTransition`, `TicketExpired`, `ConcurrentModification`
    /// - `NotFound` for an unknown code
    pub async fn redeem_qr(&self, encoded: &str) -> Result<Ticket> {
        let payload = QrPayload::decode(encoded)?;
        let loaded = self.tickets.find_by_code(&payload.code).await?;
        let mut ticket = loaded.value;
        if !ticket.matches_qr(&payload) {
            tracing::warn!(code = %payload.code, "QR payload does not match stored ticket");
            return Err(EngineError::invalid(
                "qr_payload",
                "payload does not match the ticket",
            ));
        }
        let now = self.clock.now();
        ticket.mark_as_used(now)?;
        self.save(&ticket, loaded.version).await?;
        Ok(self.committed_use(ticket, now).await)
    }

    /// Cancels a reserved or paid ticket and gives its slot back.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition`, `ConcurrentModification`, `NotFound`.
    pub async fn cancel(&self, id: TicketId) -> Result<Ticket> {
        let (ticket, at) = self.modify(id, |t, now| t.cancel(now)).await?;
        TicketMetrics::record_transition("cancelled");
        tracing::info!(ticket_id = %id, "Ticket cancelled");
        self.slots.release(ticket.tournament()).await;
        emit(
            self.notifier.as_ref(),
            LifecycleEvent::TicketCancelled {
                ticket_id: id,
                tournament_id: ticket.tournament(),
                at,
            },
        )
        .await;
        Ok(ticket)
    }
}
