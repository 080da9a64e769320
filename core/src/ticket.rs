//! Ticket aggregate.
//!
//! A ticket is a paid-entry right to one tournament, issued in
//! [`TicketStatus::Reserved`] with a snapshot of the tournament's price and
//! commission. It then moves forward only:
//!
//! ```text
//! Reserved ──► Paid ──► Used
//!    │          │
//!    ├──────────┴──► Expired
//!    └──────────┴──► Cancelled
//! ```
//!
//! The expiration date is fixed at issuance and never recomputed, even if the
//! tournament is later rescheduled.

use crate::code::TicketCode;
use crate::error::{EngineError, IssuanceBlocker, Result};
use crate::money::{self, CommissionRate, Money};
use crate::tournament::{Tournament, TournamentFormat};
use crate::types::{TicketId, TournamentId, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default gap between ticket expiry and tournament start.
pub const DEFAULT_EXPIRY_LEAD_MINUTES: i64 = 60;

/// Longest accepted gap between ticket expiry and tournament start.
pub const MAX_EXPIRY_LEAD_DAYS: i64 = 365;

const ENTITY: &str = "ticket";

/// Ticket lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    /// Issued, awaiting payment
    Reserved,
    /// Payment recorded
    Paid,
    /// Redeemed at the venue (terminal)
    Used,
    /// Past its expiration date (terminal)
    Expired,
    /// Cancelled (terminal)
    Cancelled,
}

impl TicketStatus {
    /// Every status, for exhaustive checks.
    pub const ALL: [Self; 5] = [
        Self::Reserved,
        Self::Paid,
        Self::Used,
        Self::Expired,
        Self::Cancelled,
    ];

    /// The transition table.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Reserved, Self::Paid)
                | (Self::Paid, Self::Used)
                | (Self::Reserved | Self::Paid, Self::Expired | Self::Cancelled)
        )
    }

    /// Whether no further transition is possible
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Used | Self::Expired | Self::Cancelled)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reserved => "RESERVED",
            Self::Paid => "PAID",
            Self::Used => "USED",
            Self::Expired => "EXPIRED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// How far ahead of the tournament start a ticket stops being valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpiryPolicy {
    lead: Duration,
}

impl ExpiryPolicy {
    /// Creates a policy with the given lead.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] for a negative lead or one
    /// longer than [`MAX_EXPIRY_LEAD_DAYS`].
    pub fn new(lead: Duration) -> Result<Self> {
        if lead < Duration::zero() {
            return Err(EngineError::invalid("expiry_lead", "must not be negative"));
        }
        if lead > Duration::days(MAX_EXPIRY_LEAD_DAYS) {
            return Err(EngineError::invalid(
                "expiry_lead",
                format!("must not exceed {MAX_EXPIRY_LEAD_DAYS} days"),
            ));
        }
        Ok(Self { lead })
    }

    /// Gap before the tournament start
    #[must_use]
    pub const fn lead(&self) -> Duration {
        self.lead
    }

    /// Expiration date for a tournament starting at `start_date`.
    ///
    /// Saturates at the earliest representable instant, which leaves such a
    /// ticket already expired.
    #[must_use]
    pub fn expiration_for(&self, start_date: DateTime<Utc>) -> DateTime<Utc> {
        start_date
            .checked_sub_signed(self.lead)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            lead: Duration::minutes(DEFAULT_EXPIRY_LEAD_MINUTES),
        }
    }
}

/// Result of [`Ticket::mark_as_expired`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpiryOutcome {
    /// The ticket moved to [`TicketStatus::Expired`]
    Expired,
    /// The expiration date has not been reached
    NotDue,
    /// The ticket was already used, expired or cancelled
    AlreadyTerminal,
}

/// First issuance precondition `tournament` fails at `now`, if any.
///
/// Checked in order: paid format, positive fee, open registration, free
/// capacity, future expiry.
#[must_use]
pub fn issuance_blocker(
    tournament: &Tournament,
    policy: &ExpiryPolicy,
    now: DateTime<Utc>,
) -> Option<IssuanceBlocker> {
    let pricing = tournament.pricing();
    if pricing.format() == TournamentFormat::Free {
        Some(IssuanceBlocker::FreeTournament)
    } else if !pricing.entry_fee().is_positive() {
        Some(IssuanceBlocker::NoEntryFee)
    } else if tournament.registration_closed_reason(now).is_some() {
        Some(IssuanceBlocker::RegistrationClosed)
    } else if tournament.is_full() {
        Some(IssuanceBlocker::NoCapacity)
    } else if policy.expiration_for(tournament.schedule().start_date()) <= now {
        Some(IssuanceBlocker::ExpiryElapsed)
    } else {
        None
    }
}

/// Checks every issuance precondition and holds a capacity slot for the
/// ticket in the same step.
///
/// Persisting `tournament` at the version it was loaded with makes the check
/// and the hold atomic.
///
/// # Errors
///
/// [`EngineError::TicketNotIssuable`] naming the first failed precondition.
pub fn reserve_issuance_slot(
    tournament: &mut Tournament,
    policy: &ExpiryPolicy,
    now: DateTime<Utc>,
) -> Result<()> {
    if let Some(reason) = issuance_blocker(tournament, policy, now) {
        return Err(EngineError::TicketNotIssuable { reason });
    }
    tournament
        .hold_ticket_slot(now)
        .map_err(|_| EngineError::TicketNotIssuable {
            reason: IssuanceBlocker::NoCapacity,
        })
}

/// Ticket aggregate root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    id: TicketId,
    tournament: TournamentId,
    holder: UserId,
    code: TicketCode,
    price: Money,
    commission_rate: CommissionRate,
    commission: Money,
    status: TicketStatus,
    issued_at: DateTime<Utc>,
    expiration_date: DateTime<Utc>,
    purchase_date: Option<DateTime<Utc>>,
    payment_reference: Option<String>,
    usage_date: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Issues a ticket for `holder` against `tournament`.
    ///
    /// Price, commission rate and commission are copied from the tournament
    /// now; later tournament edits do not reach this ticket.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::TicketNotIssuable`] naming the first failed
    /// precondition (see [`issuance_blocker`]).
    pub fn issue(
        tournament: &Tournament,
        holder: UserId,
        code: TicketCode,
        policy: &ExpiryPolicy,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if let Some(reason) = issuance_blocker(tournament, policy, now) {
            return Err(EngineError::TicketNotIssuable { reason });
        }
        let pricing = tournament.pricing();
        let price = pricing.entry_fee();
        let rate = pricing.commission_rate();
        Ok(Self {
            id: TicketId::new(),
            tournament: tournament.id(),
            holder,
            code,
            price,
            commission_rate: rate,
            commission: money::commission(price, rate),
            status: TicketStatus::Reserved,
            issued_at: now,
            expiration_date: policy.expiration_for(tournament.schedule().start_date()),
            purchase_date: None,
            payment_reference: None,
            usage_date: None,
            cancelled_at: None,
        })
    }

    /// Ticket id
    #[must_use]
    pub const fn id(&self) -> TicketId {
        self.id
    }

    /// Tournament the ticket was issued against
    #[must_use]
    pub const fn tournament(&self) -> TournamentId {
        self.tournament
    }

    /// Ticket holder
    #[must_use]
    pub const fn holder(&self) -> UserId {
        self.holder
    }

    /// Public ticket code
    #[must_use]
    pub const fn code(&self) -> &TicketCode {
        &self.code
    }

    /// Price snapshot
    #[must_use]
    pub const fn price(&self) -> Money {
        self.price
    }

    /// Commission rate snapshot
    #[must_use]
    pub const fn commission_rate(&self) -> CommissionRate {
        self.commission_rate
    }

    /// Commission snapshot
    #[must_use]
    pub const fn commission(&self) -> Money {
        self.commission
    }

    /// Lifecycle status
    #[must_use]
    pub const fn status(&self) -> TicketStatus {
        self.status
    }

    /// Issuance time
    #[must_use]
    pub const fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Fixed expiration date
    #[must_use]
    pub const fn expiration_date(&self) -> DateTime<Utc> {
        self.expiration_date
    }

    /// Payment time
    #[must_use]
    pub const fn purchase_date(&self) -> Option<DateTime<Utc>> {
        self.purchase_date
    }

    /// Opaque payment reference
    #[must_use]
    pub fn payment_reference(&self) -> Option<&str> {
        self.payment_reference.as_deref()
    }

    /// Redemption time
    #[must_use]
    pub const fn usage_date(&self) -> Option<DateTime<Utc>> {
        self.usage_date
    }

    /// Cancellation time
    #[must_use]
    pub const fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    /// `price − commission`
    #[must_use]
    pub fn net_amount(&self) -> Money {
        money::net(self.price, self.commission)
    }

    /// Paid and never used.
    #[must_use]
    pub const fn can_be_refunded(&self) -> bool {
        matches!(self.status, TicketStatus::Paid) && self.usage_date.is_none()
    }

    /// Paid and strictly before the expiration date.
    #[must_use]
    pub fn is_valid_for_use(&self, now: DateTime<Utc>) -> bool {
        self.status == TicketStatus::Paid && now < self.expiration_date
    }

    fn transition(&mut self, next: TicketStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::InvalidStateTransition {
                entity: ENTITY,
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    fn ensure_not_expired(&self, now: DateTime<Utc>) -> Result<()> {
        if now >= self.expiration_date {
            return Err(EngineError::TicketExpired {
                expired_at: self.expiration_date,
            });
        }
        Ok(())
    }

    /// `Reserved → Paid`, recording the payment reference.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidStateTransition`] unless reserved
    /// - [`EngineError::InvalidArgument`] for a blank reference
    /// - [`EngineError::TicketExpired`] at or after the expiration date
    pub fn mark_as_paid(&mut self, reference: &str, now: DateTime<Utc>) -> Result<()> {
        if self.status != TicketStatus::Reserved {
            return self.transition(TicketStatus::Paid);
        }
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(EngineError::invalid("payment_reference", "must not be blank"));
        }
        self.ensure_not_expired(now)?;
        self.transition(TicketStatus::Paid)?;
        self.purchase_date = Some(now);
        self.payment_reference = Some(reference.to_string());
        Ok(())
    }

    /// `Paid → Used`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidStateTransition`] unless paid
    /// - [`EngineError::TicketExpired`] at or after the expiration date
    pub fn mark_as_used(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != TicketStatus::Paid {
            return self.transition(TicketStatus::Used);
        }
        self.ensure_not_expired(now)?;
        self.transition(TicketStatus::Used)?;
        self.usage_date = Some(now);
        Ok(())
    }

    /// Cancels a reserved or paid ticket.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidStateTransition`] from a terminal state.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(TicketStatus::Cancelled)?;
        self.cancelled_at = Some(now);
        Ok(())
    }

    /// Expires the ticket once `now` has reached its expiration date.
    ///
    /// Never fails, so repeated sweeps are harmless.
    pub fn mark_as_expired(&mut self, now: DateTime<Utc>) -> ExpiryOutcome {
        if self.status.is_terminal() {
            return ExpiryOutcome::AlreadyTerminal;
        }
        if now < self.expiration_date {
            return ExpiryOutcome::NotDue;
        }
        match self.transition(TicketStatus::Expired) {
            Ok(()) => ExpiryOutcome::Expired,
            Err(_) => ExpiryOutcome::AlreadyTerminal,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tournament::{NewTournament, Pricing, Schedule};
    use crate::types::{CategoryId, GameId};

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn start() -> DateTime<Utc> {
        t0() + Duration::days(2)
    }

    fn tournament(format: TournamentFormat) -> Tournament {
        let pricing = match format {
            TournamentFormat::Free => Pricing::free(Money::zero()),
            TournamentFormat::Paid => Pricing::new(
                TournamentFormat::Paid,
                "50.00".parse().unwrap(),
                Money::zero(),
                "0.05".parse().unwrap(),
            )
            .unwrap(),
        };
        let mut tournament = Tournament::create(
            NewTournament {
                name: "Night League".to_string(),
                description: String::new(),
                category: CategoryId::new(),
                game: GameId::new(),
                organizer: UserId::new(),
                max_participants: 8,
                pricing,
                schedule: Schedule::new(
                    start(),
                    start() + Duration::hours(6),
                    t0() - Duration::days(1),
                    start(),
                )
                .unwrap(),
                rules: None,
            },
            t0(),
        )
        .unwrap();
        tournament.publish(t0()).unwrap();
        tournament
    }

    fn code() -> TicketCode {
        "TKT-7QH4M2XR".parse().unwrap()
    }

    fn reserved() -> Ticket {
        Ticket::issue(
            &tournament(TournamentFormat::Paid),
            UserId::new(),
            code(),
            &ExpiryPolicy::default(),
            t0(),
        )
        .unwrap()
    }

    #[test]
    fn transition_table_matches_lifecycle() {
        use TicketStatus::{Cancelled, Expired, Paid, Reserved, Used};
        let legal = [
            (Reserved, Paid),
            (Paid, Used),
            (Reserved, Expired),
            (Paid, Expired),
            (Reserved, Cancelled),
            (Paid, Cancelled),
        ];
        for from in TicketStatus::ALL {
            for to in TicketStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn issue_snapshots_price_commission_and_expiry() {
        let ticket = reserved();
        assert_eq!(ticket.status(), TicketStatus::Reserved);
        assert_eq!(ticket.price().to_string(), "50.00");
        assert_eq!(ticket.commission().to_string(), "2.50");
        assert_eq!(ticket.net_amount().to_string(), "47.50");
        assert_eq!(ticket.expiration_date(), start() - Duration::hours(1));
        assert_eq!(ticket.issued_at(), t0());
    }

    #[test]
    fn free_tournament_is_not_issuable() {
        let result = Ticket::issue(
            &tournament(TournamentFormat::Free),
            UserId::new(),
            code(),
            &ExpiryPolicy::default(),
            t0(),
        );
        assert_eq!(
            result,
            Err(EngineError::TicketNotIssuable {
                reason: IssuanceBlocker::FreeTournament
            })
        );
    }

    #[test]
    fn closed_registration_and_elapsed_expiry_block_issuance() {
        let paid = tournament(TournamentFormat::Paid);
        let policy = ExpiryPolicy::default();
        assert_eq!(
            issuance_blocker(&paid, &policy, start() + Duration::minutes(1)),
            Some(IssuanceBlocker::RegistrationClosed)
        );
        assert_eq!(
            issuance_blocker(&paid, &policy, start() - Duration::minutes(30)),
            Some(IssuanceBlocker::ExpiryElapsed)
        );
        assert_eq!(issuance_blocker(&paid, &policy, t0()), None);
    }

    #[test]
    fn full_tournament_is_not_issuable() {
        let mut paid = tournament(TournamentFormat::Paid);
        for _ in 0..paid.max_participants() {
            paid.add_participant(UserId::new(), None, t0()).unwrap();
        }
        assert_eq!(
            Ticket::issue(&paid, UserId::new(), code(), &ExpiryPolicy::default(), t0()),
            Err(EngineError::TicketNotIssuable {
                reason: IssuanceBlocker::NoCapacity
            })
        );
    }

    #[test]
    fn zero_fee_paid_tournament_is_not_issuable() {
        let mut value = serde_json::to_value(tournament(TournamentFormat::Paid)).unwrap();
        value["pricing"]["entry_fee"] = serde_json::json!("0.00");
        let zero_fee: Tournament = serde_json::from_value(value).unwrap();
        assert!(zero_fee.pricing().entry_fee().is_zero());
        assert_eq!(
            issuance_blocker(&zero_fee, &ExpiryPolicy::default(), t0()),
            Some(IssuanceBlocker::NoEntryFee)
        );
    }

    #[test]
    fn reserving_a_slot_consumes_capacity_until_full() {
        let mut paid = tournament(TournamentFormat::Paid);
        let policy = ExpiryPolicy::default();
        for _ in 0..paid.max_participants() {
            reserve_issuance_slot(&mut paid, &policy, t0()).unwrap();
        }
        assert_eq!(paid.held_ticket_slots(), paid.max_participants());
        assert_eq!(
            reserve_issuance_slot(&mut paid, &policy, t0()),
            Err(EngineError::TicketNotIssuable {
                reason: IssuanceBlocker::NoCapacity
            })
        );

        let mut closed = tournament(TournamentFormat::Paid);
        assert_eq!(
            reserve_issuance_slot(&mut closed, &policy, start() + Duration::minutes(1)),
            Err(EngineError::TicketNotIssuable {
                reason: IssuanceBlocker::RegistrationClosed
            })
        );
        assert_eq!(closed.held_ticket_slots(), 0);
    }

    #[test]
    fn pay_then_use_before_expiry() {
        let mut ticket = reserved();
        assert!(!ticket.can_be_refunded());
        ticket.mark_as_paid("PAY-123", t0()).unwrap();
        assert_eq!(ticket.purchase_date(), Some(t0()));
        assert_eq!(ticket.payment_reference(), Some("PAY-123"));
        assert!(ticket.can_be_refunded());

        let at = t0() + Duration::hours(3);
        ticket.mark_as_used(at).unwrap();
        assert_eq!(ticket.status(), TicketStatus::Used);
        assert_eq!(ticket.usage_date(), Some(at));
        assert!(!ticket.can_be_refunded());
        assert!(matches!(
            ticket.mark_as_used(at),
            Err(EngineError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn payment_requires_reference_and_unexpired_ticket() {
        let mut ticket = reserved();
        assert!(matches!(
            ticket.mark_as_paid("  ", t0()),
            Err(EngineError::InvalidArgument { .. })
        ));
        let expiry = ticket.expiration_date();
        assert_eq!(
            ticket.mark_as_paid("PAY-1", expiry),
            Err(EngineError::TicketExpired { expired_at: expiry })
        );
        assert_eq!(ticket.status(), TicketStatus::Reserved);
    }

    #[test]
    fn payment_on_a_used_ticket_reports_the_state() {
        let mut ticket = reserved();
        ticket.mark_as_paid("PAY-1", t0()).unwrap();
        ticket.mark_as_used(t0()).unwrap();
        assert_eq!(
            ticket.mark_as_paid("  ", t0()),
            Err(EngineError::InvalidStateTransition {
                entity: "ticket",
                from: "USED".to_string(),
                to: "PAID".to_string(),
            })
        );
    }

    #[test]
    fn validity_boundary_is_exclusive() {
        let mut ticket = reserved();
        ticket.mark_as_paid("PAY-1", t0()).unwrap();
        let expiry = ticket.expiration_date();
        assert!(ticket.is_valid_for_use(expiry - Duration::seconds(1)));
        assert!(!ticket.is_valid_for_use(expiry));
        assert!(!ticket.is_valid_for_use(expiry + Duration::seconds(1)));
    }

    #[test]
    fn expiry_is_idempotent() {
        let mut ticket = reserved();
        let expiry = ticket.expiration_date();
        assert_eq!(ticket.mark_as_expired(t0()), ExpiryOutcome::NotDue);
        assert_eq!(ticket.mark_as_expired(expiry), ExpiryOutcome::Expired);
        assert_eq!(ticket.mark_as_expired(expiry), ExpiryOutcome::AlreadyTerminal);
        assert_eq!(ticket.status(), TicketStatus::Expired);
    }

    #[test]
    fn cancel_only_from_live_states() {
        let mut ticket = reserved();
        ticket.cancel(t0()).unwrap();
        assert_eq!(ticket.cancelled_at(), Some(t0()));
        assert!(matches!(
            ticket.cancel(t0()),
            Err(EngineError::InvalidStateTransition { .. })
        ));
        assert_eq!(
            ticket.mark_as_expired(ticket.expiration_date()),
            ExpiryOutcome::AlreadyTerminal
        );
    }

    #[test]
    fn paid_ticket_expires_through_the_transition_table() {
        let mut ticket = reserved();
        ticket.mark_as_paid("PAY-1", t0()).unwrap();
        let expiry = ticket.expiration_date();
        assert_eq!(ticket.mark_as_expired(expiry), ExpiryOutcome::Expired);
        assert_eq!(ticket.status(), TicketStatus::Expired);
        assert!(!ticket.status().can_transition_to(TicketStatus::Expired));
        assert_eq!(ticket.purchase_date(), Some(t0()));
    }

    #[test]
    fn oversized_lead_is_rejected() {
        assert!(ExpiryPolicy::new(Duration::days(MAX_EXPIRY_LEAD_DAYS)).is_ok());
        assert!(matches!(
            ExpiryPolicy::new(Duration::days(MAX_EXPIRY_LEAD_DAYS) + Duration::minutes(1)),
            Err(EngineError::InvalidArgument { field: "expiry_lead", .. })
        ));
    }

    #[test]
    fn expiration_saturates_at_the_earliest_instant() {
        let policy = ExpiryPolicy::new(Duration::days(MAX_EXPIRY_LEAD_DAYS)).unwrap();
        assert_eq!(
            policy.expiration_for(DateTime::<Utc>::MIN_UTC),
            DateTime::<Utc>::MIN_UTC
        );
    }

    #[test]
    fn negative_lead_is_rejected() {
        assert!(ExpiryPolicy::new(Duration::minutes(-1)).is_err());
        assert_eq!(
            ExpiryPolicy::new(Duration::zero()).unwrap().expiration_for(start()),
            start()
        );
    }
}
