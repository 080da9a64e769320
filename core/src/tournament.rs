//! Tournament aggregate.
//!
//! A tournament is created in [`TournamentStatus::Draft`] by an organizer,
//! edited freely until published, and then moves forward only:
//!
//! ```text
//! Draft ──► Published ──► InProgress ──► Finished
//!   │           │              │
//!   └───────────┴──────────────┴──────► Cancelled
//! ```
//!
//! The legality of every move is decided by
//! [`TournamentStatus::can_transition_to`]; no other code path changes the
//! status. Soft deletion is a separate marker, orthogonal to status.
//!
//! Capacity is shared by registered participants and slots held by live
//! tickets. [`Tournament::add_participant`] and [`Tournament::hold_ticket_slot`]
//! each perform the check and the increment in one call. Serializing those
//! calls across concurrent requests is the job of the persistence layer
//! (compare-and-set on the aggregate version).

use crate::error::{EngineError, Result};
use crate::money::{self, CommissionRate, Money};
use crate::types::{CategoryId, GameId, TournamentId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A tournament needs at least this many participants to start.
pub const MIN_PARTICIPANTS_TO_START: u32 = 2;

const ENTITY: &str = "tournament";

// ============================================================================
// Status & Format
// ============================================================================

/// Entry format of a tournament.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TournamentFormat {
    /// No entry fee
    Free,
    /// Paid entry, sold through tickets
    Paid,
}

/// Tournament lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TournamentStatus {
    /// Being configured by the organizer
    Draft,
    /// Visible; registration may open
    Published,
    /// Running
    InProgress,
    /// Completed (terminal)
    Finished,
    /// Cancelled (terminal)
    Cancelled,
}

impl TournamentStatus {
    /// Every status, for exhaustive checks.
    pub const ALL: [Self; 5] = [
        Self::Draft,
        Self::Published,
        Self::InProgress,
        Self::Finished,
        Self::Cancelled,
    ];

    /// The transition table.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Published)
                | (Self::Published, Self::InProgress)
                | (Self::InProgress, Self::Finished)
                | (Self::Draft | Self::Published | Self::InProgress, Self::Cancelled)
        )
    }

    /// Whether no further transition is possible
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

impl fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Draft => "DRAFT",
            Self::Published => "PUBLISHED",
            Self::InProgress => "IN_PROGRESS",
            Self::Finished => "FINISHED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Value Objects
// ============================================================================

/// Tournament dates.
///
/// Invariants: `end_date > start_date`, `registration_end >
/// registration_start`, `registration_end <= start_date`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    registration_start: DateTime<Utc>,
    registration_end: DateTime<Utc>,
}

impl Schedule {
    /// Creates a validated schedule.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] if the dates are out of order.
    pub fn new(
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        registration_start: DateTime<Utc>,
        registration_end: DateTime<Utc>,
    ) -> Result<Self> {
        if end_date <= start_date {
            return Err(EngineError::invalid("end_date", "must be after start_date"));
        }
        if registration_end <= registration_start {
            return Err(EngineError::invalid(
                "registration_end",
                "must be after registration_start",
            ));
        }
        if registration_end > start_date {
            return Err(EngineError::invalid(
                "registration_end",
                "must not be after start_date",
            ));
        }
        Ok(Self {
            start_date,
            end_date,
            registration_start,
            registration_end,
        })
    }

    /// When play begins
    #[must_use]
    pub const fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }

    /// When play ends
    #[must_use]
    pub const fn end_date(&self) -> DateTime<Utc> {
        self.end_date
    }

    /// When registration opens
    #[must_use]
    pub const fn registration_start(&self) -> DateTime<Utc> {
        self.registration_start
    }

    /// When registration closes
    #[must_use]
    pub const fn registration_end(&self) -> DateTime<Utc> {
        self.registration_end
    }

    /// Whether `now` lies inside the inclusive registration window.
    #[must_use]
    pub fn registration_window_contains(&self, now: DateTime<Utc>) -> bool {
        self.registration_start <= now && now <= self.registration_end
    }
}

/// Entry fee, prize pool and commission configuration.
///
/// Invariant: the entry fee is zero for [`TournamentFormat::Free`] and
/// positive for [`TournamentFormat::Paid`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    format: TournamentFormat,
    entry_fee: Money,
    prize_pool: Money,
    commission_rate: CommissionRate,
}

impl Pricing {
    /// Creates validated pricing.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] if the fee does not match the
    /// format.
    pub fn new(
        format: TournamentFormat,
        entry_fee: Money,
        prize_pool: Money,
        commission_rate: CommissionRate,
    ) -> Result<Self> {
        match format {
            TournamentFormat::Free if !entry_fee.is_zero() => Err(EngineError::invalid(
                "entry_fee",
                "must be 0 for a FREE tournament",
            )),
            TournamentFormat::Paid if !entry_fee.is_positive() => Err(EngineError::invalid(
                "entry_fee",
                "must be positive for a PAID tournament",
            )),
            _ => Ok(Self {
                format,
                entry_fee,
                prize_pool,
                commission_rate,
            }),
        }
    }

    /// Free entry with the given prize pool.
    #[must_use]
    pub fn free(prize_pool: Money) -> Self {
        Self {
            format: TournamentFormat::Free,
            entry_fee: Money::zero(),
            prize_pool,
            commission_rate: CommissionRate::ZERO,
        }
    }

    /// Entry format
    #[must_use]
    pub const fn format(&self) -> TournamentFormat {
        self.format
    }

    /// Entry fee
    #[must_use]
    pub const fn entry_fee(&self) -> Money {
        self.entry_fee
    }

    /// Prize pool
    #[must_use]
    pub const fn prize_pool(&self) -> Money {
        self.prize_pool
    }

    /// Platform commission rate
    #[must_use]
    pub const fn commission_rate(&self) -> CommissionRate {
        self.commission_rate
    }
}

/// Streaming metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streaming {
    /// Stream URL (http or https)
    pub url: String,
    /// Platform name, e.g. "Twitch"
    pub platform: String,
}

impl Streaming {
    /// Creates validated streaming metadata.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] for a non-http URL or a blank
    /// platform.
    pub fn new(url: impl Into<String>, platform: impl Into<String>) -> Result<Self> {
        let url = url.into().trim().to_string();
        let platform = platform.into().trim().to_string();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(EngineError::invalid("streaming_url", "must be an http(s) URL"));
        }
        if platform.is_empty() {
            return Err(EngineError::invalid("streaming_platform", "must not be blank"));
        }
        Ok(Self { url, platform })
    }
}

/// One registered participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Registered user
    pub user: UserId,
    /// Optional team name
    pub team_name: Option<String>,
    /// When the registration was accepted
    pub registered_at: DateTime<Utc>,
}

/// Input for [`Tournament::create`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTournament {
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Category reference
    pub category: CategoryId,
    /// Game reference
    pub game: GameId,
    /// Organizer identity
    pub organizer: UserId,
    /// Capacity (at least 1)
    pub max_participants: u32,
    /// Pricing configuration
    pub pricing: Pricing,
    /// Dates
    pub schedule: Schedule,
    /// Optional rules text
    pub rules: Option<String>,
}

/// Partial update of the basic tournament information.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicInfoUpdate {
    /// New name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New capacity
    pub max_participants: Option<u32>,
    /// New rules text
    pub rules: Option<String>,
}

// ============================================================================
// Aggregate
// ============================================================================

/// Tournament aggregate root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    id: TournamentId,
    name: String,
    description: String,
    category: CategoryId,
    game: GameId,
    organizer: UserId,
    max_participants: u32,
    pricing: Pricing,
    schedule: Schedule,
    streaming: Option<Streaming>,
    rules: Option<String>,
    status: TournamentStatus,
    participants: Vec<Participant>,
    #[serde(default)]
    held_ticket_slots: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::invalid("name", "must not be blank"));
    }
    Ok(name.to_string())
}

fn validate_capacity(max_participants: u32) -> Result<u32> {
    if max_participants == 0 {
        return Err(EngineError::invalid("max_participants", "must be at least 1"));
    }
    Ok(max_participants)
}

impl Tournament {
    /// Creates a tournament in [`TournamentStatus::Draft`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] for a blank name or zero
    /// capacity. Dates and pricing are validated by their own constructors.
    pub fn create(input: NewTournament, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            id: TournamentId::new(),
            name: validate_name(&input.name)?,
            description: input.description,
            category: input.category,
            game: input.game,
            organizer: input.organizer,
            max_participants: validate_capacity(input.max_participants)?,
            pricing: input.pricing,
            schedule: input.schedule,
            streaming: None,
            rules: input.rules,
            status: TournamentStatus::Draft,
            participants: Vec::new(),
            held_ticket_slots: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Tournament id
    #[must_use]
    pub const fn id(&self) -> TournamentId {
        self.id
    }

    /// Display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Category reference
    #[must_use]
    pub const fn category(&self) -> CategoryId {
        self.category
    }

    /// Game reference
    #[must_use]
    pub const fn game(&self) -> GameId {
        self.game
    }

    /// Organizer identity
    #[must_use]
    pub const fn organizer(&self) -> UserId {
        self.organizer
    }

    /// Capacity
    #[must_use]
    pub const fn max_participants(&self) -> u32 {
        self.max_participants
    }

    /// Pricing configuration
    #[must_use]
    pub const fn pricing(&self) -> &Pricing {
        &self.pricing
    }

    /// Dates
    #[must_use]
    pub const fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Streaming metadata, if configured
    #[must_use]
    pub const fn streaming(&self) -> Option<&Streaming> {
        self.streaming.as_ref()
    }

    /// Rules text
    #[must_use]
    pub fn rules(&self) -> Option<&str> {
        self.rules.as_deref()
    }

    /// Lifecycle status
    #[must_use]
    pub const fn status(&self) -> TournamentStatus {
        self.status
    }

    /// Participant roster
    #[must_use]
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Creation time
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last modification time
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Soft-deletion time
    #[must_use]
    pub const fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    /// Whether the tournament has been logically removed
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Number of registered participants
    #[must_use]
    pub fn current_participants(&self) -> u32 {
        u32::try_from(self.participants.len()).unwrap_or(u32::MAX)
    }

    /// Slots held by reserved or paid tickets
    #[must_use]
    pub const fn held_ticket_slots(&self) -> u32 {
        self.held_ticket_slots
    }

    /// Free slots left after participants and held ticket slots
    #[must_use]
    pub fn available_slots(&self) -> u32 {
        self.max_participants
            .saturating_sub(self.current_participants())
            .saturating_sub(self.held_ticket_slots)
    }

    /// Whether capacity is exhausted
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.available_slots() == 0
    }

    /// Whether `user` holds a participant record
    #[must_use]
    pub fn is_registered(&self, user: UserId) -> bool {
        self.participants.iter().any(|p| p.user == user)
    }

    // ------------------------------------------------------------------------
    // State machine
    // ------------------------------------------------------------------------

    fn transition(&mut self, next: TournamentStatus, now: DateTime<Utc>) -> Result<()> {
        if self.is_deleted() || !self.status.can_transition_to(next) {
            return Err(EngineError::InvalidStateTransition {
                entity: ENTITY,
                from: if self.is_deleted() {
                    "DELETED".to_string()
                } else {
                    self.status.to_string()
                },
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// `Draft → Published`.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidStateTransition`] from any other state.
    pub fn publish(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(TournamentStatus::Published, now)
    }

    /// `Published → InProgress`, requiring [`MIN_PARTICIPANTS_TO_START`].
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidStateTransition`] if not published
    /// - [`EngineError::InsufficientParticipants`] below the threshold
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status == TournamentStatus::Published
            && !self.is_deleted()
            && self.current_participants() < MIN_PARTICIPANTS_TO_START
        {
            return Err(EngineError::InsufficientParticipants {
                required: MIN_PARTICIPANTS_TO_START,
                actual: self.current_participants(),
            });
        }
        self.transition(TournamentStatus::InProgress, now)
    }

    /// `InProgress → Finished`.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidStateTransition`] from any other state.
    pub fn finish(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(TournamentStatus::Finished, now)
    }

    /// Cancels a draft, published or running tournament.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidStateTransition`] from a terminal state.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(TournamentStatus::Cancelled, now)
    }

    /// Marks the tournament as logically removed.
    ///
    /// Repeating the call on a deleted tournament is a no-op.
    ///
    /// # Errors
    ///
    /// [`EngineError::DeletionNotAllowed`] while the tournament is running.
    pub fn delete(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status == TournamentStatus::InProgress {
            return Err(EngineError::DeletionNotAllowed {
                status: self.status.to_string(),
            });
        }
        if self.deleted_at.is_none() {
            self.deleted_at = Some(now);
            self.updated_at = now;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Why registration is closed at `now`, ignoring capacity.
    #[must_use]
    pub fn registration_closed_reason(&self, now: DateTime<Utc>) -> Option<String> {
        if self.is_deleted() {
            return Some("tournament has been deleted".to_string());
        }
        if self.status != TournamentStatus::Published {
            return Some(format!("tournament is {}", self.status));
        }
        if now < self.schedule.registration_start {
            return Some(format!(
                "registration opens at {}",
                self.schedule.registration_start
            ));
        }
        if now > self.schedule.registration_end {
            return Some(format!(
                "registration closed at {}",
                self.schedule.registration_end
            ));
        }
        None
    }

    /// Published, within the registration window, and not full.
    #[must_use]
    pub fn can_register_participants(&self, now: DateTime<Utc>) -> bool {
        self.registration_closed_reason(now).is_none() && !self.is_full()
    }

    /// Registers `user`, checking and incrementing capacity in one step.
    ///
    /// # Errors
    ///
    /// - [`EngineError::RegistrationClosed`] outside an open registration
    /// - [`EngineError::AlreadyRegistered`] for a duplicate user
    /// - [`EngineError::CapacityExceeded`] when full
    /// - [`EngineError::InvalidArgument`] for a blank team name
    pub fn add_participant(
        &mut self,
        user: UserId,
        team_name: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(reason) = self.registration_closed_reason(now) {
            return Err(EngineError::RegistrationClosed { reason });
        }
        if self.is_registered(user) {
            return Err(EngineError::AlreadyRegistered);
        }
        if self.is_full() {
            return Err(EngineError::CapacityExceeded {
                max: self.max_participants,
            });
        }
        let team_name = match team_name.map(|t| t.trim().to_string()) {
            Some(t) if t.is_empty() => {
                return Err(EngineError::invalid("team_name", "must not be blank"));
            }
            other => other,
        };
        self.participants.push(Participant {
            user,
            team_name,
            registered_at: now,
        });
        self.updated_at = now;
        Ok(())
    }

    /// Withdraws `user` while registration is still open.
    ///
    /// # Errors
    ///
    /// - [`EngineError::RegistrationClosed`] outside an open registration
    /// - [`EngineError::NotFound`] if the user is not registered
    pub fn remove_participant(&mut self, user: UserId, now: DateTime<Utc>) -> Result<()> {
        if let Some(reason) = self.registration_closed_reason(now) {
            return Err(EngineError::RegistrationClosed { reason });
        }
        let Some(index) = self.participants.iter().position(|p| p.user == user) else {
            return Err(EngineError::NotFound {
                entity: "participant",
                id: user.to_string(),
            });
        };
        self.participants.remove(index);
        self.updated_at = now;
        Ok(())
    }

    /// Holds one slot for a ticket about to be issued.
    ///
    /// Only the capacity is checked here; the remaining issuance
    /// preconditions belong to [`crate::ticket::issuance_blocker`].
    ///
    /// # Errors
    ///
    /// [`EngineError::CapacityExceeded`] when full.
    pub fn hold_ticket_slot(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.is_full() {
            return Err(EngineError::CapacityExceeded {
                max: self.max_participants,
            });
        }
        self.held_ticket_slots += 1;
        self.updated_at = now;
        Ok(())
    }

    /// Gives back a slot held by a cancelled or expired ticket.
    ///
    /// Returns `false` if no slot was held.
    pub fn release_ticket_slot(&mut self, now: DateTime<Utc>) -> bool {
        if self.held_ticket_slots == 0 {
            return false;
        }
        self.held_ticket_slots -= 1;
        self.updated_at = now;
        true
    }

    /// `current × entry_fee × rate` for paid tournaments, zero for free ones.
    ///
    /// An estimate; per-ticket commissions are snapshots and may differ.
    #[must_use]
    pub fn calculate_total_commission(&self) -> Money {
        match self.pricing.format {
            TournamentFormat::Free => Money::zero(),
            TournamentFormat::Paid => money::commission_for(
                self.current_participants(),
                self.pricing.entry_fee,
                self.pricing.commission_rate,
            ),
        }
    }

    // ------------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------------

    fn ensure_editable(&self) -> Result<()> {
        if self.status != TournamentStatus::Draft || self.is_deleted() {
            return Err(EngineError::TournamentNotEditable {
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    /// Updates name, description, capacity and rules.
    ///
    /// # Errors
    ///
    /// - [`EngineError::TournamentNotEditable`] outside draft
    /// - [`EngineError::InvalidArgument`] for a blank name or zero capacity
    pub fn update_basic_info(&mut self, update: BasicInfoUpdate, now: DateTime<Utc>) -> Result<()> {
        self.ensure_editable()?;
        let name = update.name.as_deref().map(validate_name).transpose()?;
        let capacity = update.max_participants.map(validate_capacity).transpose()?;
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(capacity) = capacity {
            self.max_participants = capacity;
        }
        if let Some(rules) = update.rules {
            self.rules = Some(rules);
        }
        self.updated_at = now;
        Ok(())
    }

    /// Replaces the schedule.
    ///
    /// # Errors
    ///
    /// [`EngineError::TournamentNotEditable`] outside draft.
    pub fn update_dates(&mut self, schedule: Schedule, now: DateTime<Utc>) -> Result<()> {
        self.ensure_editable()?;
        self.schedule = schedule;
        self.updated_at = now;
        Ok(())
    }

    /// Sets or clears streaming metadata.
    ///
    /// # Errors
    ///
    /// [`EngineError::TournamentNotEditable`] outside draft.
    pub fn configure_streaming(
        &mut self,
        streaming: Option<Streaming>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_editable()?;
        self.streaming = streaming;
        self.updated_at = now;
        Ok(())
    }

    /// Replaces format, fee, prize pool and rate.
    ///
    /// # Errors
    ///
    /// [`EngineError::TournamentNotEditable`] outside draft.
    pub fn update_pricing(&mut self, pricing: Pricing, now: DateTime<Utc>) -> Result<()> {
        self.ensure_editable()?;
        self.pricing = pricing;
        self.updated_at = now;
        Ok(())
    }

    /// Adjusts the platform commission rate.
    ///
    /// Allowed while draft or published. Tickets already issued keep the rate
    /// they were issued at.
    ///
    /// # Errors
    ///
    /// [`EngineError::TournamentNotEditable`] once running or terminal.
    pub fn update_commission_rate(&mut self, rate: CommissionRate, now: DateTime<Utc>) -> Result<()> {
        if !matches!(
            self.status,
            TournamentStatus::Draft | TournamentStatus::Published
        ) || self.is_deleted()
        {
            return Err(EngineError::TournamentNotEditable {
                status: self.status.to_string(),
            });
        }
        self.pricing.commission_rate = rate;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn schedule() -> Schedule {
        let now = t0();
        Schedule::new(
            now + Duration::days(7),
            now + Duration::days(8),
            now - Duration::days(1),
            now + Duration::days(6),
        )
        .unwrap()
    }

    fn paid(capacity: u32) -> Tournament {
        let pricing = Pricing::new(
            TournamentFormat::Paid,
            "50.00".parse().unwrap(),
            "500.00".parse().unwrap(),
            "0.05".parse().unwrap(),
        )
        .unwrap();
        Tournament::create(
            NewTournament {
                name: "Spring Cup".to_string(),
                description: "Open bracket".to_string(),
                category: CategoryId::new(),
                game: GameId::new(),
                organizer: UserId::new(),
                max_participants: capacity,
                pricing,
                schedule: schedule(),
                rules: None,
            },
            t0(),
        )
        .unwrap()
    }

    #[test]
    fn transition_table_matches_lifecycle() {
        use TournamentStatus::{Cancelled, Draft, Finished, InProgress, Published};
        let legal = [
            (Draft, Published),
            (Published, InProgress),
            (InProgress, Finished),
            (Draft, Cancelled),
            (Published, Cancelled),
            (InProgress, Cancelled),
        ];
        for from in TournamentStatus::ALL {
            for to in TournamentStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn schedule_rejects_out_of_order_dates() {
        let now = t0();
        assert!(Schedule::new(now, now, now - Duration::days(2), now - Duration::days(1)).is_err());
        assert!(
            Schedule::new(now, now + Duration::days(1), now, now - Duration::hours(1)).is_err()
        );
        assert!(
            Schedule::new(now, now + Duration::days(1), now - Duration::days(1), now + Duration::hours(1))
                .is_err()
        );
        assert!(
            Schedule::new(now, now + Duration::days(1), now - Duration::days(1), now).is_ok()
        );
    }

    #[test]
    fn pricing_enforces_fee_format_consistency() {
        let fee: Money = "10.00".parse().unwrap();
        assert!(Pricing::new(TournamentFormat::Free, fee, Money::zero(), CommissionRate::ZERO).is_err());
        assert!(
            Pricing::new(TournamentFormat::Paid, Money::zero(), Money::zero(), CommissionRate::ZERO)
                .is_err()
        );
        assert!(Pricing::new(TournamentFormat::Paid, fee, Money::zero(), CommissionRate::ZERO).is_ok());
    }

    #[test]
    fn create_rejects_zero_capacity_and_blank_name() {
        let mut input = NewTournament {
            name: "  ".to_string(),
            description: String::new(),
            category: CategoryId::new(),
            game: GameId::new(),
            organizer: UserId::new(),
            max_participants: 4,
            pricing: Pricing::free(Money::zero()),
            schedule: schedule(),
            rules: None,
        };
        assert!(matches!(
            Tournament::create(input.clone(), t0()),
            Err(EngineError::InvalidArgument { field: "name", .. })
        ));
        input.name = "Cup".to_string();
        input.max_participants = 0;
        assert!(matches!(
            Tournament::create(input, t0()),
            Err(EngineError::InvalidArgument { field: "max_participants", .. })
        ));
    }

    #[test]
    fn start_checks_state_before_participants() {
        let mut tournament = paid(4);
        assert!(matches!(
            tournament.start(t0()),
            Err(EngineError::InvalidStateTransition { .. })
        ));
        tournament.publish(t0()).unwrap();
        assert_eq!(
            tournament.start(t0()),
            Err(EngineError::InsufficientParticipants {
                required: 2,
                actual: 0
            })
        );
    }

    #[test]
    fn registration_respects_window_and_capacity() {
        let mut tournament = paid(1);
        let user = UserId::new();
        assert!(matches!(
            tournament.add_participant(user, None, t0()),
            Err(EngineError::RegistrationClosed { .. })
        ));
        tournament.publish(t0()).unwrap();
        assert!(tournament.can_register_participants(t0()));
        tournament
            .add_participant(user, Some("Team Rocket".to_string()), t0())
            .unwrap();
        assert_eq!(
            tournament.add_participant(user, None, t0()),
            Err(EngineError::AlreadyRegistered)
        );
        assert_eq!(
            tournament.add_participant(UserId::new(), None, t0()),
            Err(EngineError::CapacityExceeded { max: 1 })
        );
        assert!(!tournament.can_register_participants(t0()));

        let late = t0() + Duration::days(6) + Duration::seconds(1);
        tournament.remove_participant(user, t0()).unwrap();
        assert!(matches!(
            tournament.add_participant(user, None, late),
            Err(EngineError::RegistrationClosed { .. })
        ));
    }

    #[test]
    fn editing_is_limited_to_draft() {
        let mut tournament = paid(4);
        tournament
            .update_basic_info(
                BasicInfoUpdate {
                    name: Some("Summer Cup".to_string()),
                    max_participants: Some(8),
                    ..BasicInfoUpdate::default()
                },
                t0(),
            )
            .unwrap();
        assert_eq!(tournament.name(), "Summer Cup");
        assert_eq!(tournament.max_participants(), 8);

        tournament
            .configure_streaming(Some(Streaming::new("https://twitch.tv/cup", "Twitch").unwrap()), t0())
            .unwrap();
        tournament.publish(t0()).unwrap();

        assert!(matches!(
            tournament.update_basic_info(BasicInfoUpdate::default(), t0()),
            Err(EngineError::TournamentNotEditable { .. })
        ));
        assert!(matches!(
            tournament.update_dates(schedule(), t0()),
            Err(EngineError::TournamentNotEditable { .. })
        ));
        assert!(matches!(
            tournament.configure_streaming(None, t0()),
            Err(EngineError::TournamentNotEditable { .. })
        ));
        assert!(tournament
            .update_commission_rate("0.10".parse().unwrap(), t0())
            .is_ok());
    }

    #[test]
    fn delete_is_blocked_while_running() {
        let mut tournament = paid(4);
        tournament.publish(t0()).unwrap();
        tournament.add_participant(UserId::new(), None, t0()).unwrap();
        tournament.add_participant(UserId::new(), None, t0()).unwrap();
        tournament.start(t0()).unwrap();
        assert!(matches!(
            tournament.delete(t0()),
            Err(EngineError::DeletionNotAllowed { .. })
        ));
        tournament.finish(t0()).unwrap();
        tournament.delete(t0()).unwrap();
        tournament.delete(t0() + Duration::hours(1)).unwrap();
        assert_eq!(tournament.deleted_at(), Some(t0()));
        assert!(!tournament.can_register_participants(t0()));
    }

    #[test]
    fn total_commission_estimate() {
        let mut tournament = paid(4);
        tournament.publish(t0()).unwrap();
        tournament.add_participant(UserId::new(), None, t0()).unwrap();
        tournament.add_participant(UserId::new(), None, t0()).unwrap();
        assert_eq!(tournament.calculate_total_commission().to_string(), "5.00");
    }

    #[test]
    fn held_ticket_slots_share_capacity_with_participants() {
        let mut tournament = paid(2);
        tournament.publish(t0()).unwrap();
        tournament.hold_ticket_slot(t0()).unwrap();
        tournament.add_participant(UserId::new(), None, t0()).unwrap();
        assert_eq!(tournament.held_ticket_slots(), 1);
        assert!(tournament.is_full());
        assert_eq!(
            tournament.hold_ticket_slot(t0()),
            Err(EngineError::CapacityExceeded { max: 2 })
        );
        assert_eq!(
            tournament.add_participant(UserId::new(), None, t0()),
            Err(EngineError::CapacityExceeded { max: 2 })
        );

        assert!(tournament.release_ticket_slot(t0()));
        assert!(!tournament.release_ticket_slot(t0()));
        assert_eq!(tournament.available_slots(), 1);
    }

    #[test]
    fn held_ticket_slots_default_to_zero_when_absent() {
        let mut value = serde_json::to_value(paid(3)).unwrap();
        value.as_object_mut().unwrap().remove("held_ticket_slots");
        let tournament: Tournament = serde_json::from_value(value).unwrap();
        assert_eq!(tournament.held_ticket_slots(), 0);
        assert_eq!(tournament.available_slots(), 3);
    }
}
