//! Ready-made tournaments and tickets.
//!
//! Dates are relative to [`test_clock`]: registration opened a day before
//! `now` and closes six days after it, and play starts on day seven.
//!
//! # Panics
//!
//! Fixture constructors panic if their hardcoded values fail validation,
//! which would be a bug in the fixture itself.

#![allow(clippy::expect_used)]

use crate::test_clock;
use arena_core::code::TicketCode;
use arena_core::environment::Clock;
use arena_core::money::{CommissionRate, Money};
use arena_core::ticket::{ExpiryPolicy, Ticket};
use arena_core::tournament::{NewTournament, Pricing, Schedule, Tournament, TournamentFormat};
use arena_core::types::{CategoryId, GameId, UserId};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

/// Builder for tournaments in a known state.
#[derive(Debug, Clone)]
pub struct TournamentFixture {
    now: DateTime<Utc>,
    capacity: u32,
    pricing: Pricing,
    schedule: Schedule,
}

impl TournamentFixture {
    /// Paid entry: fee 50.00, prize pool 500.00, commission rate 0.05
    #[must_use]
    pub fn paid(capacity: u32) -> Self {
        let pricing = Pricing::new(
            TournamentFormat::Paid,
            Money::from_cents(5_000),
            Money::from_cents(50_000),
            CommissionRate::new(Decimal::new(5, 2)).expect("fixture rate is valid"),
        )
        .expect("fixture pricing is valid");
        Self::with(capacity, pricing)
    }

    /// Free entry with a 100.00 prize pool
    #[must_use]
    pub fn free(capacity: u32) -> Self {
        Self::with(capacity, Pricing::free(Money::from_cents(10_000)))
    }

    fn with(capacity: u32, pricing: Pricing) -> Self {
        let now = test_clock().now();
        let start = now + Duration::days(7);
        let schedule = Schedule::new(
            start,
            start + Duration::hours(8),
            now - Duration::days(1),
            now + Duration::days(6),
        )
        .expect("fixture schedule is valid");
        Self {
            now,
            capacity,
            pricing,
            schedule,
        }
    }

    /// Override the pricing
    #[must_use]
    pub const fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    /// Override the schedule
    #[must_use]
    pub const fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Creation time of fixture tournaments
    #[must_use]
    pub const fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// The fixture schedule
    #[must_use]
    pub const fn schedule(&self) -> Schedule {
        self.schedule
    }

    /// Creation input
    #[must_use]
    pub fn input(&self) -> NewTournament {
        NewTournament {
            name: "Arena Open".to_string(),
            description: "Single elimination, best of three".to_string(),
            category: CategoryId::new(),
            game: GameId::new(),
            organizer: UserId::new(),
            max_participants: self.capacity,
            pricing: self.pricing,
            schedule: self.schedule,
            rules: Some("No smurfing".to_string()),
        }
    }

    /// A tournament in `Draft`
    #[must_use]
    pub fn draft(&self) -> Tournament {
        Tournament::create(self.input(), self.now).expect("fixture input is valid")
    }

    /// A tournament in `Published`, registration open at [`Self::now`]
    #[must_use]
    pub fn published(&self) -> Tournament {
        let mut tournament = self.draft();
        tournament.publish(self.now).expect("draft can be published");
        tournament
    }

    /// A reserved ticket with `code`, issued now against a published
    /// tournament under the default expiry policy
    #[must_use]
    pub fn ticket(&self, code: &str) -> Ticket {
        let code: TicketCode = code.parse().expect("fixture code is valid");
        Ticket::issue(
            &self.published(),
            UserId::new(),
            code,
            &ExpiryPolicy::default(),
            self.now,
        )
        .expect("fixture tournament is issuable")
    }
}
