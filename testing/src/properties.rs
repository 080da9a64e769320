//! proptest strategies for domain values.

use arena_core::money::{CommissionRate, Money};
use arena_core::ticket::TicketStatus;
use arena_core::tournament::TournamentStatus;
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Amounts from 0.00 to 100 000.00
pub fn money() -> impl Strategy<Value = Money> {
    (0u32..=10_000_000).prop_map(Money::from_cents)
}

/// Strictly positive amounts up to 100 000.00
pub fn positive_money() -> impl Strategy<Value = Money> {
    (1u32..=10_000_000).prop_map(Money::from_cents)
}

/// Rates in `[0, 1]` with basis-point precision
pub fn commission_rate() -> impl Strategy<Value = CommissionRate> {
    (0i64..=10_000).prop_filter_map("rate within [0, 1]", |bps| {
        CommissionRate::new(Decimal::new(bps, 4)).ok()
    })
}

/// Any tournament status
pub fn tournament_status() -> impl Strategy<Value = TournamentStatus> {
    proptest::sample::select(TournamentStatus::ALL.to_vec())
}

/// Any ticket status
pub fn ticket_status() -> impl Strategy<Value = TicketStatus> {
    proptest::sample::select(TicketStatus::ALL.to_vec())
}
