//! # Arena Core
//!
//! Domain model for e-sport tournaments and the paid-entry tickets sold
//! against them.
//!
//! This crate is the functional core: two aggregates whose state machines,
//! capacity accounting, commission arithmetic and time-boxed validity rules
//! stay mutually consistent. It performs no I/O. Persistence, notification and
//! time are injected through traits and driven by `arena-runtime`.
//!
//! ## Core Concepts
//!
//! - **Tournament**: `Draft → Published → InProgress → Finished`, cancellable
//!   while live, with a capacity-bounded participant roster
//! - **Ticket**: `Reserved → Paid → Used`, expirable or cancellable while live,
//!   carrying a price/commission snapshot taken at issuance
//! - **Money**: exact decimals at cent scale, half-up commission rounding
//! - **Ticket codes**: `TKT-` plus an unambiguous random suffix, unique across
//!   all tickets
//! - **Lifecycle events**: facts emitted after a transition is committed
//!
//! ## Example
//!
//! ```
//! use arena_core::money::{self, CommissionRate, Money};
//!
//! let price: Money = "50.00".parse().unwrap();
//! let rate: CommissionRate = "0.05".parse().unwrap();
//! let fee = money::commission(price, rate);
//! assert_eq!(fee.to_string(), "2.50");
//! assert_eq!(money::net(price, fee).to_string(), "47.50");
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub mod code;
pub mod environment;
pub mod error;
pub mod event;
pub mod money;
pub mod qr;
pub mod repository;
pub mod ticket;
pub mod tournament;
pub mod types;

pub use code::{CodeGenerator, CodeOracle, TicketCode};
pub use environment::{Clock, SystemClock};
pub use error::{EngineError, IssuanceBlocker, Result};
pub use event::{LifecycleEvent, LifecycleNotifier, NoopNotifier, NotifyError, ReferenceType};
pub use money::{CommissionRate, Money};
pub use qr::QrPayload;
pub use repository::{TicketRepository, TournamentRepository, Version, Versioned};
pub use ticket::{ExpiryOutcome, ExpiryPolicy, Ticket, TicketStatus};
pub use tournament::{
    BasicInfoUpdate, NewTournament, Participant, Pricing, Schedule, Streaming, Tournament,
    TournamentFormat, TournamentStatus,
};
pub use types::{CategoryId, GameId, TicketId, TournamentId, UserId};
