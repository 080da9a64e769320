//! Lifecycle facts and the notifier contract.
//!
//! The runtime emits one [`LifecycleEvent`] per committed transition. Events
//! are facts about the past: they are produced only after the state change has
//! been persisted, and a failed delivery never rolls the change back.
//!
//! # Example
//!
//! ```
//! use arena_core::event::{LifecycleEvent, ReferenceType};
//! use arena_core::types::TournamentId;
//! use chrono::Utc;
//!
//! let event = LifecycleEvent::TournamentPublished {
//!     tournament_id: TournamentId::new(),
//!     at: Utc::now(),
//! };
//! assert_eq!(event.event_type(), "TournamentPublished.v1");
//! assert_eq!(event.reference_type(), ReferenceType::Tournament);
//! ```

use crate::code::TicketCode;
use crate::types::{TicketId, TournamentId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

/// Kind of aggregate an event refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceType {
    /// A tournament
    Tournament,
    /// A ticket
    Ticket,
}

impl fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tournament => f.write_str("TOURNAMENT"),
            Self::Ticket => f.write_str("TICKET"),
        }
    }
}

/// A committed lifecycle transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LifecycleEvent {
    // ========================================================================
    // Tournament
    // ========================================================================
    /// `Draft → Published`
    TournamentPublished {
        /// Tournament
        tournament_id: TournamentId,
        /// Commit time
        at: DateTime<Utc>,
    },
    /// `Published → InProgress`
    TournamentStarted {
        /// Tournament
        tournament_id: TournamentId,
        /// Commit time
        at: DateTime<Utc>,
    },
    /// `InProgress → Finished`
    TournamentFinished {
        /// Tournament
        tournament_id: TournamentId,
        /// Commit time
        at: DateTime<Utc>,
    },
    /// Cancelled from a live state
    TournamentCancelled {
        /// Tournament
        tournament_id: TournamentId,
        /// Commit time
        at: DateTime<Utc>,
    },
    /// Soft-deleted
    TournamentDeleted {
        /// Tournament
        tournament_id: TournamentId,
        /// Commit time
        at: DateTime<Utc>,
    },
    /// A participant joined the roster
    ParticipantRegistered {
        /// Tournament
        tournament_id: TournamentId,
        /// Participant
        user_id: UserId,
        /// Commit time
        at: DateTime<Utc>,
    },
    /// A participant left the roster
    ParticipantWithdrawn {
        /// Tournament
        tournament_id: TournamentId,
        /// Participant
        user_id: UserId,
        /// Commit time
        at: DateTime<Utc>,
    },

    // ========================================================================
    // Ticket
    // ========================================================================
    /// A reservation was confirmed by issuing a ticket
    TicketIssued {
        /// Ticket
        ticket_id: TicketId,
        /// Tournament
        tournament_id: TournamentId,
        /// Holder
        holder_id: UserId,
        /// Public code
        code: TicketCode,
        /// Commit time
        at: DateTime<Utc>,
    },
    /// `Reserved → Paid`
    TicketPaid {
        /// Ticket
        ticket_id: TicketId,
        /// Tournament
        tournament_id: TournamentId,
        /// Opaque payment reference
        payment_reference: String,
        /// Commit time
        at: DateTime<Utc>,
    },
    /// `Paid → Used`
    TicketUsed {
        /// Ticket
        ticket_id: TicketId,
        /// Tournament
        tournament_id: TournamentId,
        /// Commit time
        at: DateTime<Utc>,
    },
    /// Expired by the sweep
    TicketExpired {
        /// Ticket
        ticket_id: TicketId,
        /// Tournament
        tournament_id: TournamentId,
        /// Commit time
        at: DateTime<Utc>,
    },
    /// Cancelled from a live state
    TicketCancelled {
        /// Ticket
        ticket_id: TicketId,
        /// Tournament
        tournament_id: TournamentId,
        /// Commit time
        at: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    /// Stable, versioned event name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::TournamentPublished { .. } => "TournamentPublished.v1",
            Self::TournamentStarted { .. } => "TournamentStarted.v1",
            Self::TournamentFinished { .. } => "TournamentFinished.v1",
            Self::TournamentCancelled { .. } => "TournamentCancelled.v1",
            Self::TournamentDeleted { .. } => "TournamentDeleted.v1",
            Self::ParticipantRegistered { .. } => "ParticipantRegistered.v1",
            Self::ParticipantWithdrawn { .. } => "ParticipantWithdrawn.v1",
            Self::TicketIssued { .. } => "TicketIssued.v1",
            Self::TicketPaid { .. } => "TicketPaid.v1",
            Self::TicketUsed { .. } => "TicketUsed.v1",
            Self::TicketExpired { .. } => "TicketExpired.v1",
            Self::TicketCancelled { .. } => "TicketCancelled.v1",
        }
    }

    /// Kind of aggregate the event refers to.
    #[must_use]
    pub const fn reference_type(&self) -> ReferenceType {
        match self {
            Self::TournamentPublished { .. }
            | Self::TournamentStarted { .. }
            | Self::TournamentFinished { .. }
            | Self::TournamentCancelled { .. }
            | Self::TournamentDeleted { .. }
            | Self::ParticipantRegistered { .. }
            | Self::ParticipantWithdrawn { .. } => ReferenceType::Tournament,
            Self::TicketIssued { .. }
            | Self::TicketPaid { .. }
            | Self::TicketUsed { .. }
            | Self::TicketExpired { .. }
            | Self::TicketCancelled { .. } => ReferenceType::Ticket,
        }
    }

    /// Id of the referenced aggregate.
    #[must_use]
    pub const fn reference_id(&self) -> Uuid {
        match self {
            Self::TournamentPublished { tournament_id, .. }
            | Self::TournamentStarted { tournament_id, .. }
            | Self::TournamentFinished { tournament_id, .. }
            | Self::TournamentCancelled { tournament_id, .. }
            | Self::TournamentDeleted { tournament_id, .. }
            | Self::ParticipantRegistered { tournament_id, .. }
            | Self::ParticipantWithdrawn { tournament_id, .. } => *tournament_id.as_uuid(),
            Self::TicketIssued { ticket_id, .. }
            | Self::TicketPaid { ticket_id, .. }
            | Self::TicketUsed { ticket_id, .. }
            | Self::TicketExpired { ticket_id, .. }
            | Self::TicketCancelled { ticket_id, .. } => *ticket_id.as_uuid(),
        }
    }

    /// Commit time of the transition.
    #[must_use]
    pub const fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::TournamentPublished { at, .. }
            | Self::TournamentStarted { at, .. }
            | Self::TournamentFinished { at, .. }
            | Self::TournamentCancelled { at, .. }
            | Self::TournamentDeleted { at, .. }
            | Self::ParticipantRegistered { at, .. }
            | Self::ParticipantWithdrawn { at, .. }
            | Self::TicketIssued { at, .. }
            | Self::TicketPaid { at, .. }
            | Self::TicketUsed { at, .. }
            | Self::TicketExpired { at, .. }
            | Self::TicketCancelled { at, .. } => *at,
        }
    }
}

/// Delivery failure reported by a [`LifecycleNotifier`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Consumer of lifecycle facts.
///
/// Delivery, retries and channel selection belong to the implementation. The
/// engine logs a returned error and moves on.
///
/// # Dyn Compatibility
///
/// Returns `Pin<Box<dyn Future>>` so services can hold an
/// `Arc<dyn LifecycleNotifier>`.
pub trait LifecycleNotifier: Send + Sync {
    /// Delivers one event.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if the event could not be handed off.
    fn notify(
        &self,
        event: LifecycleEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>>;
}

/// Notifier that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl LifecycleNotifier for NoopNotifier {
    fn notify(
        &self,
        _event: LifecycleEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn ticket_events_reference_the_ticket() {
        let ticket_id = TicketId::new();
        let event = LifecycleEvent::TicketPaid {
            ticket_id,
            tournament_id: TournamentId::new(),
            payment_reference: "PAY-9".to_string(),
            at: Utc::now(),
        };
        assert_eq!(event.reference_type(), ReferenceType::Ticket);
        assert_eq!(event.reference_id(), *ticket_id.as_uuid());
        assert_eq!(event.event_type(), "TicketPaid.v1");
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = LifecycleEvent::TournamentCancelled {
            tournament_id: TournamentId::new(),
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "TournamentCancelled");
        let back: LifecycleEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn noop_notifier_accepts_everything() {
        let event = LifecycleEvent::TournamentStarted {
            tournament_id: TournamentId::new(),
            at: Utc::now(),
        };
        assert!(tokio_test::block_on(NoopNotifier.notify(event)).is_ok());
    }
}
