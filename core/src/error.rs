//! Error types for tournament and ticket lifecycle operations.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Why a ticket could not be issued against a tournament.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceBlocker {
    /// The tournament is free to enter.
    FreeTournament,
    /// The tournament has no positive entry fee.
    NoEntryFee,
    /// Registration is not open (wrong status, deleted, or outside the window).
    RegistrationClosed,
    /// The tournament has no free slots left.
    NoCapacity,
    /// The ticket would already be expired at issuance.
    ExpiryElapsed,
}

impl std::fmt::Display for IssuanceBlocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::FreeTournament => "tournament format is FREE",
            Self::NoEntryFee => "tournament has no positive entry fee",
            Self::RegistrationClosed => "registration window is not open",
            Self::NoCapacity => "tournament has no available capacity",
            Self::ExpiryElapsed => "ticket expiration would already have passed",
        };
        f.write_str(reason)
    }
}

/// Error taxonomy for the lifecycle engine.
///
/// Every variant identifies the precondition that failed so callers can
/// produce precise client messages.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    // ═══════════════════════════════════════════════════════════
    // Input Errors
    // ═══════════════════════════════════════════════════════════

    /// Malformed input to a constructor or setter.
    #[error("Invalid argument `{field}`: {reason}")]
    InvalidArgument {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Lifecycle Errors
    // ═══════════════════════════════════════════════════════════

    /// A lifecycle method was called from a state that does not permit it.
    #[error("Invalid {entity} transition from {from} to {to}")]
    InvalidStateTransition {
        /// Aggregate kind ("tournament" or "ticket")
        entity: &'static str,
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// `start` was called below the participant threshold.
    #[error("Insufficient participants: {actual} registered, {required} required")]
    InsufficientParticipants {
        /// Minimum participants required
        required: u32,
        /// Participants currently registered
        actual: u32,
    },

    /// Tournament attributes can only be edited while in draft.
    #[error("Tournament is not editable in status {status}")]
    TournamentNotEditable {
        /// Current status
        status: String,
    },

    /// A running tournament cannot be deleted.
    #[error("Tournament cannot be deleted in status {status}")]
    DeletionNotAllowed {
        /// Current status
        status: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Registration Errors
    // ═══════════════════════════════════════════════════════════

    /// Registration is not open.
    #[error("Registration closed: {reason}")]
    RegistrationClosed {
        /// Which registration condition failed
        reason: String,
    },

    /// The tournament is full.
    #[error("Capacity exceeded: tournament is limited to {max} participants")]
    CapacityExceeded {
        /// Maximum participants
        max: u32,
    },

    /// The user already holds a participant record.
    #[error("User is already registered for this tournament")]
    AlreadyRegistered,

    // ═══════════════════════════════════════════════════════════
    // Ticket Errors
    // ═══════════════════════════════════════════════════════════

    /// An issuance precondition failed.
    #[error("Ticket not issuable: {reason}")]
    TicketNotIssuable {
        /// Failed precondition
        reason: IssuanceBlocker,
    },

    /// A time-sensitive transition was attempted past the expiration date.
    #[error("Ticket expired at {expired_at}")]
    TicketExpired {
        /// Expiration instant of the ticket
        expired_at: chrono::DateTime<chrono::Utc>,
    },

    /// No free ticket code was found within the attempt budget.
    #[error("Ticket code generation exhausted after {attempts} attempts")]
    CodeGenerationExhausted {
        /// Attempts made
        attempts: u32,
    },

    /// A ticket code was taken between the uniqueness check and the insert.
    ///
    /// Retryable; never surfaced by ticket issuance.
    #[error("Ticket code {code} is already in use")]
    CodeCollision {
        /// Colliding code
        code: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Persistence Errors
    // ═══════════════════════════════════════════════════════════

    /// An atomic read-modify-write detected a conflicting concurrent change.
    #[error("Concurrent modification of {entity} {id}: expected version {expected}, found {actual}")]
    ConcurrentModification {
        /// Aggregate kind
        entity: &'static str,
        /// Aggregate id
        id: String,
        /// Version the writer loaded
        expected: u64,
        /// Version currently stored
        actual: u64,
    },

    /// Aggregate not found.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Aggregate kind
        entity: &'static str,
        /// Aggregate id
        id: String,
    },

    /// Persistence collaborator failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Shorthand for [`EngineError::InvalidArgument`].
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }

    /// Whether the error is a transient condition worth retrying internally.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentModification { .. } | Self::CodeCollision { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_issuable_display_names_reason() {
        let error = EngineError::TicketNotIssuable {
            reason: IssuanceBlocker::FreeTournament,
        };
        assert_eq!(
            error.to_string(),
            "Ticket not issuable: tournament format is FREE"
        );
    }

    #[test]
    fn concurrent_modification_display() {
        let error = EngineError::ConcurrentModification {
            entity: "ticket",
            id: "abc".to_string(),
            expected: 3,
            actual: 4,
        };
        let display = error.to_string();
        assert!(display.contains("expected version 3"));
        assert!(display.contains("found 4"));
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(
            EngineError::ConcurrentModification {
                entity: "tournament",
                id: "t".to_string(),
                expected: 1,
                actual: 2,
            }
            .is_retryable()
        );
        assert!(EngineError::CodeCollision { code: "TKT-AAAAAAAA".to_string() }.is_retryable());
        assert!(!EngineError::CapacityExceeded { max: 2 }.is_retryable());
        assert!(!EngineError::AlreadyRegistered.is_retryable());
    }
}
