//! Persistence contracts with optimistic concurrency.
//!
//! Storage technology is out of scope; the engine only needs versioned loads
//! and compare-and-set saves. Every successful write bumps the stored
//! [`Version`] by one.
//!
//! # Optimistic Concurrency
//!
//! - `load` returns the aggregate with the version it was read at
//! - `save(value, expected)` succeeds only if the stored version still equals
//!   `expected`, and returns the new version
//! - otherwise it fails with [`EngineError::ConcurrentModification`] and
//!   nothing is written
//!
//! [`EngineError::ConcurrentModification`]: crate::error::EngineError::ConcurrentModification

use crate::code::{CodeOracle, TicketCode};
use crate::error::Result;
use crate::ticket::Ticket;
use crate::tournament::Tournament;
use crate::types::{TicketId, TournamentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

/// Stored version of an aggregate.
///
/// A freshly inserted aggregate is at [`Version::INITIAL`].
///
/// # Examples
///
/// ```
/// use arena_core::repository::Version;
///
/// let v0 = Version::INITIAL;
/// assert_eq!(v0.next(), Version::new(1));
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// Version of a freshly inserted aggregate.
    pub const INITIAL: Self = Self(0);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next version (current + 1).
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// An aggregate together with the version it was loaded at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Versioned<T> {
    /// The aggregate
    pub value: T,
    /// Version to pass back to `save`
    pub version: Version,
}

impl<T> Versioned<T> {
    /// Pairs a value with its version.
    pub const fn new(value: T, version: Version) -> Self {
        Self { value, version }
    }
}

/// Tournament storage.
pub trait TournamentRepository: Send + Sync {
    /// Loads a tournament.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no tournament has this id
    /// - `Storage` on backend failure
    fn load(&self, id: TournamentId) -> impl Future<Output = Result<Versioned<Tournament>>> + Send;

    /// Stores a new tournament at [`Version::INITIAL`].
    ///
    /// # Errors
    ///
    /// `Storage` on backend failure or if the id already exists.
    fn insert(&self, tournament: Tournament) -> impl Future<Output = Result<Version>> + Send;

    /// Compare-and-set write.
    ///
    /// # Errors
    ///
    /// - `ConcurrentModification` if the stored version is not `expected`
    /// - `NotFound` if the tournament does not exist
    /// - `Storage` on backend failure
    fn save(
        &self,
        tournament: Tournament,
        expected: Version,
    ) -> impl Future<Output = Result<Version>> + Send;
}

/// Ticket storage.
///
/// Doubles as the [`CodeOracle`] for code generation; `insert` enforces code
/// uniqueness again so a race between the check and the write is caught.
pub trait TicketRepository: CodeOracle {
    /// Loads a ticket.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no ticket has this id
    /// - `Storage` on backend failure
    fn load(&self, id: TicketId) -> impl Future<Output = Result<Versioned<Ticket>>> + Send;

    /// Looks a ticket up by its public code.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no ticket has this code
    /// - `Storage` on backend failure
    fn find_by_code(
        &self,
        code: &TicketCode,
    ) -> impl Future<Output = Result<Versioned<Ticket>>> + Send;

    /// Stores a new ticket at [`Version::INITIAL`].
    ///
    /// # Errors
    ///
    /// - `CodeCollision` if another ticket already holds the code
    /// - `Storage` on backend failure
    fn insert(&self, ticket: Ticket) -> impl Future<Output = Result<Version>> + Send;

    /// Compare-and-set write.
    ///
    /// # Errors
    ///
    /// - `ConcurrentModification` if the stored version is not `expected`
    /// - `NotFound` if the ticket does not exist
    /// - `Storage` on backend failure
    fn save(&self, ticket: Ticket, expected: Version)
    -> impl Future<Output = Result<Version>> + Send;

    /// Ids of non-terminal tickets whose expiration date is at or before
    /// `now`, at most `limit` of them.
    ///
    /// # Errors
    ///
    /// `Storage` on backend failure.
    fn find_expirable(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<TicketId>>> + Send;
}
