//! In-memory repositories.
//!
//! Each repository keeps its whole state behind one `tokio::sync::Mutex`, so
//! the version compare and the write in `save` are atomic exactly as a
//! database row-version check would be.

use arena_core::code::{CodeOracle, TicketCode};
use arena_core::error::{EngineError, Result};
use arena_core::repository::{TicketRepository, TournamentRepository, Version, Versioned};
use arena_core::ticket::Ticket;
use arena_core::tournament::Tournament;
use arena_core::types::{TicketId, TournamentId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

fn conflict(entity: &'static str, id: String, expected: Version, actual: Version) -> EngineError {
    EngineError::ConcurrentModification {
        entity,
        id,
        expected: expected.value(),
        actual: actual.value(),
    }
}

// ============================================================================
// Tournaments
// ============================================================================

/// In-memory [`TournamentRepository`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryTournamentRepository {
    tournaments: Arc<Mutex<HashMap<TournamentId, (Tournament, Version)>>>,
}

impl InMemoryTournamentRepository {
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stored version of a tournament
    pub async fn version_of(&self, id: TournamentId) -> Option<Version> {
        self.tournaments.lock().await.get(&id).map(|(_, v)| *v)
    }
}

impl TournamentRepository for InMemoryTournamentRepository {
    async fn load(&self, id: TournamentId) -> Result<Versioned<Tournament>> {
        self.tournaments
            .lock()
            .await
            .get(&id)
            .map(|(t, v)| Versioned::new(t.clone(), *v))
            .ok_or_else(|| EngineError::NotFound {
                entity: "tournament",
                id: id.to_string(),
            })
    }

    async fn insert(&self, tournament: Tournament) -> Result<Version> {
        let mut tournaments = self.tournaments.lock().await;
        let id = tournament.id();
        if tournaments.contains_key(&id) {
            return Err(EngineError::Storage(format!("tournament {id} already exists")));
        }
        tournaments.insert(id, (tournament, Version::INITIAL));
        Ok(Version::INITIAL)
    }

    async fn save(&self, tournament: Tournament, expected: Version) -> Result<Version> {
        let mut tournaments = self.tournaments.lock().await;
        let id = tournament.id();
        let Some(entry) = tournaments.get_mut(&id) else {
            return Err(EngineError::NotFound {
                entity: "tournament",
                id: id.to_string(),
            });
        };
        if entry.1 != expected {
            return Err(conflict("tournament", id.to_string(), expected, entry.1));
        }
        let next = expected.next();
        *entry = (tournament, next);
        Ok(next)
    }
}

// ============================================================================
// Tickets
// ============================================================================

/// A concurrent write applied to a stored ticket just before the next save.
pub type ConcurrentWrite = Box<dyn FnOnce(&mut Ticket) + Send>;

#[derive(Default)]
struct TicketState {
    tickets: HashMap<TicketId, (Ticket, Version)>,
    codes: HashMap<TicketCode, TicketId>,
    forced_collisions: u32,
    concurrent_writes: HashMap<TicketId, ConcurrentWrite>,
}

/// In-memory [`TicketRepository`] with a unique index on ticket codes.
///
/// Two hooks simulate races that are otherwise timing dependent:
/// [`InMemoryTicketRepository::force_code_collisions`] and
/// [`InMemoryTicketRepository::interleave_write`].
#[derive(Clone, Default)]
pub struct InMemoryTicketRepository {
    state: Arc<Mutex<TicketState>>,
}

impl std::fmt::Debug for InMemoryTicketRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTicketRepository").finish_non_exhaustive()
    }
}

impl InMemoryTicketRepository {
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` inserts fail with `CodeCollision`, as if another
    /// writer took the code after the oracle check.
    pub async fn force_code_collisions(&self, count: u32) {
        self.state.lock().await.forced_collisions = count;
    }

    /// Apply `write` to the stored ticket right before its next save, bumping
    /// its version, as if another writer committed first.
    pub async fn interleave_write(&self, id: TicketId, write: ConcurrentWrite) {
        self.state.lock().await.concurrent_writes.insert(id, write);
    }

    /// Every stored ticket
    pub async fn all(&self) -> Vec<Ticket> {
        self.state
            .lock()
            .await
            .tickets
            .values()
            .map(|(t, _)| t.clone())
            .collect()
    }

    /// Current stored version of a ticket
    pub async fn version_of(&self, id: TicketId) -> Option<Version> {
        self.state.lock().await.tickets.get(&id).map(|(_, v)| *v)
    }
}

fn ticket_not_found(id: impl ToString) -> EngineError {
    EngineError::NotFound {
        entity: "ticket",
        id: id.to_string(),
    }
}

impl CodeOracle for InMemoryTicketRepository {
    async fn code_exists(&self, code: &TicketCode) -> Result<bool> {
        Ok(self.state.lock().await.codes.contains_key(code))
    }
}

impl TicketRepository for InMemoryTicketRepository {
    async fn load(&self, id: TicketId) -> Result<Versioned<Ticket>> {
        self.state
            .lock()
            .await
            .tickets
            .get(&id)
            .map(|(t, v)| Versioned::new(t.clone(), *v))
            .ok_or_else(|| ticket_not_found(id))
    }

    async fn find_by_code(&self, code: &TicketCode) -> Result<Versioned<Ticket>> {
        let state = self.state.lock().await;
        state
            .codes
            .get(code)
            .and_then(|id| state.tickets.get(id))
            .map(|(t, v)| Versioned::new(t.clone(), *v))
            .ok_or_else(|| ticket_not_found(code))
    }

    async fn insert(&self, ticket: Ticket) -> Result<Version> {
        let mut state = self.state.lock().await;
        if state.forced_collisions > 0 || state.codes.contains_key(ticket.code()) {
            state.forced_collisions = state.forced_collisions.saturating_sub(1);
            return Err(EngineError::CodeCollision {
                code: ticket.code().to_string(),
            });
        }
        let id = ticket.id();
        if state.tickets.contains_key(&id) {
            return Err(EngineError::Storage(format!("ticket {id} already exists")));
        }
        state.codes.insert(ticket.code().clone(), id);
        state.tickets.insert(id, (ticket, Version::INITIAL));
        Ok(Version::INITIAL)
    }

    async fn save(&self, ticket: Ticket, expected: Version) -> Result<Version> {
        let mut state = self.state.lock().await;
        let id = ticket.id();
        let write = state.concurrent_writes.remove(&id);
        let Some(entry) = state.tickets.get_mut(&id) else {
            return Err(ticket_not_found(id));
        };
        if let Some(write) = write {
            write(&mut entry.0);
            entry.1 = entry.1.next();
        }
        if entry.1 != expected {
            return Err(conflict("ticket", id.to_string(), expected, entry.1));
        }
        let next = expected.next();
        *entry = (ticket, next);
        Ok(next)
    }

    async fn find_expirable(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<TicketId>> {
        let state = self.state.lock().await;
        let mut due: Vec<&Ticket> = state
            .tickets
            .values()
            .map(|(t, _)| t)
            .filter(|t| !t.status().is_terminal() && t.expiration_date() <= now)
            .collect();
        due.sort_by_key(|t| t.expiration_date());
        Ok(due.into_iter().take(limit).map(Ticket::id).collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixtures::TournamentFixture;
    use crate::test_clock;
    use arena_core::environment::Clock;

    #[tokio::test]
    async fn save_is_compare_and_set() {
        let repo = InMemoryTournamentRepository::new();
        let tournament = TournamentFixture::paid(4).draft();
        let id = tournament.id();
        repo.insert(tournament.clone()).await.unwrap();

        let v1 = repo.save(tournament.clone(), Version::INITIAL).await.unwrap();
        assert_eq!(v1, Version::new(1));
        let stale = repo.save(tournament, Version::INITIAL).await;
        assert!(matches!(
            stale,
            Err(EngineError::ConcurrentModification { expected: 0, actual: 1, .. })
        ));
        assert_eq!(repo.version_of(id).await, Some(v1));
    }

    #[tokio::test]
    async fn ticket_codes_are_unique_at_insert() {
        let repo = InMemoryTicketRepository::new();
        let fixture = TournamentFixture::paid(4);
        let first = fixture.ticket("TKT-AAAAAAAA");
        let duplicate = fixture.ticket("TKT-AAAAAAAA");
        repo.insert(first.clone()).await.unwrap();
        assert!(repo.code_exists(first.code()).await.unwrap());
        assert!(matches!(
            repo.insert(duplicate).await,
            Err(EngineError::CodeCollision { .. })
        ));
        assert_eq!(repo.find_by_code(first.code()).await.unwrap().value, first);
    }

    #[tokio::test]
    async fn interleaved_write_causes_conflict() {
        let repo = InMemoryTicketRepository::new();
        let ticket = TournamentFixture::paid(4).ticket("TKT-BBBBBBBB");
        let id = ticket.id();
        repo.insert(ticket.clone()).await.unwrap();
        repo.interleave_write(id, Box::new(|t: &mut Ticket| {
            let _ = t.cancel(test_clock().now());
        }))
        .await;

        let result = repo.save(ticket, Version::INITIAL).await;
        assert!(matches!(result, Err(EngineError::ConcurrentModification { .. })));
        let stored = repo.load(id).await.unwrap();
        assert!(stored.value.status().is_terminal());
        assert_eq!(stored.version, Version::new(1));
    }

    #[tokio::test]
    async fn expirable_excludes_terminal_and_future_tickets() {
        let repo = InMemoryTicketRepository::new();
        let fixture = TournamentFixture::paid(4);
        let live = fixture.ticket("TKT-CCCCCCCC");
        let mut cancelled = fixture.ticket("TKT-DDDDDDDD");
        cancelled.cancel(test_clock().now()).unwrap();
        let expiry = live.expiration_date();
        repo.insert(live.clone()).await.unwrap();
        repo.insert(cancelled).await.unwrap();

        assert!(repo.find_expirable(test_clock().now(), 10).await.unwrap().is_empty());
        assert_eq!(
            repo.find_expirable(expiry, 10).await.unwrap(),
            vec![live.id()]
        );
        assert!(repo.find_expirable(expiry, 0).await.unwrap().is_empty());
    }
}
