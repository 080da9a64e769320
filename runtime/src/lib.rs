//! # Arena Runtime
//!
//! Orchestration shell around `arena-core`.
//!
//! The aggregates in `arena-core` decide what is legal; this crate performs
//! the atomic read-modify-write cycles against injected repositories, runs the
//! bounded ticket-code loop and the idempotent expiration sweep, and emits
//! lifecycle events after each commit.
//!
//! ## Core Components
//!
//! - **`TournamentService`**: tournament lifecycle, editing, and registration
//!   with capacity re-validated on conflicting writes
//! - **`TicketService`**: issuance, payment, redemption (by id or QR payload),
//!   cancellation
//! - **`ExpirationSweep`**: expires tickets past their expiration date
//! - **`TicketSlots`**: capacity held by live tickets
//! - **`EngineConfig`**: `ARENA_*` environment configuration
//!
//! ## Example
//!
//! ```ignore
//! use arena_runtime::{Engine, EngineConfig};
//!
//! let engine = Engine::from_config(
//!     &EngineConfig::from_env(),
//!     tournament_repository,
//!     ticket_repository,
//!     clock,
//!     notifier,
//! )?;
//!
//! let tournament = engine.tournaments.publish(tournament_id).await?;
//! let ticket = engine.tickets.issue(tournament.id(), holder).await?;
//! ```

use arena_core::environment::Clock;
use arena_core::event::{LifecycleEvent, LifecycleNotifier};
use arena_core::repository::{TicketRepository, TournamentRepository};
use arena_core::Result;
use std::sync::Arc;

/// Engine configuration from environment variables
pub mod config;

/// Business metrics
pub mod metrics;

/// Bounded retry of conflicting writes
pub mod retry;

/// Expiration sweep
pub mod sweep;

/// Capacity held by live tickets
pub mod slots;

/// Ticket orchestration
pub mod tickets;

/// Tournament orchestration
pub mod tournaments;

pub use config::EngineConfig;
pub use retry::RetryPolicy;
pub use slots::TicketSlots;
pub use sweep::{ExpirationSweep, SweepReport};
pub use tickets::TicketService;
pub use tournaments::TournamentService;

/// Hands a committed event to the notifier.
///
/// A delivery failure is logged and counted; the transition stays committed.
pub(crate) async fn emit(notifier: &dyn LifecycleNotifier, event: LifecycleEvent) {
    let event_type = event.event_type();
    let reference_type = event.reference_type();
    let reference_id = event.reference_id();
    if let Err(err) = notifier.notify(event).await {
        crate::metrics::EngineMetrics::record_notification_failure();
        tracing::warn!(
            event_type,
            %reference_type,
            %reference_id,
            error = %err,
            "Lifecycle notification failed"
        );
    } else {
        tracing::trace!(event_type, %reference_id, "Lifecycle event delivered");
    }
}

/// All services wired to one set of repositories.
pub struct Engine<K, R> {
    /// Tournament lifecycle
    pub tournaments: TournamentService<R>,
    /// Ticket lifecycle
    pub tickets: TicketService<K, R>,
    /// Ticket expiration
    pub sweep: ExpirationSweep<K, R>,
}

impl<K, R> Engine<K, R>
where
    K: TicketRepository + Clone,
    R: TournamentRepository + Clone,
{
    /// Builds every service from `config`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the code or expiry settings are invalid.
    pub fn from_config(
        config: &EngineConfig,
        tournaments: R,
        tickets: K,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn LifecycleNotifier>,
    ) -> Result<Self> {
        let retry = config.retry_policy();
        let sweep_retry = RetryPolicy {
            max_retries: config.sweep.max_conflict_retries,
            ..retry.clone()
        };
        let slots = TicketSlots::new(tournaments.clone(), Arc::clone(&clock), retry.clone());
        Ok(Self {
            tournaments: TournamentService::new(
                tournaments,
                Arc::clone(&clock),
                Arc::clone(&notifier),
                retry,
            ),
            tickets: TicketService::new(
                tickets.clone(),
                slots.clone(),
                Arc::clone(&clock),
                Arc::clone(&notifier),
                config.code_generator()?,
                config.expiry_policy()?,
            ),
            sweep: ExpirationSweep::new(
                tickets,
                slots,
                clock,
                notifier,
                config.sweep.batch_size,
                sweep_retry,
            ),
        })
    }
}
