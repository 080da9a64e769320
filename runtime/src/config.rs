//! Engine configuration.
//!
//! Loads configuration from `ARENA_*` environment variables with sensible
//! defaults. Unparseable values fall back to the default; values that parse
//! but are out of range are rejected when the typed policies are built.

use crate::retry::RetryPolicy;
use arena_core::code::{self, CodeGenerator};
use arena_core::ticket::{self, ExpiryPolicy};
use arena_core::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Ticket code generation
    pub codes: CodeConfig,
    /// Ticket expiry
    pub expiry: ExpiryConfig,
    /// Retries of conflicting writes
    pub conflicts: ConflictConfig,
    /// Expiration sweep
    pub sweep: SweepConfig,
}

/// Ticket code configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeConfig {
    /// Code prefix (default: `TKT`)
    pub prefix: String,
    /// Random suffix length (default: 8)
    pub suffix_len: usize,
    /// Candidates tried per issuance (default: 5)
    pub max_attempts: u32,
}

/// Ticket expiry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryConfig {
    /// Minutes between ticket expiry and tournament start (default: 60)
    pub lead_minutes: i64,
}

/// Optimistic-conflict retry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictConfig {
    /// Retries after the first attempt (default: 10)
    pub max_retries: usize,
    /// First backoff in milliseconds (default: 5)
    pub initial_delay_ms: u64,
    /// Backoff cap in milliseconds (default: 200)
    pub max_delay_ms: u64,
}

/// Expiration sweep configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Tickets examined per run (default: 500)
    pub batch_size: usize,
    /// Conflict retries per ticket (default: 3)
    pub max_conflict_retries: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl EngineConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            codes: CodeConfig {
                prefix: lookup("ARENA_CODE_PREFIX")
                    .map(|s| s.trim().to_string())
                    .unwrap_or_else(|| code::DEFAULT_PREFIX.to_string()),
                suffix_len: parsed(&lookup, "ARENA_CODE_LENGTH", code::DEFAULT_SUFFIX_LEN),
                max_attempts: parsed(&lookup, "ARENA_CODE_MAX_ATTEMPTS", code::DEFAULT_MAX_ATTEMPTS),
            },
            expiry: ExpiryConfig {
                lead_minutes: parsed(
                    &lookup,
                    "ARENA_TICKET_EXPIRY_LEAD_MINUTES",
                    ticket::DEFAULT_EXPIRY_LEAD_MINUTES,
                ),
            },
            conflicts: ConflictConfig {
                max_retries: parsed(&lookup, "ARENA_CONFLICT_MAX_RETRIES", 10),
                initial_delay_ms: parsed(&lookup, "ARENA_CONFLICT_INITIAL_DELAY_MS", 5),
                max_delay_ms: parsed(&lookup, "ARENA_CONFLICT_MAX_DELAY_MS", 200),
            },
            sweep: SweepConfig {
                batch_size: parsed(&lookup, "ARENA_SWEEP_BATCH_SIZE", 500),
                max_conflict_retries: parsed(&lookup, "ARENA_SWEEP_MAX_CONFLICT_RETRIES", 3),
            },
        }
    }

    /// Code generator for ticket issuance.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an invalid prefix, length or budget.
    pub fn code_generator(&self) -> Result<CodeGenerator> {
        CodeGenerator::new(
            self.codes.prefix.clone(),
            self.codes.suffix_len,
            self.codes.max_attempts,
        )
    }

    /// Expiry policy for ticket issuance.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a negative or out of range lead.
    pub fn expiry_policy(&self) -> Result<ExpiryPolicy> {
        let lead = chrono::Duration::try_minutes(self.expiry.lead_minutes).ok_or_else(|| {
            EngineError::invalid(
                "expiry_lead",
                format!("{} minutes is out of range", self.expiry.lead_minutes),
            )
        })?;
        ExpiryPolicy::new(lead)
    }

    /// Retry policy for conflicting writes.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.conflicts.max_retries)
            .initial_delay(Duration::from_millis(self.conflicts.initial_delay_ms))
            .max_delay(Duration::from_millis(self.conflicts.max_delay_ms))
            .build()
    }
}
