//! Human-typeable ticket codes and their generator.
//!
//! A code is a short uppercase prefix, a dash, and a random suffix drawn from
//! an alphabet without look-alike characters (`0 O 1 I L`), e.g.
//! `TKT-7QH4M2XR`. Codes are globally unique; uniqueness is checked against
//! an external [`CodeOracle`] and enforced again by the ticket repository at
//! insert time.

use crate::error::{EngineError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;

/// Characters a code suffix may contain.
pub const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// Default code prefix.
pub const DEFAULT_PREFIX: &str = "TKT";

/// Default suffix length.
pub const DEFAULT_SUFFIX_LEN: usize = 8;

/// Default number of candidates tried before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

const PREFIX_LEN: std::ops::RangeInclusive<usize> = 2..=6;
const SUFFIX_LEN: std::ops::RangeInclusive<usize> = 6..=16;

/// A validated ticket code.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TicketCode(String);

impl TicketCode {
    /// Returns the code as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the prefix part of the code (before the dash)
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.0.split_once('-').map_or("", |(prefix, _)| prefix)
    }
}

fn validate_prefix(prefix: &str) -> Result<()> {
    if !PREFIX_LEN.contains(&prefix.len()) || !prefix.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(EngineError::invalid(
            "code",
            format!("prefix `{prefix}` must be 2-6 uppercase ASCII letters"),
        ));
    }
    Ok(())
}

impl FromStr for TicketCode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let Some((prefix, suffix)) = s.split_once('-') else {
            return Err(EngineError::invalid("code", format!("`{s}` has no prefix separator")));
        };
        validate_prefix(prefix)?;
        if !SUFFIX_LEN.contains(&suffix.len()) {
            return Err(EngineError::invalid(
                "code",
                format!("suffix of `{s}` must be 6-16 characters"),
            ));
        }
        if let Some(bad) = suffix.bytes().find(|b| !CODE_ALPHABET.contains(b)) {
            return Err(EngineError::invalid(
                "code",
                format!("`{s}` contains disallowed character `{}`", char::from(bad)),
            ));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for TicketCode {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TicketCode> for String {
    fn from(code: TicketCode) -> Self {
        code.0
    }
}

impl fmt::Display for TicketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Uniqueness oracle for ticket codes.
///
/// Typically an existence lookup against ticket storage.
pub trait CodeOracle: Send + Sync {
    /// Whether `code` is already used by an issued ticket.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] if the lookup fails.
    fn code_exists(&self, code: &TicketCode) -> impl Future<Output = Result<bool>> + Send;
}

/// Generates random ticket codes, retrying against a [`CodeOracle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeGenerator {
    prefix: String,
    suffix_len: usize,
    max_attempts: u32,
}

impl CodeGenerator {
    /// Creates a generator.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] if the prefix or suffix length
    /// would produce codes that fail [`TicketCode`] validation, or if
    /// `max_attempts` is zero.
    pub fn new(prefix: impl Into<String>, suffix_len: usize, max_attempts: u32) -> Result<Self> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        if !SUFFIX_LEN.contains(&suffix_len) {
            return Err(EngineError::invalid("code", "suffix length must be 6-16"));
        }
        if max_attempts == 0 {
            return Err(EngineError::invalid("code", "at least one attempt is required"));
        }
        Ok(Self {
            prefix,
            suffix_len,
            max_attempts,
        })
    }

    /// Attempt budget per generation.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Draws one random candidate without checking uniqueness.
    #[must_use]
    pub fn candidate(&self) -> TicketCode {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..self.suffix_len)
            .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
            .collect();
        TicketCode(format!("{}-{suffix}", self.prefix))
    }

    /// Returns the first candidate the oracle reports as unused.
    ///
    /// A taken code is a retryable condition; the loop gives up after
    /// `max_attempts` candidates.
    ///
    /// # Errors
    ///
    /// - [`EngineError::CodeGenerationExhausted`] if every candidate was taken
    /// - [`EngineError::Storage`] if the oracle fails
    pub async fn generate<O: CodeOracle>(&self, oracle: &O) -> Result<TicketCode> {
        self.generate_within(oracle, self.max_attempts)
            .await
            .map(|(code, _)| code)
    }

    /// Like [`CodeGenerator::generate`] with an explicit budget, also
    /// returning how many candidates were drawn.
    ///
    /// Lets a caller share one budget between oracle checks and insert-time
    /// collisions.
    ///
    /// # Errors
    ///
    /// - [`EngineError::CodeGenerationExhausted`] after `budget` taken codes
    /// - [`EngineError::Storage`] if the oracle fails
    pub async fn generate_within<O: CodeOracle>(
        &self,
        oracle: &O,
        budget: u32,
    ) -> Result<(TicketCode, u32)> {
        for attempt in 1..=budget {
            let code = self.candidate();
            if !oracle.code_exists(&code).await? {
                return Ok((code, attempt));
            }
        }
        Err(EngineError::CodeGenerationExhausted { attempts: budget })
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            suffix_len: DEFAULT_SUFFIX_LEN,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}
