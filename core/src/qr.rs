//! QR payload binding a scanned code to a ticket.
//!
//! The payload is the ticket's identifying snapshot serialized as JSON (fields
//! in declaration order) and encoded as unpadded base64url, so it survives
//! being embedded in a QR code or a URL. Producing or decoding a payload never
//! changes ticket state.

use crate::code::TicketCode;
use crate::error::{EngineError, Result};
use crate::money::Money;
use crate::ticket::Ticket;
use crate::types::{TournamentId, UserId};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content of a ticket QR code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrPayload {
    /// Public ticket code
    pub code: TicketCode,
    /// Tournament the ticket admits to
    pub tournament_id: TournamentId,
    /// Ticket holder
    pub holder_id: UserId,
    /// Price paid
    pub price: Money,
    /// Issuance time
    pub issued_at: DateTime<Utc>,
}

impl QrPayload {
    /// Encodes the payload for rendering.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] if serialization fails.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| EngineError::Storage(format!("QR payload serialization failed: {e}")))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decodes a scanned payload.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] if the input is not a payload
    /// produced by [`QrPayload::encode`].
    pub fn decode(encoded: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|e| EngineError::invalid("qr_payload", format!("not base64url: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| EngineError::invalid("qr_payload", format!("malformed payload: {e}")))
    }
}

impl Ticket {
    /// The QR payload for this ticket.
    #[must_use]
    pub fn qr_payload(&self) -> QrPayload {
        QrPayload {
            code: self.code().clone(),
            tournament_id: self.tournament(),
            holder_id: self.holder(),
            price: self.price(),
            issued_at: self.issued_at(),
        }
    }

    /// Whether a scanned payload was produced for this ticket.
    #[must_use]
    pub fn matches_qr(&self, payload: &QrPayload) -> bool {
        self.qr_payload() == *payload
    }
}
