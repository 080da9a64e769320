//! Identifier types shared by the tournament and ticket aggregates.
//!
//! Every identifier is an opaque UUID newtype. Category, game and user ids
//! reference data owned by external collaborators; the engine only records
//! them.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a tournament
    TournamentId
);

uuid_id!(
    /// Unique identifier for a ticket
    TicketId
);

uuid_id!(
    /// Opaque, already-authenticated identity of a holder or organizer
    UserId
);

uuid_id!(
    /// Reference to a category managed outside the engine
    CategoryId
);

uuid_id!(
    /// Reference to a game managed outside the engine
    GameId
);
