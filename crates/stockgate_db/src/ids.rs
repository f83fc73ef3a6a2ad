//! Identifier wrappers shared by every Stockgate crate.
//!
//! Record ids minted here are UUID v4 strings. Tenant and user ids arrive
//! from the session layer pre-validated and are wrapped as-is.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Error returned when parsing a UUID-backed identifier fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParseError {
    message: String,
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IdParseError {}

macro_rules! define_id {
    ($name:ident, $label:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a fresh random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Wrap an existing id without validation.
            pub fn from_string(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Parse a UUID-formatted id.
            pub fn parse(value: &str) -> Result<Self, IdParseError> {
                Uuid::parse_str(value.trim()).map_err(|e| IdParseError {
                    message: format!("Invalid {}: {}", $label, e),
                })?;
                Ok(Self(value.trim().to_string()))
            }

            pub fn as_str(&self) -> &str {
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

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(CompanyId, "company ID");
define_id!(BranchId, "branch ID");
define_id!(UserId, "user ID");
define_id!(ActionId, "action ID");
define_id!(ConversationId, "conversation ID");
define_id!(CatalogItemId, "catalog item ID");
define_id!(DraftId, "BOM draft ID");
define_id!(BomLineId, "BOM line ID");
define_id!(PurchaseOrderId, "purchase order ID");
