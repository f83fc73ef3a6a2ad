//! READ / WRITE classification.
//!
//! Only operations known to be side-effect free are READ. Anything the
//! table below does not name is treated as a write needing
//! `inventory:manage`.

use crate::actions::*;
use crate::context::Capability;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationClass {
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Read,
    Write,
    Rejected { reason: String },
}

impl Classification {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::Rejected { .. } => "REJECTED",
        }
    }
}

/// Class and required capability of an action type.
pub fn operation_requirements(action_type: &str) -> (OperationClass, Capability) {
    match action_type {
        LOOKUP_STOCK | SEARCH_CATALOG | LIST_LOW_STOCK => {
            (OperationClass::Read, Capability::InventoryRead)
        }
        ADJUST_STOCK => (OperationClass::Write, Capability::InventoryAdjust),
        SET_PAR_LEVEL => (OperationClass::Write, Capability::InventoryManage),
        CREATE_PURCHASE_ORDER => (OperationClass::Write, Capability::OrdersCreate),
        _ => (OperationClass::Write, Capability::InventoryManage),
    }
}

pub fn classify(action_type: &str, capabilities: &[Capability]) -> Classification {
    let (class, required) = operation_requirements(action_type);
    if !capabilities.contains(&required) {
        return Classification::Rejected {
            reason: format!("'{}' requires the {} capability", action_type, required),
        };
    }
    match class {
        OperationClass::Read => Classification::Read,
        OperationClass::Write => Classification::Write,
    }
}
