//! Caller identity as handed over by the session layer.
//!
//! Authentication happens upstream; by the time a [`RequestContext`] exists
//! the user, company and role are trusted.

use serde::{Deserialize, Serialize};
use std::fmt;
use stockgate_db::{BranchId, CompanyId, UserId};

/// A permission a role may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "inventory:read")]
    InventoryRead,
    #[serde(rename = "inventory:adjust")]
    InventoryAdjust,
    #[serde(rename = "inventory:manage")]
    InventoryManage,
    #[serde(rename = "orders:create")]
    OrdersCreate,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Self::InventoryRead,
        Self::InventoryAdjust,
        Self::InventoryManage,
        Self::OrdersCreate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InventoryRead => "inventory:read",
            Self::InventoryAdjust => "inventory:adjust",
            Self::InventoryManage => "inventory:manage",
            Self::OrdersCreate => "orders:create",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Manager,
    Technician,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Technician => "technician",
            Self::Viewer => "viewer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            "manager" => Some(Self::Manager),
            "technician" | "tech" => Some(Self::Technician),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        use Capability::*;
        match self {
            Self::Owner | Self::Admin | Self::Manager => {
                &[InventoryRead, InventoryAdjust, InventoryManage, OrdersCreate]
            }
            Self::Technician => &[InventoryRead, InventoryAdjust],
            Self::Viewer => &[InventoryRead],
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pre-validated `{userId, companyId, role}` plus the optional branch scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub user_id: UserId,
    pub company_id: CompanyId,
    pub role: Role,
    #[serde(default)]
    pub branch_id: Option<BranchId>,
}

impl RequestContext {
    pub fn new(user_id: UserId, company_id: CompanyId, role: Role) -> Self {
        Self {
            user_id,
            company_id,
            role,
            branch_id: None,
        }
    }

    pub fn with_branch(mut self, branch_id: BranchId) -> Self {
        self.branch_id = Some(branch_id);
        self
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        self.role.capabilities()
    }
}
