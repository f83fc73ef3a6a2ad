//! Typed action payloads.
//!
//! The ledger stores arguments as opaque JSON; everything that needs to look
//! inside (resolution, executors) goes through [`ActionPayload`].

use crate::error::{MediationError, Result};
use crate::matcher::MatchQuery;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stockgate_db::CatalogItemId;

pub const LOOKUP_STOCK: &str = "lookup_stock";
pub const SEARCH_CATALOG: &str = "search_catalog";
pub const LIST_LOW_STOCK: &str = "list_low_stock";
pub const ADJUST_STOCK: &str = "adjust_stock";
pub const SET_PAR_LEVEL: &str = "set_par_level";
pub const CREATE_PURCHASE_ORDER: &str = "create_purchase_order";

/// A reference to a catalog item as the model or a document gives it.
///
/// `item_id` is filled in once resolution settles on an entry; executors
/// refuse references without one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<CatalogItemId>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
}

impl ItemRef {
    pub fn resolved(item_id: CatalogItemId, name: impl Into<String>) -> Self {
        Self {
            item_id: Some(item_id),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn to_query(&self) -> MatchQuery {
        MatchQuery {
            name: self.name.clone(),
            category: self.category.clone(),
            unit: self.unit.clone(),
            sku: self.sku.clone(),
        }
    }

    pub fn require_id(&self) -> Result<&CatalogItemId> {
        self.item_id.as_ref().ok_or_else(|| {
            MediationError::execution(format!("item '{}' was never resolved to a catalog id", self.name))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupStockArgs {
    pub item: ItemRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCatalogArgs {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListLowStockArgs {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustStockArgs {
    pub item: ItemRef,
    /// Signed change to the on-hand quantity.
    pub delta: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetParLevelArgs {
    pub item: ItemRef,
    /// `None` clears the par level.
    pub par_level: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineArgs {
    pub item: ItemRef,
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePurchaseOrderArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    pub lines: Vec<OrderLineArgs>,
}

/// Every operation the pipeline knows, plus a carrier for the rest.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionPayload {
    LookupStock(LookupStockArgs),
    SearchCatalog(SearchCatalogArgs),
    ListLowStock(ListLowStockArgs),
    AdjustStock(AdjustStockArgs),
    SetParLevel(SetParLevelArgs),
    CreatePurchaseOrder(CreatePurchaseOrderArgs),
    Unknown { action_type: String, raw: Value },
}

fn decode<T: serde::de::DeserializeOwned>(action_type: &str, args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| {
        MediationError::validation(format!("bad arguments for {}: {}", action_type, e))
    })
}

impl ActionPayload {
    /// Decode arguments for a known action type. Unknown types are kept
    /// verbatim.
    pub fn parse(action_type: &str, args: Value) -> Result<Self> {
        let payload = match action_type {
            LOOKUP_STOCK => Self::LookupStock(decode(action_type, args)?),
            SEARCH_CATALOG => Self::SearchCatalog(decode(action_type, args)?),
            LIST_LOW_STOCK => {
                let args = if args.is_null() { Value::Object(Default::default()) } else { args };
                Self::ListLowStock(decode(action_type, args)?)
            }
            ADJUST_STOCK => Self::AdjustStock(decode(action_type, args)?),
            SET_PAR_LEVEL => Self::SetParLevel(decode(action_type, args)?),
            CREATE_PURCHASE_ORDER => Self::CreatePurchaseOrder(decode(action_type, args)?),
            other => Self::Unknown {
                action_type: other.to_string(),
                raw: args,
            },
        };
        Ok(payload)
    }

    /// Parse a stored `argumentsJson` string.
    pub fn from_json_str(action_type: &str, arguments_json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(arguments_json)?;
        Self::parse(action_type, value)
    }

    pub fn action_type(&self) -> &str {
        match self {
            Self::LookupStock(_) => LOOKUP_STOCK,
            Self::SearchCatalog(_) => SEARCH_CATALOG,
            Self::ListLowStock(_) => LIST_LOW_STOCK,
            Self::AdjustStock(_) => ADJUST_STOCK,
            Self::SetParLevel(_) => SET_PAR_LEVEL,
            Self::CreatePurchaseOrder(_) => CREATE_PURCHASE_ORDER,
            Self::Unknown { action_type, .. } => action_type,
        }
    }

    pub fn arguments(&self) -> Result<Value> {
        let value = match self {
            Self::LookupStock(args) => serde_json::to_value(args)?,
            Self::SearchCatalog(args) => serde_json::to_value(args)?,
            Self::ListLowStock(args) => serde_json::to_value(args)?,
            Self::AdjustStock(args) => serde_json::to_value(args)?,
            Self::SetParLevel(args) => serde_json::to_value(args)?,
            Self::CreatePurchaseOrder(args) => serde_json::to_value(args)?,
            Self::Unknown { raw, .. } => raw.clone(),
        };
        Ok(value)
    }

    pub fn arguments_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.arguments()?)?)
    }

    /// Item references that must resolve before the payload may run.
    pub fn item_refs_mut(&mut self) -> Vec<&mut ItemRef> {
        match self {
            Self::LookupStock(args) => vec![&mut args.item],
            Self::AdjustStock(args) => vec![&mut args.item],
            Self::SetParLevel(args) => vec![&mut args.item],
            Self::CreatePurchaseOrder(args) => args.lines.iter_mut().map(|l| &mut l.item).collect(),
            Self::SearchCatalog(_) | Self::ListLowStock(_) | Self::Unknown { .. } => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_type_decodes() {
        let payload = ActionPayload::parse(
            ADJUST_STOCK,
            json!({"item": {"name": "20A Breaker"}, "delta": -3, "reason": "used on job"}),
        )
        .unwrap();
        match payload {
            ActionPayload::AdjustStock(ref args) => {
                assert_eq!(args.delta, -3.0);
                assert!(args.item.item_id.is_none());
            }
            ref other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(payload.action_type(), ADJUST_STOCK);
    }

    #[test]
    fn test_unknown_type_is_preserved() {
        let raw = json!({"whatever": [1, 2]});
        let payload = ActionPayload::parse("transfer_stock", raw.clone()).unwrap();
        assert_eq!(payload.action_type(), "transfer_stock");
        assert_eq!(payload.arguments().unwrap(), raw);
    }

    #[test]
    fn test_bad_arguments_rejected() {
        let err = ActionPayload::parse(SET_PAR_LEVEL, json!({"parLevel": 4})).unwrap_err();
        assert!(matches!(err, MediationError::Validation(_)));
    }

    #[test]
    fn test_item_refs_cover_order_lines() {
        let mut payload = ActionPayload::parse(
            CREATE_PURCHASE_ORDER,
            json!({"lines": [
                {"item": {"name": "a"}, "quantity": 1},
                {"item": {"name": "b"}, "quantity": 2}
            ]}),
        )
        .unwrap();
        for item in payload.item_refs_mut() {
            item.item_id = Some(CatalogItemId::from_string(format!("id-{}", item.name)));
        }
        let json = payload.arguments().unwrap();
        assert_eq!(json["lines"][1]["item"]["itemId"], "id-b");
    }
}
