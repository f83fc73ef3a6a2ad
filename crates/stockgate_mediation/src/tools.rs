//! Tool declarations offered to the model.
//!
//! The registry only describes tools; dispatch lives in the orchestrator,
//! which decides per call whether it runs inline or becomes a proposal.

use crate::actions::*;
use crate::classifier::{operation_requirements, OperationClass};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// A function the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments object.
    pub parameters: Value,
}

fn item_schema() -> Value {
    json!({
        "type": "object",
        "description": "The catalog item as the user described it",
        "properties": {
            "itemId": {"type": "string", "description": "Catalog id, only if already known from a previous result"},
            "name": {"type": "string"},
            "category": {"type": "string"},
            "unit": {"type": "string"},
            "sku": {"type": "string"}
        },
        "required": ["name"]
    })
}

fn builtin_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: LOOKUP_STOCK.into(),
            description: "Look up the on-hand quantity and par level of one item.".into(),
            parameters: json!({
                "type": "object",
                "properties": {"item": item_schema()},
                "required": ["item"]
            }),
        },
        ToolDefinition {
            name: SEARCH_CATALOG.into(),
            description: "Search the catalog by name fragment.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1, "maximum": 50}
                },
                "required": ["query"]
            }),
        },
        ToolDefinition {
            name: LIST_LOW_STOCK.into(),
            description: "List items whose on-hand quantity is below par.".into(),
            parameters: json!({"type": "object", "properties": {}}),
        },
        ToolDefinition {
            name: ADJUST_STOCK.into(),
            description: "Propose adding (positive delta) or removing (negative delta) stock. \
                          Requires human confirmation."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "item": item_schema(),
                    "delta": {"type": "number"},
                    "reason": {"type": "string"}
                },
                "required": ["item", "delta"]
            }),
        },
        ToolDefinition {
            name: SET_PAR_LEVEL.into(),
            description: "Propose a new par level for an item. Requires human confirmation.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "item": item_schema(),
                    "parLevel": {"type": ["number", "null"], "minimum": 0}
                },
                "required": ["item", "parLevel"]
            }),
        },
        ToolDefinition {
            name: CREATE_PURCHASE_ORDER.into(),
            description: "Propose a purchase order. Requires human confirmation.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "vendor": {"type": "string"},
                    "lines": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "item": item_schema(),
                                "quantity": {"type": "number", "exclusiveMinimum": 0}
                            },
                            "required": ["item", "quantity"]
                        }
                    }
                },
                "required": ["lines"]
            }),
        },
    ]
}

/// Tools declared to the model, keyed by name.
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            tools: BTreeMap::new(),
        };
        for tool in builtin_tools() {
            registry.register(tool);
        }
        debug!("Registered {} tools", registry.tools.len());
        registry
    }

    fn register(&mut self, tool: ToolDefinition) {
        self.tools.insert(tool.name.clone(), tool);
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Names of the tools that never change data.
    pub fn read_only(&self) -> Vec<&str> {
        self.tools
            .keys()
            .map(String::as_str)
            .filter(|name| operation_requirements(name).0 == OperationClass::Read)
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lists_every_operation() {
        let registry = ToolRegistry::new();
        assert_eq!(registry.definitions().len(), 6);
        assert!(registry.contains(CREATE_PURCHASE_ORDER));
        assert!(!registry.contains("drop_table"));
        assert_eq!(
            registry.read_only(),
            vec![LIST_LOW_STOCK, LOOKUP_STOCK, SEARCH_CATALOG]
        );
    }
}
