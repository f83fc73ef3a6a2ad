//! Deterministic catalog matching.
//!
//! A fixed rule cascade; the first rule that produces a single entry wins.
//! The tier and reason come from the rule, never from a score, so every
//! match can be explained to the reviewer who has to act on it.

use crate::error::{MediationError, Result};
use serde::{Deserialize, Serialize};
use stockgate_db::{CatalogEntry, CatalogItemId, ConfidenceTier};

// ============================================================================
// Query & Candidate
// ============================================================================

/// What the caller knows about the item it means.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchQuery {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
}

impl MatchQuery {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }
}

/// Outcome of one match. Never persisted directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCandidate {
    pub source_text: String,
    pub catalog_item_id: Option<CatalogItemId>,
    pub confidence_tier: ConfidenceTier,
    pub reason: String,
}

impl MatchCandidate {
    fn hit(query: &MatchQuery, entry: &CatalogEntry, tier: ConfidenceTier, reason: String) -> Self {
        Self {
            source_text: query.name.clone(),
            catalog_item_id: Some(entry.id.clone()),
            confidence_tier: tier,
            reason,
        }
    }

    fn manual(query: &MatchQuery, reason: impl Into<String>) -> Self {
        Self {
            source_text: query.name.clone(),
            catalog_item_id: None,
            confidence_tier: ConfidenceTier::Manual,
            reason: reason.into(),
        }
    }

    /// Matched at a tier that may drive an operation without review.
    pub fn is_actionable(&self) -> bool {
        self.catalog_item_id.is_some() && self.confidence_tier.is_actionable()
    }
}

// ============================================================================
// Cascade
// ============================================================================

fn norm(s: &str) -> String {
    s.trim().to_lowercase()
}

fn present(field: &Option<String>) -> Option<String> {
    field.as_deref().map(norm).filter(|s| !s.is_empty())
}

fn ambiguous(query: &MatchQuery, entries: &[&CatalogEntry]) -> MediationError {
    let mut candidates: Vec<String> = entries
        .iter()
        .map(|e| format!("{} ({})", e.name, e.id))
        .collect();
    candidates.sort();
    MediationError::AmbiguousCatalog {
        query: query.name.clone(),
        candidates,
    }
}

/// Match one query against a catalog snapshot.
///
/// Errors only with [`MediationError::AmbiguousCatalog`], when the catalog
/// itself holds duplicates (two entries with the same name or SKU).
pub fn match_item(query: &MatchQuery, catalog: &[CatalogEntry]) -> Result<MatchCandidate> {
    if catalog.is_empty() {
        return Ok(MatchCandidate::manual(query, "Catalog is empty"));
    }

    let name = norm(&query.name);
    let category = present(&query.category);
    let unit = present(&query.unit);

    // Rule 0: SKU
    if let Some(sku) = present(&query.sku) {
        let hits: Vec<&CatalogEntry> = catalog
            .iter()
            .filter(|e| e.sku.as_deref().map(norm).as_deref() == Some(sku.as_str()))
            .collect();
        match hits.as_slice() {
            [entry] => {
                return Ok(MatchCandidate::hit(
                    query,
                    entry,
                    ConfidenceTier::Exact,
                    format!("SKU '{}' matches '{}'", sku, entry.name),
                ))
            }
            [] => {}
            many => return Err(ambiguous(query, many)),
        }
    }

    let category_matches = |e: &CatalogEntry| category.as_deref() == Some(norm(&e.category).as_str());
    let unit_compatible = |e: &CatalogEntry| match unit.as_deref() {
        Some(u) => u == norm(&e.unit),
        None => true,
    };

    if !name.is_empty() {
        // Rule 1: exact name
        let exact: Vec<&CatalogEntry> = catalog.iter().filter(|e| norm(&e.name) == name).collect();
        match exact.as_slice() {
            [entry] => {
                return Ok(MatchCandidate::hit(
                    query,
                    entry,
                    ConfidenceTier::High,
                    format!("Exact name match '{}'", entry.name),
                ))
            }
            [] => {}
            many => return Err(ambiguous(query, many)),
        }

        // Rule 2: substring either way
        let fuzzy: Vec<&CatalogEntry> = catalog
            .iter()
            .filter(|e| {
                let entry_name = norm(&e.name);
                !entry_name.is_empty() && (entry_name.contains(&name) || name.contains(&entry_name))
            })
            .collect();

        if let [entry] = fuzzy.as_slice() {
            let (tier, detail) = match (category_matches(*entry), unit_compatible(*entry)) {
                (true, true) => (ConfidenceTier::High, "category and unit agree"),
                (true, false) => (ConfidenceTier::Medium, "category agrees, unit differs"),
                (false, _) => (ConfidenceTier::Low, "name only"),
            };
            return Ok(MatchCandidate::hit(
                query,
                entry,
                tier,
                format!("Partial name match '{}' ({})", entry.name, detail),
            ));
        }

        // Rule 3: narrow several partial matches by category
        if fuzzy.len() > 1 {
            if category.is_some() {
                let narrowed: Vec<&CatalogEntry> =
                    fuzzy.iter().copied().filter(|e| category_matches(*e)).collect();
                if let [entry] = narrowed.as_slice() {
                    return Ok(MatchCandidate::hit(
                        query,
                        entry,
                        ConfidenceTier::Medium,
                        format!(
                            "{} partial matches; category '{}' selects '{}'",
                            fuzzy.len(),
                            entry.category,
                            entry.name
                        ),
                    ));
                }
            }
            return Ok(MatchCandidate::manual(
                query,
                format!("{} partial name matches; needs a human pick", fuzzy.len()),
            ));
        }
    }

    // Rule 4: category fallback
    if category.is_some() {
        let in_category: Vec<&CatalogEntry> =
            catalog.iter().filter(|e| category_matches(*e)).collect();
        if let [entry] = in_category.as_slice() {
            return Ok(MatchCandidate::hit(
                query,
                entry,
                ConfidenceTier::Low,
                format!("Only catalog entry in category '{}'", entry.category),
            ));
        }
    }

    // Rule 5
    Ok(MatchCandidate::manual(query, "No catalog entry matches"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockgate_db::CompanyId;

    fn entry(id: &str, name: &str, category: &str, unit: &str) -> CatalogEntry {
        CatalogEntry {
            id: CatalogItemId::from_string(id),
            company_id: CompanyId::from_string("acme"),
            branch_id: None,
            name: name.to_string(),
            category: category.to_string(),
            unit: unit.to_string(),
            sku: None,
        }
    }

    fn breakers() -> Vec<CatalogEntry> {
        vec![
            entry("b20", "20A Breaker", "Breakers", "ea"),
            entry("b30", "30A Breaker", "Breakers", "ea"),
            entry("p1", "Main Panel", "Panels", "ea"),
        ]
    }

    #[test]
    fn test_partial_match_with_category_is_high() {
        let catalog = vec![entry("mc", "12/2 MC Cable", "Wire", "ft")];
        let query = MatchQuery::named("12/2 MC").with_category("Wire");

        let candidate = match_item(&query, &catalog).unwrap();
        assert_eq!(candidate.confidence_tier, ConfidenceTier::High);
        assert_eq!(candidate.catalog_item_id, Some(CatalogItemId::from_string("mc")));
        assert!(candidate.is_actionable());
    }

    #[test]
    fn test_partial_match_unit_mismatch_is_medium() {
        let catalog = vec![entry("mc", "12/2 MC Cable", "Wire", "ft")];
        let query = MatchQuery::named("12/2 MC").with_category("wire").with_unit("roll");
        let candidate = match_item(&query, &catalog).unwrap();
        assert_eq!(candidate.confidence_tier, ConfidenceTier::Medium);
    }

    #[test]
    fn test_partial_match_name_only_is_low() {
        let catalog = vec![entry("mc", "12/2 MC Cable", "Wire", "ft")];
        let candidate = match_item(&MatchQuery::named("mc cable"), &catalog).unwrap();
        assert_eq!(candidate.confidence_tier, ConfidenceTier::Low);
        assert!(!candidate.is_actionable());
    }

    #[test]
    fn test_several_partials_without_category_is_manual() {
        let candidate = match_item(&MatchQuery::named("breaker"), &breakers()).unwrap();
        assert_eq!(candidate.confidence_tier, ConfidenceTier::Manual);
        assert!(candidate.catalog_item_id.is_none());
    }

    #[test]
    fn test_category_narrows_partials() {
        let mut catalog = breakers();
        catalog.push(entry("pb", "Breaker Panel Cover", "Panels", "ea"));
        let query = MatchQuery::named("breaker").with_category("Panels");
        let candidate = match_item(&query, &catalog).unwrap();
        assert_eq!(candidate.confidence_tier, ConfidenceTier::Medium);
        assert_eq!(candidate.catalog_item_id, Some(CatalogItemId::from_string("pb")));
    }

    #[test]
    fn test_exact_name_is_high_and_case_insensitive() {
        let candidate = match_item(&MatchQuery::named("  20a breaker "), &breakers()).unwrap();
        assert_eq!(candidate.confidence_tier, ConfidenceTier::High);
        assert_eq!(candidate.catalog_item_id, Some(CatalogItemId::from_string("b20")));
    }

    #[test]
    fn test_duplicate_exact_names_are_ambiguous() {
        let catalog = vec![
            entry("a", "Wire Nut", "Connectors", "ea"),
            entry("b", "wire nut", "Connectors", "bag"),
        ];
        let err = match_item(&MatchQuery::named("Wire Nut"), &catalog).unwrap_err();
        assert!(matches!(err, MediationError::AmbiguousCatalog { .. }));
    }

    #[test]
    fn test_category_fallback_is_low() {
        let candidate = match_item(
            &MatchQuery::named("load center").with_category("Panels"),
            &breakers(),
        )
        .unwrap();
        assert_eq!(candidate.confidence_tier, ConfidenceTier::Low);
        assert_eq!(candidate.catalog_item_id, Some(CatalogItemId::from_string("p1")));
    }

    #[test]
    fn test_blank_name_skips_name_rules() {
        let candidate = match_item(&MatchQuery::named("   "), &breakers()).unwrap();
        assert_eq!(candidate.confidence_tier, ConfidenceTier::Manual);
    }

    #[test]
    fn test_empty_catalog_is_manual() {
        let candidate = match_item(&MatchQuery::named("anything"), &[]).unwrap();
        assert_eq!(candidate.confidence_tier, ConfidenceTier::Manual);
        assert!(candidate.catalog_item_id.is_none());
    }

    #[test]
    fn test_sku_is_exact() {
        let mut catalog = breakers();
        catalog[1].sku = Some("QO130".into());
        let query = MatchQuery::named("breaker").with_sku("qo130");
        let candidate = match_item(&query, &catalog).unwrap();
        assert_eq!(candidate.confidence_tier, ConfidenceTier::Exact);
        assert_eq!(candidate.catalog_item_id, Some(CatalogItemId::from_string("b30")));
    }

    #[test]
    fn test_result_ignores_catalog_order() {
        let query = MatchQuery::named("20A").with_category("Breakers");
        let forward = match_item(&query, &breakers()).unwrap();
        let mut reversed = breakers();
        reversed.reverse();
        assert_eq!(forward, match_item(&query, &reversed).unwrap());
        assert_eq!(forward, match_item(&query, &breakers()).unwrap());
    }
}
