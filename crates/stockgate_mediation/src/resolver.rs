//! Candidate resolution over a catalog snapshot.
//!
//! Used by both the chat path (tool-call item arguments) and the document
//! path (extracted BOM lines), so the two can never disagree on a match.

use crate::error::{MediationError, Result};
use crate::matcher::{match_item, MatchCandidate, MatchQuery};
use stockgate_db::{CatalogEntry, ExtractedLine};
use tracing::error;

/// Resolve each query independently. One ambiguous catalog fails the call.
pub fn resolve_many(queries: &[MatchQuery], catalog: &[CatalogEntry]) -> Result<Vec<MatchCandidate>> {
    queries
        .iter()
        .map(|query| {
            match_item(query, catalog).map_err(|err| {
                if let MediationError::AmbiguousCatalog { ref candidates, .. } = err {
                    error!(
                        query = %query.name,
                        candidates = ?candidates,
                        "Catalog holds indistinguishable entries"
                    );
                }
                err
            })
        })
        .collect()
}

impl From<&ExtractedLine> for MatchQuery {
    fn from(line: &ExtractedLine) -> Self {
        Self {
            name: line.name.clone(),
            category: line.category.clone(),
            unit: line.unit.clone(),
            sku: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockgate_db::{CatalogItemId, CompanyId, ConfidenceTier};

    fn entry(name: &str, category: &str) -> CatalogEntry {
        CatalogEntry {
            id: CatalogItemId::new(),
            company_id: CompanyId::from_string("acme"),
            branch_id: None,
            name: name.to_string(),
            category: category.to_string(),
            unit: "ea".to_string(),
            sku: None,
        }
    }

    #[test]
    fn test_queries_resolve_independently() {
        let catalog = vec![entry("4in Square Box", "Boxes"), entry("Mud Ring", "Boxes")];
        let queries = vec![
            MatchQuery::named("mud ring"),
            MatchQuery::named("widget"),
            MatchQuery::named("square box").with_category("Boxes"),
        ];

        let tiers: Vec<_> = resolve_many(&queries, &catalog)
            .unwrap()
            .into_iter()
            .map(|c| c.confidence_tier)
            .collect();
        assert_eq!(
            tiers,
            vec![ConfidenceTier::High, ConfidenceTier::Manual, ConfidenceTier::High]
        );
    }

    #[test]
    fn test_ambiguity_fails_whole_call() {
        let catalog = vec![entry("Mud Ring", "Boxes"), entry("Mud Ring", "Rings")];
        let queries = vec![MatchQuery::named("square box"), MatchQuery::named("mud ring")];
        let err = resolve_many(&queries, &catalog).unwrap_err();
        assert!(matches!(err, MediationError::AmbiguousCatalog { .. }));
    }

    #[test]
    fn test_extracted_line_query() {
        let line = ExtractedLine {
            name: "Mud Ring".into(),
            quantity: 3.0,
            unit: Some("ea".into()),
            category: Some("Boxes".into()),
        };
        let query = MatchQuery::from(&line);
        assert_eq!(query.category.as_deref(), Some("Boxes"));
        assert_eq!(query.unit.as_deref(), Some("ea"));
    }
}
