//! End-to-end behaviour of matching, classification and the ledger on a
//! real SQLite file.

mod common;

use common::*;
use serde_json::json;
use std::sync::Arc;
use stockgate_db::{ActionFilter, ActionStatus, ConfidenceTier};
use stockgate_mediation::actions::{ADJUST_STOCK, CREATE_PURCHASE_ORDER};
use stockgate_mediation::{
    classify, match_item, Classification, MatchQuery, MediationError, Role,
};

#[tokio::test]
async fn wire_with_category_matches_high() {
    let fixture = Fixture::new().await;
    let catalog = fixture.seed_catalog().await;
    let cable = catalog.iter().find(|e| e.name == "12/2 MC Cable").unwrap();

    let candidate = match_item(&MatchQuery::named("12/2 MC").with_category("Wire"), &catalog).unwrap();

    assert_eq!(candidate.confidence_tier, ConfidenceTier::High);
    assert_eq!(candidate.catalog_item_id.as_ref(), Some(&cable.id));
    assert!(candidate.is_actionable());
}

#[tokio::test]
async fn bare_breaker_needs_manual_choice() {
    let fixture = Fixture::new().await;
    let catalog = fixture.seed_catalog().await;

    let candidate = match_item(&MatchQuery::named("breaker"), &catalog).unwrap();

    assert_eq!(candidate.confidence_tier, ConfidenceTier::Manual);
    assert!(candidate.catalog_item_id.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_distinct_confirms_all_execute() {
    const N: usize = 10;
    let fixture = Fixture::new().await;
    fixture.seed_catalog().await;
    let cable = fixture.item_id("12/2 MC Cable").await;
    let manager = ctx(Role::Manager);
    let proposer = fixture.ledger.proposer();

    let mut ids = Vec::new();
    for _ in 0..N {
        let action = proposer
            .propose(
                &manager.company_id,
                None,
                ADJUST_STOCK,
                &json!({"item": {"itemId": cable, "name": "12/2 MC Cable"}, "delta": -1})
                    .to_string(),
                Some(&manager.user_id),
            )
            .await
            .unwrap();
        ids.push(action.id);
    }

    let service = Arc::new(fixture.confirmations());
    let mut handles = Vec::new();
    for id in ids.clone() {
        let service = service.clone();
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            service.confirm_action(&manager, &id, true).await
        }));
    }
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert!(result.success, "execution failed: {:?}", result.error);
    }

    for id in &ids {
        let stored = fixture.ledger.get(&manager.company_id, id).await.unwrap();
        assert_eq!(stored.status, ActionStatus::Executed);
    }

    let level = fixture
        .db()
        .stock_get(&manager.company_id, &cable)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(level.quantity_on_hand, 500.0 - N as f64);

    let audit = fixture.ledger.list_audit(&manager.company_id, None).await.unwrap();
    assert_eq!(audit.len(), N);
}

#[tokio::test]
async fn concurrent_confirms_execute_once() {
    let fixture = Fixture::new().await;
    fixture.seed_catalog().await;
    let breaker = fixture.item_id("20A Breaker").await;
    let manager = ctx(Role::Manager);

    let action = fixture
        .ledger
        .proposer()
        .propose(
            &manager.company_id,
            None,
            ADJUST_STOCK,
            &json!({"item": {"itemId": breaker, "name": "20A Breaker"}, "delta": -2}).to_string(),
            Some(&manager.user_id),
        )
        .await
        .unwrap();

    let service = Arc::new(fixture.confirmations());
    let mut handles = Vec::new();
    for _ in 0..2 {
        let service = service.clone();
        let manager = manager.clone();
        let id = action.id.clone();
        handles.push(tokio::spawn(async move {
            service.confirm_action(&manager, &id, true).await
        }));
    }

    let mut successes = 0;
    let mut lost = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(result) => {
                assert!(result.success);
                successes += 1;
            }
            Err(MediationError::InvalidTransition { .. }) => lost += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert_eq!((successes, lost), (1, 1));

    let stored = fixture.ledger.get(&manager.company_id, &action.id).await.unwrap();
    assert_eq!(stored.status, ActionStatus::Executed);

    // The executor ran once: 12 - 2.
    let level = fixture
        .db()
        .stock_get(&manager.company_id, &breaker)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(level.quantity_on_hand, 10.0);

    let audit = fixture.ledger.list_audit(&manager.company_id, None).await.unwrap();
    assert_eq!(audit.len(), 1);
}

#[tokio::test]
async fn cancel_twice_is_idempotent() {
    let fixture = Fixture::new().await;
    let tech = ctx(Role::Technician);

    let action = fixture
        .ledger
        .propose(&tech.company_id, None, ADJUST_STOCK, "{}", Some(&tech.user_id))
        .await
        .unwrap();

    let service = fixture.confirmations();
    let first = service.confirm_action(&tech, &action.id, false).await.unwrap();
    let second = service.confirm_action(&tech, &action.id, false).await.unwrap();

    assert!(first.success && second.success);
    assert_eq!(first.action.status, ActionStatus::Cancelled);
    assert_eq!(second.action.status, ActionStatus::Cancelled);
    assert_eq!(first.action.cancelled_at, second.action.cancelled_at);
    assert!(fixture
        .ledger
        .list_audit(&tech.company_id, None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn write_without_capability_is_rejected_and_leaves_no_row() {
    let fixture = Fixture::new().await;
    fixture.seed_catalog().await;
    let tech = ctx(Role::Technician);

    assert!(matches!(
        classify(CREATE_PURCHASE_ORDER, tech.capabilities()),
        Classification::Rejected { .. }
    ));

    let model = ScriptedModel::new(vec![
        calls(&[(
            "call_1",
            CREATE_PURCHASE_ORDER,
            r#"{"lines": [{"item": {"name": "20A Breaker"}, "quantity": 10}]}"#,
        )]),
        text("You don't have permission to create purchase orders."),
    ]);
    let response = fixture
        .orchestrator(model)
        .chat(
            &tech,
            stockgate_mediation::ChatRequest {
                message: "order ten 20A breakers".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(response.proposed_actions.is_empty());
    assert!(!response.requires_confirmation);
    let rows = fixture
        .ledger
        .list(&tech.company_id, &ActionFilter::default())
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn failed_execution_is_recorded_not_thrown() {
    let fixture = Fixture::new().await;
    fixture.seed_catalog().await;
    let panel = fixture.item_id("200A Main Panel").await;
    let owner = ctx(Role::Owner);

    // Only 2 on hand.
    let action = fixture
        .ledger
        .propose(
            &owner.company_id,
            None,
            ADJUST_STOCK,
            &json!({"item": {"itemId": panel, "name": "200A Main Panel"}, "delta": -5}).to_string(),
            Some(&owner.user_id),
        )
        .await
        .unwrap();

    let result = fixture
        .confirmations()
        .confirm_action(&owner, &action.id, true)
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.error.is_some());
    assert_eq!(result.action.status, ActionStatus::Failed);
    assert!(result.action.executed_at.is_none());
    assert!(fixture
        .ledger
        .list_audit(&owner.company_id, None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn confirming_needs_the_action_capability() {
    let fixture = Fixture::new().await;
    let manager = ctx(Role::Manager);
    let viewer = ctx(Role::Viewer);

    let action = fixture
        .ledger
        .propose(&manager.company_id, None, ADJUST_STOCK, "{}", Some(&manager.user_id))
        .await
        .unwrap();

    let err = fixture
        .confirmations()
        .confirm_action(&viewer, &action.id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, MediationError::Authorization(_)));

    let stored = fixture.ledger.get(&manager.company_id, &action.id).await.unwrap();
    assert_eq!(stored.status, ActionStatus::Proposed);
}

#[tokio::test]
async fn unknown_action_type_ends_failed() {
    let fixture = Fixture::new().await;
    let owner = ctx(Role::Owner);

    let action = fixture
        .ledger
        .propose(&owner.company_id, None, "transfer_stock", "{}", Some(&owner.user_id))
        .await
        .unwrap();

    let result = fixture
        .confirmations()
        .confirm_action(&owner, &action.id, true)
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.action.status, ActionStatus::Failed);
    assert!(result.error.unwrap().contains("no executor registered"));
}

#[tokio::test]
async fn purchase_order_links_back_to_action() {
    let fixture = Fixture::new().await;
    fixture.seed_catalog().await;
    let breaker = fixture.item_id("30A Breaker").await;
    let manager = ctx(Role::Manager);

    let action = fixture
        .ledger
        .propose(
            &manager.company_id,
            None,
            CREATE_PURCHASE_ORDER,
            &json!({
                "vendor": "City Electric Supply",
                "lines": [{"item": {"itemId": breaker, "name": "30A Breaker"}, "quantity": 6}]
            })
            .to_string(),
            Some(&manager.user_id),
        )
        .await
        .unwrap();

    let result = fixture
        .confirmations()
        .confirm_action(&manager, &action.id, true)
        .await
        .unwrap();
    assert!(result.success);

    let order_id = result.result.unwrap()["purchaseOrderId"]
        .as_str()
        .unwrap()
        .to_string();
    let order = fixture
        .db()
        .purchase_order_get(
            &manager.company_id,
            &stockgate_db::PurchaseOrderId::from_string(order_id),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.source_action_id.as_ref(), Some(&action.id));
    assert_eq!(order.lines.len(), 1);
}
