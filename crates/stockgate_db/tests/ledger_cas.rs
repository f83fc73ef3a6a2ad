//! Compare-and-swap behaviour of ledger rows against a real database file.
//!
//! Separate `StockDb` handles stand in for separate processes sharing the
//! same SQLite file.

use std::sync::Arc;

use stockgate_db::{
    ActionFilter, ActionStatus, CompanyId, ProposedAction, StockDb, Transition, UserId,
};
use tempfile::TempDir;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_confirms_only_one_wins() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("ledger.sqlite3");
    let company = CompanyId::from_string("acme");

    let seed = StockDb::open(&path).await.unwrap();
    let action = ProposedAction::new(company.clone(), None, "adjust_stock", "{}", None);
    seed.action_insert(&action).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let path = path.clone();
        let company = company.clone();
        let id = action.id.clone();
        handles.push(tokio::spawn(async move {
            let db = StockDb::open(&path).await.unwrap();
            let actor = UserId::from_string(format!("user-{}", i));
            db.action_transition(&company, &id, &Transition::confirm(Some(actor)))
                .await
                .unwrap()
        }));
    }

    let mut wins = 0;
    for handle in handles {
        if handle.await.unwrap() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);

    let stored = seed.action_get(&company, &action.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ActionStatus::Confirmed);
}

#[tokio::test]
async fn audit_rows_track_executed_actions_only() {
    let tmp = TempDir::new().unwrap();
    let db = Arc::new(StockDb::open(tmp.path().join("audit.sqlite3")).await.unwrap());
    let company = CompanyId::from_string("acme");

    let outcomes = [
        Some(Transition::executed(r#"{"n":1}"#)),
        Some(Transition::failed("executor exploded")),
        None,
    ];

    for outcome in outcomes {
        let action = ProposedAction::new(company.clone(), None, "set_par_level", "{}", None);
        db.action_insert(&action).await.unwrap();
        match outcome {
            Some(terminal) => {
                assert!(db
                    .action_transition(&company, &action.id, &Transition::confirm(None))
                    .await
                    .unwrap());
                assert!(db
                    .action_transition(&company, &action.id, &terminal)
                    .await
                    .unwrap());
            }
            None => {
                assert!(db
                    .action_transition(&company, &action.id, &Transition::cancel(None))
                    .await
                    .unwrap());
            }
        }
    }

    let all = db.action_list(&company, &ActionFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);
    for action in &all {
        let audit = db.audit_get(&company, &action.id).await.unwrap();
        assert_eq!(audit.is_some(), action.status == ActionStatus::Executed);
        assert_eq!(action.result_json.is_some(), action.status == ActionStatus::Executed);
        assert_eq!(action.error_message.is_some(), action.status == ActionStatus::Failed);
    }
}
