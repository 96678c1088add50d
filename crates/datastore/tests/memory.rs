use std::sync::Arc;

use datastore::{
    Classification, DatasetStore, HistoryStore, InMemoryDatasetStore, InMemoryHistoryStore, NewDataset, NewTurn,
    StoreError, TenantId,
};
use insights::FieldRoles;
use serde_json::json;
use tabular::{Row, Table};
use uuid::Uuid;

fn row(v: serde_json::Value) -> Row {
    v.as_object().cloned().unwrap()
}

fn new_dataset(name: &str) -> NewDataset {
    let table = Table::from_records(vec![
        row(json!({"sale_date": "2024-01-01", "customer_id": "c1", "amount": "10"})),
        row(json!({"sale_date": "2024-01-02", "customer_id": "c2", "amount": "20"})),
    ]);
    NewDataset {
        name: name.into(),
        description: None,
        file_name: format!("{name}.csv"),
        file_path: None,
        file_size: 64,
        content_type: Some("text/csv".into()),
        content_hash: "00".into(),
        field_roles: FieldRoles::resolve(&table),
        table,
    }
}

fn turn(n: usize) -> NewTurn {
    NewTurn {
        message: format!("question {n}"),
        response: format!("answer {n}"),
        classification: Classification::General,
        payload: None,
    }
}

async fn active_count(store: &InMemoryDatasetStore, tenant: TenantId) -> usize {
    store.list(tenant).await.unwrap().iter().filter(|m| m.active).count()
}

#[tokio::test]
async fn saved_dataset_keeps_column_order_and_rows() {
    let store = InMemoryDatasetStore::new();
    let tenant = Uuid::new_v4();
    let saved = store.save(tenant, new_dataset("sales")).await.unwrap();
    assert!(!saved.metadata.active);

    let got = store.get(tenant, saved.metadata.id).await.unwrap();
    assert_eq!(got.table.columns(), ["sale_date", "customer_id", "amount"]);
    assert_eq!(got.metadata.row_count, 2);
    assert_eq!(got.table.row_count(), 2);
}

#[tokio::test]
async fn activation_is_exclusive_and_latest_wins() {
    let store = InMemoryDatasetStore::new();
    let tenant = Uuid::new_v4();
    let a = store.save(tenant, new_dataset("a")).await.unwrap().metadata.id;
    let b = store.save(tenant, new_dataset("b")).await.unwrap().metadata.id;

    assert!(store.get_active(tenant).await.unwrap().is_none());

    store.activate(tenant, a).await.unwrap();
    store.activate(tenant, b).await.unwrap();
    assert_eq!(active_count(&store, tenant).await, 1);
    assert_eq!(store.get_active(tenant).await.unwrap().unwrap().metadata.id, b);

    // Re-activating the active one is a no-op on the invariant.
    store.activate(tenant, b).await.unwrap();
    assert_eq!(active_count(&store, tenant).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_activations_leave_one_active() {
    let store = Arc::new(InMemoryDatasetStore::new());
    let tenant = Uuid::new_v4();
    let mut ids = Vec::new();
    for i in 0..4 {
        ids.push(store.save(tenant, new_dataset(&format!("d{i}"))).await.unwrap().metadata.id);
    }

    for _ in 0..50 {
        let handles: Vec<_> = ids
            .iter()
            .map(|&id| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.activate(tenant, id).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(active_count(&store, tenant).await, 1);
    }
}

#[tokio::test]
async fn other_tenants_see_nothing() {
    let store = InMemoryDatasetStore::new();
    let owner = Uuid::new_v4();
    let intruder = Uuid::new_v4();
    let id = store.save(owner, new_dataset("private")).await.unwrap().metadata.id;

    assert!(matches!(store.get(intruder, id).await, Err(StoreError::NotFound)));
    assert!(matches!(store.activate(intruder, id).await, Err(StoreError::NotFound)));
    assert!(matches!(store.delete(intruder, id).await, Err(StoreError::NotFound)));
    assert!(store.list(intruder).await.unwrap().is_empty());
    assert_eq!(store.list(owner).await.unwrap().len(), 1);
}

#[tokio::test]
async fn deleting_the_active_dataset_clears_active() {
    let store = InMemoryDatasetStore::new();
    let tenant = Uuid::new_v4();
    let id = store.save(tenant, new_dataset("a")).await.unwrap().metadata.id;
    store.activate(tenant, id).await.unwrap();

    let removed = store.delete(tenant, id).await.unwrap();
    assert!(removed.active);
    assert!(store.get_active(tenant).await.unwrap().is_none());
    assert!(matches!(store.get(tenant, id).await, Err(StoreError::NotFound)));
}

#[tokio::test]
async fn favorite_toggles_and_patch_renames() {
    let store = InMemoryDatasetStore::new();
    let tenant = Uuid::new_v4();
    let id = store.save(tenant, new_dataset("a")).await.unwrap().metadata.id;

    assert!(store.toggle_favorite(tenant, id).await.unwrap().is_favorite);
    assert!(!store.toggle_favorite(tenant, id).await.unwrap().is_favorite);

    let patch = datastore::DatasetPatch {
        name: Some("renamed".into()),
        description: Some("q1 numbers".into()),
    };
    let meta = store.update(tenant, id, patch).await.unwrap();
    assert_eq!(meta.name, "renamed");
    assert_eq!(meta.description.as_deref(), Some("q1 numbers"));
}

#[tokio::test]
async fn recent_returns_latest_turns_oldest_first() {
    let store = InMemoryHistoryStore::new();
    let tenant = Uuid::new_v4();
    for n in 1..=5 {
        store.append(tenant, turn(n)).await.unwrap();
    }

    let recent: Vec<_> = store
        .recent(tenant, 3)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.message)
        .collect();
    assert_eq!(recent, ["question 3", "question 4", "question 5"]);

    let listed = store.list(tenant, 2).await.unwrap();
    assert_eq!(listed[0].message, "question 5");
    assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn search_matches_either_side_case_insensitively() {
    let store = InMemoryHistoryStore::new();
    let tenant = Uuid::new_v4();
    store
        .append(
            tenant,
            NewTurn {
                message: "What was REVENUE last month?".into(),
                response: "Total revenue was $30.00".into(),
                classification: Classification::Analytics,
                payload: None,
            },
        )
        .await
        .unwrap();
    store.append(tenant, turn(1)).await.unwrap();

    assert_eq!(store.search(tenant, "revenue", 20).await.unwrap().len(), 1);
    assert_eq!(store.search(tenant, "ANSWER", 20).await.unwrap().len(), 1);
    assert!(store.search(tenant, "churn", 20).await.unwrap().is_empty());
}

#[tokio::test]
async fn clear_only_touches_one_tenant() {
    let store = InMemoryHistoryStore::new();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    store.append(a, turn(1)).await.unwrap();
    store.append(a, turn(2)).await.unwrap();
    store.append(b, turn(3)).await.unwrap();

    assert_eq!(store.clear(a).await.unwrap(), 2);
    assert!(store.list(a, 10).await.unwrap().is_empty());
    assert_eq!(store.list(b, 10).await.unwrap().len(), 1);
}
