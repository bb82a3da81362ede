//! # KV Storage Scenarios
//!
//! Per-contract key-value storage written from handlers.

#[cfg(test)]
mod tests {
    use serde_json::json;
    use sw_03_state_evaluation::{EvaluationOptions, SmartWeaveContract};

    use crate::fixtures::World;

    #[tokio::test]
    async fn test_put_then_get() {
        let world = World::new();
        let c = world.deploy(json!({}));
        world.ledger.interact("alice", &c, json!({"function": "putKv", "key": "a", "value": 5}));
        world.ledger.interact("alice", &c, json!({"function": "getKv", "key": "a"}));

        let engine = world.engine(EvaluationOptions::default());
        let state = engine.contract(&c).read_state(None).await.unwrap().cached_value;
        assert_eq!(state.state["kv"], json!(5));

        let stored = engine.kv_storage(&c).get_last("a").await.unwrap().unwrap();
        assert_eq!(stored.cached_value, json!(5));
    }

    #[tokio::test]
    async fn test_failed_interaction_discards_kv_writes() {
        let world = World::new();
        let c = world.deploy(json!({}));
        let tx = world
            .ledger
            .interact("alice", &c, json!({"function": "putKvThenFail", "key": "a", "value": 1}));
        world.ledger.interact("alice", &c, json!({"function": "getKv", "key": "a"}));

        let engine = world.engine(EvaluationOptions::default());
        let state = engine.contract(&c).read_state(None).await.unwrap().cached_value;
        assert_eq!(state.validity_of(&tx), Some(false));
        assert_eq!(state.state["kv"], json!(null));
        assert!(engine.kv_storage(&c).get_last("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_leaves_tombstone() {
        let world = World::new();
        let c = world.deploy(json!({}));
        world.ledger.interact("alice", &c, json!({"function": "putKv", "key": "a", "value": 5}));
        world.ledger.interact("alice", &c, json!({"function": "delKv", "key": "a"}));
        world.ledger.interact("alice", &c, json!({"function": "getKv", "key": "a"}));

        let engine = world.engine(EvaluationOptions::default());
        let state = engine.contract(&c).read_state(None).await.unwrap().cached_value;
        assert_eq!(state.state["kv"], json!(null));

        let storage = engine.kv_storage(&c);
        assert!(storage.get_last("a").await.unwrap().is_none());
        let versions = storage.dump().await.unwrap();
        assert_eq!(versions.len(), 2);
        assert!(versions.iter().any(|(key, value)| key.key == "a" && value.is_none()));
    }

    #[tokio::test]
    async fn test_list_keys_sees_earlier_writes() {
        let world = World::new();
        let c = world.deploy(json!({}));
        world.ledger.interact("alice", &c, json!({"function": "putKv", "key": "b", "value": 2}));
        world.ledger.interact("alice", &c, json!({"function": "putKv", "key": "a", "value": 1}));
        world.ledger.interact("alice", &c, json!({"function": "listKv"}));

        let state = world
            .engine(EvaluationOptions::default())
            .contract(&c)
            .read_state(None)
            .await
            .unwrap()
            .cached_value;
        assert_eq!(state.state["keys"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_dry_write_does_not_persist_kv() {
        let world = World::new();
        let c = world.deploy(json!({}));
        let engine = world.engine(EvaluationOptions::default());
        let contract = engine.contract(&c);

        let result = contract
            .dry_write(&json!({"function": "putKv", "key": "a", "value": 1}), None)
            .await
            .unwrap();
        assert!(result.is_ok());
        assert!(engine.kv_storage(&c).get_last("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_view_reads_kv() {
        let world = World::new();
        let c = world.deploy(json!({}));
        world.ledger.interact("alice", &c, json!({"function": "putKv", "key": "a", "value": 7}));
        let engine = world.engine(EvaluationOptions::default());

        let result = engine
            .contract(&c)
            .view_state(&json!({"function": "getKv", "key": "a"}))
            .await
            .unwrap();
        assert_eq!(result.state["kv"], json!(7));
    }
}
