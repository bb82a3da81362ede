//! # Protocol Scenarios
//!
//! VRF checks, confirmation status, malformed records, multi-contract
//! interactions, cancellation and time budgets.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use shared_types::{ConfirmationStatus, InteractionRecord, Tag};
    use sw_03_state_evaluation::domain::interaction::derive_tx_id;
    use sw_03_state_evaluation::domain::tags::interaction_tags;
    use sw_03_state_evaluation::{
        cancellation_pair, EvalError, EvaluationOptions, ReadTarget, SmartWeaveContract,
    };

    use crate::fixtures::{sample_vrf, RejectingVrf, World};

    fn record(world: &World, seed: &str, tags: Vec<Tag>) -> InteractionRecord {
        InteractionRecord::new(derive_tx_id(seed.as_bytes()), "alice", world.ledger.mine_block(), tags)
    }

    fn add(contract: &str, amount: i64) -> Vec<Tag> {
        interaction_tags(contract, &json!({"function": "add", "amount": amount}), &[])
    }

    // =========================================================================
    // VRF
    // =========================================================================

    #[tokio::test]
    async fn test_vrf_rejection_aborts() {
        let world = World::new();
        let c = world.deploy(json!({"counter": 0}));
        world
            .ledger
            .push(record(&world, "vrf-tx", add(&c, 1)).with_vrf(sample_vrf()));

        let engine = world.engine_with_vrf(Arc::new(RejectingVrf));
        let err = engine.contract(&c).read_state(None).await.unwrap_err();
        assert!(matches!(err, EvalError::VrfVerificationFailed { .. }));
    }

    #[tokio::test]
    async fn test_vrf_accepted_without_verifier() {
        let world = World::new();
        let c = world.deploy(json!({"counter": 0}));
        world
            .ledger
            .push(record(&world, "vrf-tx", add(&c, 1)).with_vrf(sample_vrf()));

        let state = world
            .engine(EvaluationOptions::default())
            .contract(&c)
            .read_state(None)
            .await
            .unwrap();
        assert_eq!(state.cached_value.state["counter"], json!(1));
    }

    // =========================================================================
    // RECORD SHAPES
    // =========================================================================

    #[tokio::test]
    async fn test_unconfirmed_interaction_is_not_cached() {
        let world = World::new();
        let c = world.deploy(json!({"counter": 0}));
        world.ledger.interact("alice", &c, json!({"function": "add"}));
        world.ledger.push(
            record(&world, "pending-tx", add(&c, 1))
                .with_confirmation_status(ConfirmationStatus::NotProcessed),
        );

        let engine = world.engine(EvaluationOptions::default());
        let read = engine.contract(&c).read_state(None).await.unwrap();
        assert_eq!(read.cached_value.state["counter"], json!(2));

        let stored = engine.state_cache().get_last(&c).await.unwrap().unwrap();
        assert_eq!(stored.cached_value.state["counter"], json!(1));
        assert!(stored.sort_key < read.sort_key);
    }

    #[tokio::test]
    async fn test_interaction_without_input_is_skipped() {
        let world = World::new();
        let c = world.deploy(json!({"counter": 0}));
        let tags: Vec<Tag> = add(&c, 1)
            .into_iter()
            .filter(|t| t.name != "Input")
            .collect();
        world.ledger.push(record(&world, "no-input", tags));
        world.ledger.interact("alice", &c, json!({"function": "add"}));

        let state = world
            .engine(EvaluationOptions::default())
            .contract(&c)
            .read_state(None)
            .await
            .unwrap()
            .cached_value;
        assert_eq!(state.state["counter"], json!(1));
        assert_eq!(state.validity.len(), 1);
    }

    #[tokio::test]
    async fn test_multi_contract_interaction() {
        let world = World::new();
        let a = world.deploy(json!({"counter": 0}));
        let b = world.deploy(json!({"counter": 0}));
        let mut tags = add(&a, 2);
        tags.extend(
            add(&b, 5)
                .into_iter()
                .filter(|t| t.name == "Contract" || t.name == "Input"),
        );
        world.ledger.push(record(&world, "multi", tags));

        let engine = world.engine(EvaluationOptions::default());
        let a_state = engine.contract(&a).read_state(None).await.unwrap();
        let b_state = engine.contract(&b).read_state(None).await.unwrap();
        assert_eq!(a_state.cached_value.state["counter"], json!(2));
        assert_eq!(b_state.cached_value.state["counter"], json!(5));
    }

    // =========================================================================
    // CANCELLATION AND BUDGETS
    // =========================================================================

    #[tokio::test]
    async fn test_cancelled_read_leaves_cache_untouched() {
        let world = World::new();
        let c = world.deploy(json!({"counter": 0}));
        world.ledger.interact("alice", &c, json!({"function": "add"}));
        let engine = world.engine(EvaluationOptions::default());
        let contract = engine.contract(&c);

        let (handle, signal) = cancellation_pair();
        handle.cancel();
        let err = contract
            .read_state_with_cancellation(None, signal)
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::Cancelled));
        assert!(engine.state_cache().get_last(&c).await.unwrap().is_none());

        let state = contract.read_state(None).await.unwrap();
        assert_eq!(state.cached_value.state["counter"], json!(1));
    }

    #[tokio::test]
    async fn test_interaction_timeout() {
        let world = World::new();
        let c = world.deploy(json!({"counter": 0}));
        world.ledger.interact("alice", &c, json!({"function": "sleep", "ms": 1500}));

        let err = world
            .engine(EvaluationOptions {
                max_interaction_evaluation_time_seconds: 1,
                ..EvaluationOptions::default()
            })
            .contract(&c)
            .read_state(None)
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::InteractionTimeout { seconds: 1, .. }));
    }

    #[tokio::test]
    async fn test_dropped_read_releases_cache() {
        let world = World::new();
        let c = world.deploy(json!({"counter": 0}));
        world.ledger.interact("alice", &c, json!({"function": "add"}));
        let height = world.ledger.height();
        world.ledger.interact("alice", &c, json!({"function": "sleep", "ms": 2000}));

        let engine = world.engine(EvaluationOptions::default());
        let contract = engine.contract(&c);
        let abandoned = tokio::time::timeout(Duration::from_millis(100), contract.read_state(None)).await;
        assert!(abandoned.is_err());

        let state = tokio::time::timeout(
            Duration::from_secs(1),
            contract.read_state(Some(ReadTarget::BlockHeight(height))),
        )
        .await
        .expect("cache transaction released")
        .unwrap();
        assert_eq!(state.cached_value.state["counter"], json!(1));
    }
}
