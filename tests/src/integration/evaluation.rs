//! # Evaluation Scenarios
//!
//! Folding, caching and speculative runs of a single contract.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;
    use sw_01_sort_key::genesis_sort_key;
    use sw_03_state_evaluation::{
        EvalError, EvaluationOptions, ReadTarget, ResultKind, SmartWeaveContract,
    };
    use sw_telemetry::{encode_metrics, register_metrics};

    use crate::fixtures::{src_v1, World, OWNER};

    // =========================================================================
    // FOLDING
    // =========================================================================

    #[tokio::test]
    async fn test_failed_interactions_are_recorded_not_applied() {
        let world = World::new();
        let c = world.deploy(json!({"counter": 0}));
        let ok = world.ledger.interact("alice", &c, json!({"function": "add", "amount": 2}));
        let rejected = world.ledger.interact("alice", &c, json!({"function": "fail"}));
        let thrown = world.ledger.interact("alice", &c, json!({"function": "throw"}));
        let unknown = world.ledger.interact("alice", &c, json!({"function": "burn"}));
        world.ledger.interact("alice", &c, json!({"function": "add", "amount": 3}));

        let engine = world.engine(EvaluationOptions::default());
        let result = engine.contract(&c).read_state(None).await.unwrap().cached_value;

        assert_eq!(result.state["counter"], json!(5));
        assert_eq!(result.validity.len(), 5);
        assert_eq!(result.validity_of(&ok), Some(true));
        assert_eq!(result.validity_of(&rejected), Some(false));
        assert_eq!(result.error_messages[&rejected], "fail requested");
        assert_eq!(result.error_messages[&thrown], "boom");
        assert!(result.error_messages[&unknown].starts_with("Invalid input"));
    }

    #[tokio::test]
    async fn test_exception_aborts_when_not_ignored() {
        let world = World::new();
        let c = world.deploy(json!({"counter": 0}));
        world.ledger.interact("alice", &c, json!({"function": "add"}));
        world.ledger.interact("alice", &c, json!({"function": "throw"}));

        let engine = world.engine(EvaluationOptions {
            ignore_exceptions: false,
            ..EvaluationOptions::default()
        });
        let err = engine.contract(&c).read_state(None).await.unwrap_err();
        assert!(matches!(err, EvalError::RuntimeException { ref message, .. } if message == "boom"));
        assert!(engine.state_cache().get_last(&c).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_genesis_state() {
        let world = World::new();
        let c = world.deploy(json!({"counter": 9}));
        let result = world
            .engine(EvaluationOptions::default())
            .contract(&c)
            .read_state(None)
            .await
            .unwrap();
        assert_eq!(result.sort_key, genesis_sort_key());
        assert_eq!(result.cached_value.state, json!({"counter": 9}));
    }

    #[tokio::test]
    async fn test_unknown_contract() {
        let world = World::new();
        let err = world
            .engine(EvaluationOptions::default())
            .contract("missing")
            .read_state(None)
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::ContractNotFound(ref id) if id == "missing"));
    }

    // =========================================================================
    // CACHING
    // =========================================================================

    #[tokio::test]
    async fn test_idempotent_reread_skips_handler() {
        let world = World::new();
        let c = world.deploy(json!({"counter": 0}));
        for _ in 0..3 {
            world.ledger.interact("alice", &c, json!({"function": "add"}));
        }
        let engine = world.engine(EvaluationOptions::default());
        let contract = engine.contract(&c);

        let first = contract.read_state(None).await.unwrap();
        let calls = world.v1.calls();
        let second = contract
            .read_state(Some(ReadTarget::SortKey(first.sort_key.clone())))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(world.v1.calls(), calls);
    }

    #[tokio::test]
    async fn test_read_at_block_height() {
        let world = World::new();
        let c = world.deploy(json!({"counter": 0}));
        world.ledger.interact("alice", &c, json!({"function": "add", "amount": 1}));
        let height = world.ledger.height();
        world.ledger.interact("alice", &c, json!({"function": "add", "amount": 10}));

        let engine = world.engine(EvaluationOptions::default());
        let contract = engine.contract(&c);
        let latest = contract.read_state(None).await.unwrap();
        let earlier = contract
            .read_state(Some(ReadTarget::BlockHeight(height)))
            .await
            .unwrap();

        assert_eq!(latest.cached_value.state["counter"], json!(11));
        assert_eq!(earlier.cached_value.state["counter"], json!(1));
        assert_eq!(earlier.sort_key.block_height(), Some(height));
    }

    #[tokio::test]
    async fn test_incremental_read_matches_cold_read() {
        let world = World::new();
        let c = world.deploy(json!({"counter": 0}));
        world.ledger.interact("alice", &c, json!({"function": "add", "amount": 4}));
        world.ledger.interact("alice", &c, json!({"function": "fail"}));

        let warm = world.engine(EvaluationOptions::default());
        warm.contract(&c).read_state(None).await.unwrap();
        world.ledger.interact("alice", &c, json!({"function": "add", "amount": 6}));
        let incremental = warm.contract(&c).read_state(None).await.unwrap();

        let cold = world
            .engine(EvaluationOptions::default())
            .contract(&c)
            .read_state(None)
            .await
            .unwrap();
        assert_eq!(incremental, cold);
        assert_eq!(cold.cached_value.state["counter"], json!(10));
    }

    #[tokio::test]
    async fn test_cache_every_n_interactions() {
        let world = World::new();
        let c = world.deploy(json!({"counter": 0}));
        for _ in 0..5 {
            world.ledger.interact("alice", &c, json!({"function": "add"}));
        }
        let engine = world.engine(EvaluationOptions {
            cache_every_n_interactions: Some(2),
            ..EvaluationOptions::default()
        });
        engine.contract(&c).read_state(None).await.unwrap();

        let stored: Vec<_> = engine
            .state_cache()
            .dump()
            .await
            .unwrap()
            .into_iter()
            .filter(|(key, _)| key.key == c)
            .collect();
        // after the 2nd and 4th interaction, plus the final state
        assert_eq!(stored.len(), 3);
    }

    #[tokio::test]
    async fn test_determinism_across_engines() {
        let world = World::new();
        let c = world.deploy(json!({"counter": 0}));
        for amount in [3, -1, 7] {
            world.ledger.interact("alice", &c, json!({"function": "add", "amount": amount}));
        }
        world.ledger.interact("bob", &c, json!({"function": "fail"}));

        let a = world.engine(EvaluationOptions::default()).contract(&c).read_state(None).await.unwrap();
        let b = world.engine(EvaluationOptions::default()).contract(&c).read_state(None).await.unwrap();
        assert_eq!(
            serde_json::to_vec(&a.cached_value).unwrap(),
            serde_json::to_vec(&b.cached_value).unwrap()
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_incremental_equivalence(
            amounts in prop::collection::vec(-5i64..5, 1..10),
            split in 0usize..10,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let world = World::new();
                let c = world.deploy(json!({"counter": 0}));
                let mut split_height = None;
                for (i, amount) in amounts.iter().enumerate() {
                    let input = if *amount == 0 {
                        json!({"function": "fail"})
                    } else {
                        json!({"function": "add", "amount": amount})
                    };
                    world.ledger.interact("alice", &c, input);
                    if i == split {
                        split_height = Some(world.ledger.height());
                    }
                }

                let warm = world.engine(EvaluationOptions::default());
                if let Some(height) = split_height {
                    warm.contract(&c)
                        .read_state(Some(ReadTarget::BlockHeight(height)))
                        .await
                        .unwrap();
                }
                let incremental = warm.contract(&c).read_state(None).await.unwrap();
                let cold = world
                    .engine(EvaluationOptions::default())
                    .contract(&c)
                    .read_state(None)
                    .await
                    .unwrap();
                assert_eq!(incremental, cold);
                let expected: i64 = amounts.iter().sum();
                assert_eq!(cold.cached_value.state["counter"], json!(expected));
            });
        }
    }

    // =========================================================================
    // DRY RUNS AND VIEWS
    // =========================================================================

    #[tokio::test]
    async fn test_dry_write_previews_without_persisting() {
        let world = World::new();
        let c = world.deploy(json!({"counter": 1}));
        let engine = world.engine(EvaluationOptions::default());
        let contract = engine.contract(&c);

        let preview = contract
            .dry_write(&json!({"function": "add", "amount": 5}), None)
            .await
            .unwrap();
        assert_eq!(preview.kind, ResultKind::Ok);
        assert_eq!(preview.state["counter"], json!(6));

        let failed = contract
            .dry_write(&json!({"function": "fail"}), Some("mallory"))
            .await
            .unwrap();
        assert_eq!(failed.kind, ResultKind::Error);
        assert_eq!(failed.message(), "fail requested");

        let state = contract.read_state(None).await.unwrap();
        assert_eq!(state.cached_value.state["counter"], json!(1));
        assert_eq!(world.ledger.interaction_count(), 0);
    }

    #[tokio::test]
    async fn test_dry_write_caller_defaults_to_owner() {
        let world = World::new();
        let c = world.deploy(json!({"counter": 0}));
        let engine = world.engine(EvaluationOptions::default());
        let contract = engine.contract(&c);

        let as_owner = contract
            .dry_write(&json!({"function": "evolve", "value": src_v1()}), None)
            .await
            .unwrap();
        assert!(as_owner.is_ok());
        let as_other = contract
            .dry_write(&json!({"function": "evolve", "value": src_v1()}), Some("mallory"))
            .await
            .unwrap();
        assert_eq!(as_other.message(), "only the owner can evolve");
        assert_ne!(OWNER, "mallory");
    }

    #[tokio::test]
    async fn test_view_state() {
        let world = World::new();
        let c = world.deploy(json!({"counter": 0}));
        world.ledger.interact("alice", &c, json!({"function": "add", "amount": 8}));
        let result = world
            .engine(EvaluationOptions::default())
            .contract(&c)
            .view_state(&json!({"function": "get"}))
            .await
            .unwrap();
        assert_eq!(result.result, Some(json!(8)));
    }

    #[tokio::test]
    async fn test_view_cannot_write() {
        let world = World::new();
        let c = world.deploy(json!({"counter": 0}));
        let result = world
            .engine(EvaluationOptions::default())
            .contract(&c)
            .view_state(&json!({"function": "putKv", "key": "k", "value": 1}))
            .await
            .unwrap();
        assert_eq!(result.kind, ResultKind::Exception);
        assert!(result.message().contains("view mode"));
    }

    // =========================================================================
    // OBSERVABILITY
    // =========================================================================

    #[tokio::test]
    async fn test_call_stack_and_metrics() {
        register_metrics().unwrap();
        let world = World::new();
        let c = world.deploy(json!({"counter": 0}));
        let tx = world.ledger.interact("alice", &c, json!({"function": "add"}));
        let engine = world.engine(EvaluationOptions::default());
        let contract = engine.contract(&c);
        contract.read_state(None).await.unwrap();

        let stack = contract.call_stack().unwrap();
        let rendered = stack.to_json().unwrap();
        assert_eq!(rendered["contractId"], json!(c));
        assert_eq!(rendered["interactions"][0]["interactionTxId"], json!(tx));
        assert_eq!(rendered["interactions"][0]["function"], json!("add"));

        let metrics = encode_metrics().unwrap();
        assert!(metrics.contains("sw_evaluations_total"));
        assert!(metrics.contains("sw_evaluator_interactions_total"));
    }
}
