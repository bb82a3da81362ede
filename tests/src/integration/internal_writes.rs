//! # Internal Write Scenarios
//!
//! Contracts writing into, reading and viewing other contracts.

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use shared_types::{ConfirmationStatus, InteractionRecord};
    use sw_03_state_evaluation::domain::interaction::derive_tx_id;
    use sw_03_state_evaluation::domain::tags::interaction_tags;
    use sw_03_state_evaluation::{EvalError, EvaluationOptions, SmartWeaveContract};

    use crate::fixtures::{internal_writes, src_v1, World, OWNER};

    fn add_three(world: &World, contract: &str) {
        for _ in 0..3 {
            world.ledger.interact("alice", contract, json!({"function": "add"}));
        }
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    #[tokio::test]
    async fn test_write_updates_callee() {
        let world = World::new();
        let a = world.deploy(json!({"counter": 0}));
        let b = world.deploy(json!({"counter": 0}));
        add_three(&world, &b);
        let tx = world.ledger.interact_with_writes(
            "alice",
            &a,
            json!({"function": "call", "target": b, "input": {"function": "add", "amount": 10}}),
            &[b.clone()],
        );

        let engine = world.engine(internal_writes());
        let a_state = engine.contract(&a).read_state(None).await.unwrap().cached_value;
        assert_eq!(a_state.validity_of(&tx), Some(true));
        assert_eq!(a_state.state["lastWrite"], json!("ok"));

        let b_state = engine.contract(&b).read_state(None).await.unwrap().cached_value;
        assert_eq!(b_state.state["counter"], json!(13));
        assert_eq!(b_state.validity_of(&tx), Some(true));

        // a fresh engine reaches the same state by evaluating the writer
        let cold = world.engine(internal_writes()).contract(&b).read_state(None).await.unwrap();
        assert_eq!(cold.cached_value, b_state);
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back_callee() {
        let world = World::new();
        let a = world.deploy(json!({"counter": 0}));
        let b = world.deploy(json!({"counter": 0}));
        add_three(&world, &b);
        let tx = world.ledger.interact_with_writes(
            "alice",
            &a,
            json!({"function": "call", "target": b, "input": {"function": "throw"}}),
            &[b.clone()],
        );

        let engine = world.engine(internal_writes());
        let a_state = engine.contract(&a).read_state(None).await.unwrap().cached_value;
        assert_eq!(a_state.validity_of(&tx), Some(false));
        assert!(a_state.error_messages[&tx].contains("boom"));

        let b_state = engine.contract(&b).read_state(None).await.unwrap().cached_value;
        assert_eq!(b_state.state["counter"], json!(3));
        assert_eq!(b_state.validity_of(&tx), Some(false));
    }

    #[tokio::test]
    async fn test_failed_write_returned_to_writer() {
        let world = World::new();
        let a = world.deploy(json!({"counter": 0}));
        let b = world.deploy(json!({"counter": 0}));
        add_three(&world, &b);
        let tx = world.ledger.interact_with_writes(
            "alice",
            &a,
            json!({"function": "call", "target": b, "input": {"function": "throw"}}),
            &[b.clone()],
        );

        let engine = world.engine(EvaluationOptions {
            throw_on_internal_write_error: false,
            ..internal_writes()
        });
        let a_state = engine.contract(&a).read_state(None).await.unwrap().cached_value;
        assert_eq!(a_state.validity_of(&tx), Some(true));
        assert_eq!(a_state.state["lastWrite"], json!("exception"));

        let b_state = engine.contract(&b).read_state(None).await.unwrap().cached_value;
        assert_eq!(b_state.state["counter"], json!(3));
        assert_eq!(b_state.validity_of(&tx), Some(false));
        assert_eq!(b_state.error_messages[&tx], "boom");
    }

    #[tokio::test]
    async fn test_writer_failing_after_write_discards_it() {
        let world = World::new();
        let a = world.deploy(json!({"counter": 0}));
        let b = world.deploy(json!({"counter": 0}));
        add_three(&world, &b);
        let tx = world.ledger.interact_with_writes(
            "alice",
            &a,
            json!({"function": "callThenThrow", "target": b, "input": {"function": "add", "amount": 10}}),
            &[b.clone()],
        );

        let engine = world.engine(internal_writes());
        let a_state = engine.contract(&a).read_state(None).await.unwrap().cached_value;
        assert_eq!(a_state.validity_of(&tx), Some(false));
        assert_eq!(a_state.error_messages[&tx], "writer failed after the write");

        let stored = engine.state_cache().get_last(&b).await.unwrap().unwrap();
        assert_eq!(stored.cached_value.state["counter"], json!(3));

        let b_state = engine.contract(&b).read_state(None).await.unwrap().cached_value;
        assert_eq!(b_state.state["counter"], json!(3));
        assert_eq!(b_state.validity_of(&tx), Some(false));
    }

    #[tokio::test]
    async fn test_writer_exception_aborts_whole_read() {
        let world = World::new();
        let a = world.deploy(json!({"counter": 0}));
        let b = world.deploy(json!({"counter": 0}));
        add_three(&world, &b);
        world.ledger.interact_with_writes(
            "alice",
            &a,
            json!({"function": "callThenThrow", "target": b, "input": {"function": "add", "amount": 10}}),
            &[b.clone()],
        );

        let engine = world.engine(EvaluationOptions {
            ignore_exceptions: false,
            ..internal_writes()
        });
        let err = engine.contract(&a).read_state(None).await.unwrap_err();
        assert!(matches!(err, EvalError::RuntimeException { .. }));
        assert!(engine.state_cache().get_last(&a).await.unwrap().is_none());
        // the callee states folded on the way are rolled back too
        assert!(engine.state_cache().get_last(&b).await.unwrap().is_none());

        // reading the callee evaluates the same writer and fails the same way
        let err = engine.contract(&b).read_state(None).await.unwrap_err();
        assert!(matches!(err, EvalError::RuntimeException { .. }));
    }

    #[tokio::test]
    async fn test_internal_writes_disabled() {
        let world = World::new();
        let a = world.deploy(json!({"counter": 0}));
        let b = world.deploy(json!({"counter": 0}));
        let tx = world.ledger.interact_with_writes(
            "alice",
            &a,
            json!({"function": "call", "target": b, "input": {"function": "add"}}),
            &[b.clone()],
        );

        let engine = world.engine(EvaluationOptions::default());
        let a_state = engine.contract(&a).read_state(None).await.unwrap().cached_value;
        assert_eq!(a_state.validity_of(&tx), Some(false));
        assert_eq!(a_state.error_messages[&tx], "Internal writes are disabled");

        let b_state = engine.contract(&b).read_state(None).await.unwrap().cached_value;
        assert_eq!(b_state.state["counter"], json!(0));
        assert!(b_state.validity.is_empty());
    }

    // =========================================================================
    // WRITE PERMISSIONS
    // =========================================================================

    #[tokio::test]
    async fn test_allowed_sources_gate_writes() {
        let world = World::new();
        let a = world.deploy(json!({"counter": 0}));
        let b = world.deploy(json!({"counter": 0, "allowedSrcTxIds": []}));
        let write = json!({"function": "call", "target": b, "input": {"function": "add", "amount": 10}});

        let denied = world
            .ledger
            .interact_with_writes("alice", &a, write.clone(), &[b.clone()]);
        world
            .ledger
            .interact(OWNER, &b, json!({"function": "allow", "src": src_v1()}));
        let allowed = world.ledger.interact_with_writes("alice", &a, write, &[b.clone()]);

        let engine = world.engine(internal_writes());
        let a_state = engine.contract(&a).read_state(None).await.unwrap().cached_value;
        assert_eq!(a_state.validity_of(&denied), Some(false));
        assert!(a_state.error_messages[&denied].contains("[WriteNotAllowed]"));
        assert_eq!(a_state.validity_of(&allowed), Some(true));

        let b_state = engine.contract(&b).read_state(None).await.unwrap().cached_value;
        assert_eq!(b_state.state["counter"], json!(10));
        assert_eq!(b_state.validity_of(&denied), Some(false));
    }

    // =========================================================================
    // CALL DEPTH AND CYCLES
    // =========================================================================

    fn relay_world() -> (World, Vec<String>, String) {
        let world = World::new();
        let chain: Vec<String> = (0..4).map(|_| world.deploy(json!({"counter": 0}))).collect();
        let targets = chain[1..].to_vec();
        let tx = world.ledger.interact_with_writes(
            "alice",
            &chain[0],
            json!({"function": "relay", "targets": targets}),
            &targets,
        );
        (world, chain, tx)
    }

    #[tokio::test]
    async fn test_call_depth_limit() {
        let (world, chain, _) = relay_world();
        let engine = world.engine(EvaluationOptions {
            max_call_depth: 2,
            ..internal_writes()
        });
        let err = engine.contract(&chain[0]).read_state(None).await.unwrap_err();
        assert!(matches!(
            err,
            EvalError::CallDepthExceeded { depth: 3, max: 2, .. }
        ));
        assert!(engine.state_cache().get_last(&chain[0]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_relay_within_depth_limit() {
        let (world, chain, tx) = relay_world();
        let engine = world.engine(EvaluationOptions {
            max_call_depth: 3,
            ..internal_writes()
        });
        let root = engine.contract(&chain[0]);
        let first = root.read_state(None).await.unwrap().cached_value;
        assert_eq!(first.validity_of(&tx), Some(true));

        let last = engine.contract(&chain[3]).read_state(None).await.unwrap().cached_value;
        assert_eq!(last.state["counter"], json!(1));

        let stack = root.call_stack().unwrap();
        assert_eq!(stack.records().iter().map(|r| r.depth).max(), Some(3));
    }

    #[tokio::test]
    async fn test_callee_reading_writer_sees_state_before_interaction() {
        let world = World::new();
        let a = world.deploy(json!({"counter": 5}));
        let b = world.deploy(json!({"counter": 0}));
        world.ledger.interact_with_writes(
            "alice",
            &a,
            json!({"function": "call", "target": b, "input": {"function": "readOther", "target": a}}),
            &[b.clone()],
        );

        let engine = world.engine(internal_writes());
        engine.contract(&a).read_state(None).await.unwrap();
        let warm = engine.contract(&b).read_state(None).await.unwrap().cached_value;
        assert_eq!(warm.state["seen"], json!(5));

        let cold = world.engine(internal_writes()).contract(&b).read_state(None).await.unwrap();
        assert_eq!(cold.cached_value.state["seen"], json!(5));
    }

    #[tokio::test]
    async fn test_write_back_into_writer_does_not_recurse() {
        let world = World::new();
        let a = world.deploy(json!({"counter": 2}));
        let b = world.deploy(json!({"counter": 0}));
        let tx = world.ledger.interact_with_writes(
            "alice",
            &a,
            json!({"function": "callWithWriteBack", "target": b, "amount": 5}),
            &[b.clone()],
        );

        let engine = world.engine(internal_writes());
        let root = engine.contract(&a);
        let a_warm = root.read_state(None).await.unwrap().cached_value;
        assert_eq!(a_warm.state["counter"], json!(7));
        assert_eq!(a_warm.validity_of(&tx), Some(true));
        // the writer handler, the callee handler and the write-back, once each
        assert_eq!(world.v1.calls(), 3);

        let stack = root.call_stack().unwrap();
        let contracts: Vec<_> = stack
            .records()
            .iter()
            .map(|r| (r.contract_id.as_str(), r.depth))
            .collect();
        assert_eq!(contracts, vec![(a.as_str(), 0), (b.as_str(), 1), (a.as_str(), 2)]);
        let written_back = &stack.records()[2];
        assert_eq!(written_back.interactions.len(), 1);
        assert!(written_back.interactions[0].foreign_calls.is_empty());

        let b_warm = engine.contract(&b).read_state(None).await.unwrap().cached_value;
        assert_eq!(b_warm.state["wroteBack"], json!(true));
        assert_eq!(world.v1.calls(), 3);

        let cold = world.engine(internal_writes());
        let b_cold = cold.contract(&b).read_state(None).await.unwrap().cached_value;
        let a_cold = cold.contract(&a).read_state(None).await.unwrap().cached_value;
        assert_eq!(b_cold, b_warm);
        assert_eq!(a_cold, a_warm);
    }

    // =========================================================================
    // UNCONFIRMED WRITERS
    // =========================================================================

    fn unconfirmed(world: &World, seed: &str, contract: &str, input: Value, writes: &[String]) -> String {
        let record = InteractionRecord::new(
            derive_tx_id(seed.as_bytes()),
            "alice",
            world.ledger.mine_block(),
            interaction_tags(contract, &input, writes),
        )
        .with_confirmation_status(ConfirmationStatus::NotProcessed);
        let id = record.id.clone();
        world.ledger.push(record);
        id
    }

    #[tokio::test]
    async fn test_unconfirmed_interaction_effects_stay_in_session() {
        let world = World::new();
        let a = world.deploy(json!({"counter": 0}));
        let b = world.deploy(json!({"counter": 0}));
        world.ledger.interact("alice", &a, json!({"function": "add"}));
        let call = unconfirmed(
            &world,
            "pending-call",
            &a,
            json!({"function": "call", "target": b, "input": {"function": "add", "amount": 10}}),
            &[b.clone()],
        );
        unconfirmed(&world, "pending-put", &a, json!({"function": "putKv", "key": "k", "value": 7}), &[]);
        unconfirmed(&world, "pending-get", &a, json!({"function": "getKv", "key": "k"}), &[]);

        let engine = world.engine(internal_writes());
        let read = engine.contract(&a).read_state(None).await.unwrap().cached_value;
        assert_eq!(read.validity_of(&call), Some(true));
        // later interactions of the same read see the unconfirmed KV write
        assert_eq!(read.state["kv"], json!(7));

        let stored = engine.state_cache().get_last(&a).await.unwrap().unwrap();
        assert_eq!(stored.cached_value.state["counter"], json!(1));
        assert!(engine.state_cache().get_last(&b).await.unwrap().is_none());
        assert!(engine.kv_storage(&a).get_last("k").await.unwrap().is_none());

        // the callee still folds the unconfirmed write, without caching it
        let b_state = engine.contract(&b).read_state(None).await.unwrap().cached_value;
        assert_eq!(b_state.state["counter"], json!(10));
        assert_eq!(b_state.validity_of(&call), Some(true));
        assert!(engine.state_cache().get_last(&b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_confirmed_delete_hides_earlier_unconfirmed_put() {
        let world = World::new();
        let a = world.deploy(json!({}));
        unconfirmed(&world, "pending-put", &a, json!({"function": "putKv", "key": "k", "value": 7}), &[]);
        world.ledger.interact("alice", &a, json!({"function": "delKv", "key": "k"}));
        world.ledger.interact("alice", &a, json!({"function": "getKv", "key": "k"}));
        world.ledger.interact("alice", &a, json!({"function": "listKv"}));

        let state = world
            .engine(EvaluationOptions::default())
            .contract(&a)
            .read_state(None)
            .await
            .unwrap()
            .cached_value;
        assert_eq!(state.state["kv"], json!(null));
        assert_eq!(state.state["keys"], json!([]));
    }

    // =========================================================================
    // READS AND VIEWS
    // =========================================================================

    #[tokio::test]
    async fn test_read_other_contract() {
        let world = World::new();
        let a = world.deploy(json!({"counter": 0}));
        let b = world.deploy(json!({"counter": 0}));
        add_three(&world, &b);
        world.ledger.interact("alice", &a, json!({"function": "readOther", "target": b}));
        world.ledger.interact("alice", &b, json!({"function": "add"}));

        let engine = world.engine(EvaluationOptions::default());
        let a_state = engine.contract(&a).read_state(None).await.unwrap().cached_value;
        assert_eq!(a_state.state["seen"], json!(3));
    }

    #[tokio::test]
    async fn test_view_other_contract() {
        let world = World::new();
        let a = world.deploy(json!({"counter": 0}));
        let b = world.deploy(json!({"counter": 42}));
        world.ledger.interact("alice", &a, json!({"function": "viewOther", "target": b}));

        let engine = world.engine(EvaluationOptions::default());
        let a_state = engine.contract(&a).read_state(None).await.unwrap().cached_value;
        assert_eq!(a_state.state["viewed"], json!(42));
    }

    // =========================================================================
    // TAG PREPARATION
    // =========================================================================

    #[tokio::test]
    async fn test_prepare_interaction_tags_lists_written_contracts() {
        let world = World::new();
        let a = world.deploy(json!({"counter": 0}));
        let b = world.deploy(json!({"counter": 0}));
        let engine = world.engine(internal_writes());
        let contract = engine.contract(&a);

        let input = json!({"function": "call", "target": b, "input": {"function": "add"}});
        let tags = contract.prepare_interaction_tags(&input, Some("alice")).await.unwrap();
        assert!(tags
            .iter()
            .any(|t| t.name == "Interact-Write" && t.value == b));
        assert!(tags.iter().any(|t| t.name == "Contract" && t.value == a));

        let err = contract
            .prepare_interaction_tags(&json!({"function": "fail"}), Some("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::InteractionRejected(ref m) if m == "fail requested"));

        // nothing was persisted for the callee
        assert!(engine.state_cache().get_last(&b).await.unwrap().is_none());
    }
}
