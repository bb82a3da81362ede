//! # Test Fixtures
//!
//! A native test contract exercising every frame capability, and a
//! [`World`] wiring it to an in-memory ledger.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use shared_types::{ContractId, SortKey, VrfData};
use sw_02_sort_key_cache::RangeOptions;
use sw_03_state_evaluation::domain::interaction::derive_tx_id;
use sw_03_state_evaluation::prelude::*;
use sw_03_state_evaluation::{
    EngineConfig, EvaluationOptions, HandlerRegistry, InMemoryLedger, SmartWeave, VrfVerifier,
};

pub const OWNER: &str = "owner-address";

/// Source id of the first contract version.
pub fn src_v1() -> String {
    derive_tx_id(b"test-contract-v1")
}

/// Source id of the evolved version, which multiplies every `add` by ten.
pub fn src_v2() -> String {
    derive_tx_id(b"test-contract-v2")
}

fn one() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(tag = "function", rename_all = "camelCase")]
enum Action {
    Add {
        #[serde(default = "one")]
        amount: i64,
    },
    Fail,
    Throw,
    Get,
    Evolve {
        value: String,
    },
    Allow {
        src: String,
    },
    /// Internal write of `input` into `target`.
    Call {
        target: String,
        input: Value,
    },
    /// Internal write, then an exception in the writer.
    CallThenThrow {
        target: String,
        input: Value,
    },
    /// Ask `target` to write `amount` back into this contract, then adopt
    /// the written-back state.
    CallWithWriteBack {
        target: String,
        #[serde(default = "one")]
        amount: i64,
    },
    /// Internal write of `add amount` into `target`.
    WriteBack {
        target: String,
        #[serde(default = "one")]
        amount: i64,
    },
    /// Write `relay` down `targets`; the last contract adds `amount`.
    Relay {
        targets: Vec<String>,
        #[serde(default = "one")]
        amount: i64,
    },
    ReadOther {
        target: String,
    },
    ViewOther {
        target: String,
    },
    PutKv {
        key: String,
        value: Value,
    },
    PutKvThenFail {
        key: String,
        value: Value,
    },
    DelKv {
        key: String,
    },
    ListKv,
    GetKv {
        key: String,
    },
    Sleep {
        ms: u64,
    },
}

fn counter(state: &Value) -> i64 {
    state.get("counter").and_then(Value::as_i64).unwrap_or(0)
}

/// Counter contract with cross-contract and KV functions.
pub struct TestContract {
    calls: AtomicUsize,
    factor: i64,
}

impl TestContract {
    pub fn new() -> Self {
        Self::with_factor(1)
    }

    pub fn with_factor(factor: i64) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            factor,
        }
    }

    /// Handler invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for TestContract {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContractHandler for TestContract {
    async fn handle(
        &self,
        frame: &EvaluationFrame,
        mut state: Value,
        input: &Value,
    ) -> Result<HandlerOutput, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match parse_action::<Action>(input)? {
            Action::Add { amount } => {
                state["counter"] = json!(counter(&state) + amount * self.factor);
            }
            Action::Fail => return Err(HandlerError::Rejected("fail requested".to_string())),
            Action::Throw => return Err(HandlerError::Exception("boom".to_string())),
            Action::Get => {
                let value = json!(counter(&state));
                return Ok(HandlerOutput::result(state, value));
            }
            Action::Evolve { value } => {
                if frame.caller() != frame.contract().owner {
                    return Err(HandlerError::Rejected("only the owner can evolve".to_string()));
                }
                state["evolve"] = json!(value);
            }
            Action::Allow { src } => {
                let mut allowed = state
                    .get("allowedSrcTxIds")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                allowed.push(json!(src));
                state["allowedSrcTxIds"] = Value::Array(allowed);
            }
            Action::Call { target, input } => {
                let result = frame.write(&target, input).await?;
                state["lastWrite"] = json!(result.kind.as_str());
            }
            Action::CallThenThrow { target, input } => {
                frame.write(&target, input).await?;
                return Err(HandlerError::Exception("writer failed after the write".to_string()));
            }
            Action::CallWithWriteBack { target, amount } => {
                let me = frame.contract().id.clone();
                frame
                    .write(&target, json!({"function": "writeBack", "target": me, "amount": amount}))
                    .await?;
                if let Some(refreshed) = frame.refresh_state() {
                    state = refreshed;
                }
            }
            Action::WriteBack { target, amount } => {
                frame
                    .write(&target, json!({"function": "add", "amount": amount}))
                    .await?;
                state["wroteBack"] = json!(true);
            }
            Action::Relay { targets, amount } => match targets.split_first() {
                None => state["counter"] = json!(counter(&state) + amount),
                Some((next, rest)) => {
                    frame
                        .write(next, json!({"function": "relay", "targets": rest, "amount": amount}))
                        .await?;
                }
            },
            Action::ReadOther { target } => {
                let other = frame.read_contract_state(&target).await?;
                state["seen"] = json!(counter(&other));
            }
            Action::ViewOther { target } => {
                let viewed = frame
                    .view_contract_state(&target, json!({"function": "get"}))
                    .await?;
                state["viewed"] = viewed.result.unwrap_or(Value::Null);
            }
            Action::PutKv { key, value } => frame.kv_put(&key, value)?,
            Action::PutKvThenFail { key, value } => {
                frame.kv_put(&key, value)?;
                return Err(HandlerError::Rejected("kv write abandoned".to_string()));
            }
            Action::DelKv { key } => frame.kv_del(&key)?,
            Action::ListKv => {
                state["keys"] = json!(frame.kv_keys(&RangeOptions::default()).await?);
            }
            Action::GetKv { key } => {
                state["kv"] = frame.kv_get(&key).await?.unwrap_or(Value::Null);
            }
            Action::Sleep { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
        }
        Ok(HandlerOutput::state(state))
    }
}

/// Verifier rejecting every payload.
pub struct RejectingVrf;

impl VrfVerifier for RejectingVrf {
    fn verify(&self, _vrf: &VrfData, _sort_key: &SortKey) -> bool {
        false
    }
}

pub fn sample_vrf() -> VrfData {
    VrfData {
        index: "00".to_string(),
        proof: "proof".to_string(),
        bigint: "1".to_string(),
        pubkey: "pubkey".to_string(),
    }
}

/// Evaluation options with internal writes enabled.
pub fn internal_writes() -> EvaluationOptions {
    EvaluationOptions {
        internal_writes: true,
        ..EvaluationOptions::default()
    }
}

/// A ledger with both contract versions registered.
pub struct World {
    pub ledger: Arc<InMemoryLedger>,
    pub registry: Arc<HandlerRegistry>,
    pub v1: Arc<TestContract>,
    pub v2: Arc<TestContract>,
}

impl World {
    pub fn new() -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let registry = Arc::new(HandlerRegistry::new());
        let v1 = Arc::new(TestContract::new());
        let v2 = Arc::new(TestContract::with_factor(10));
        registry.register(&src_v1(), v1.clone());
        registry.register(&src_v2(), v2.clone());
        ledger.deploy_source(&src_v1());
        ledger.deploy_source(&src_v2());
        Self {
            ledger,
            registry,
            v1,
            v2,
        }
    }

    pub fn deploy(&self, init_state: Value) -> ContractId {
        self.ledger.deploy_contract(OWNER, &src_v1(), init_state)
    }

    /// Fresh engine (cold caches) over this world.
    pub fn engine(&self, options: EvaluationOptions) -> SmartWeave {
        self.builder(options).build().expect("engine")
    }

    pub fn engine_with_vrf(&self, verifier: Arc<dyn VrfVerifier>) -> SmartWeave {
        self.builder(EvaluationOptions::default())
            .vrf_verifier(verifier)
            .build()
            .expect("engine")
    }

    fn builder(&self, options: EvaluationOptions) -> sw_03_state_evaluation::SmartWeaveBuilder {
        SmartWeave::builder()
            .ledger(self.ledger.clone())
            .executor_factory(self.registry.clone())
            .config(EngineConfig {
                evaluation: options,
                ..EngineConfig::default()
            })
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
