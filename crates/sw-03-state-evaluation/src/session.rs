//! # Evaluation Session
//!
//! State shared by every nested evaluation of one root operation
//! (`read_state`, `dry_write`, `view_state`): the call stack, the open write
//! sets, the root sort key ceiling and the cache transactions.
//!
//! A session holds a state cache transaction handle from
//! [`EvaluationSession::begin`] until [`EvaluationSession::finish`]; every
//! state read and write of the session goes through it. KV storages open
//! their own transaction the first time a contract touches its storage.
//! Dry sessions always roll back.
//!
//! Locks are `parking_lot` mutexes and are never held across an `.await`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde_json::Value;
use shared_types::{
    ContractDefinition, ContractId, EvalStateResult, InteractionRecord, SortKey,
};
use sw_01_sort_key::genesis_sort_key;
use sw_02_sort_key_cache::{
    BasicSortKeyCache, BatchOp, CacheError, CacheKey, RangeOptions, SortKeyCacheResult,
};
use sw_telemetry::{metric_inc, INTERNAL_WRITES};
use tracing::{debug, error, instrument, warn};

use crate::cancellation::CancellationSignal;
use crate::config::EvaluationOptions;
use crate::context::ExecutionContext;
use crate::domain::call_stack::{CallChain, ContractCallStack, InnerCallType, InteractionCall, RecordId};
use crate::domain::evolve::evolved_src;
use crate::domain::interaction::{function_name, HandlerOutput, InteractionResult};
use crate::engine::EngineCore;
use crate::errors::{EvalError, HandlerError};
use crate::evaluator::{Evaluated, StateEvaluator};
use crate::frame::{ContractInfo, EvaluationFrame};
use crate::interaction_state::{InteractionState, WriteSet};
use crate::ports::ContractHandler;

/// Upper bound of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Upper {
    Latest,
    Inclusive(SortKey),
    Exclusive(SortKey),
}

impl Upper {
    fn key(&self) -> Option<&SortKey> {
        match self {
            Self::Latest => None,
            Self::Inclusive(k) | Self::Exclusive(k) => Some(k),
        }
    }

    fn admits(&self, sort_key: &SortKey) -> bool {
        match self {
            Self::Latest => true,
            Self::Inclusive(k) => sort_key <= k,
            Self::Exclusive(k) => sort_key < k,
        }
    }

    /// Tighten to stop strictly before `limit`.
    fn before(self, limit: &SortKey) -> Self {
        match self {
            Self::Inclusive(k) if &k < limit => Self::Inclusive(k),
            Self::Exclusive(k) if &k <= limit => Self::Exclusive(k),
            _ => Self::Exclusive(limit.clone()),
        }
    }

    /// Tighten to stop at `ceiling` at the latest.
    fn capped(self, ceiling: &SortKey) -> Self {
        match self {
            Self::Latest => Self::Inclusive(ceiling.clone()),
            Self::Inclusive(k) if &k > ceiling => Self::Inclusive(ceiling.clone()),
            Self::Exclusive(k) if &k > ceiling => Self::Inclusive(ceiling.clone()),
            other => other,
        }
    }
}

pub struct EvaluationSession {
    core: Arc<EngineCore>,
    options: EvaluationOptions,
    root_contract: ContractId,
    /// Commit the cache transaction on success.
    persist: bool,
    call_stack: Mutex<ContractCallStack>,
    interaction_state: Mutex<InteractionState>,
    root_sort_key: Mutex<Option<SortKey>>,
    cancellation: CancellationSignal,
    state_tx: Mutex<Option<Arc<dyn BasicSortKeyCache<EvalStateResult>>>>,
    kv_open: Mutex<BTreeMap<ContractId, Arc<dyn BasicSortKeyCache<Value>>>>,
}

impl EvaluationSession {
    pub(crate) fn new(
        core: Arc<EngineCore>,
        options: EvaluationOptions,
        root_contract: &str,
        persist: bool,
        cancellation: CancellationSignal,
    ) -> Self {
        Self {
            core,
            options,
            root_contract: root_contract.to_string(),
            persist,
            call_stack: Mutex::new(ContractCallStack::new(root_contract)),
            interaction_state: Mutex::new(InteractionState::new()),
            root_sort_key: Mutex::new(None),
            cancellation,
            state_tx: Mutex::new(None),
            kv_open: Mutex::new(BTreeMap::new()),
        }
    }

    pub(crate) fn core(&self) -> &EngineCore {
        &self.core
    }

    pub(crate) fn options(&self) -> &EvaluationOptions {
        &self.options
    }

    pub(crate) fn cancellation(&self) -> &CancellationSignal {
        &self.cancellation
    }

    pub(crate) fn persists(&self) -> bool {
        self.persist
    }

    pub(crate) fn call_stack(&self) -> ContractCallStack {
        self.call_stack.lock().clone()
    }

    fn root_sort_key(&self) -> Option<SortKey> {
        self.root_sort_key.lock().clone()
    }

    // =========================================================================
    // CACHE TRANSACTION
    // =========================================================================

    pub(crate) async fn begin(&self) -> Result<(), EvalError> {
        let tx = self.core.state_cache().begin().await?;
        *self.state_tx.lock() = Some(tx);
        Ok(())
    }

    /// The session's state cache transaction.
    fn state_cache(&self) -> Result<Arc<dyn BasicSortKeyCache<EvalStateResult>>, EvalError> {
        self.state_tx
            .lock()
            .clone()
            .ok_or(EvalError::Cache(CacheError::NoOpenTransaction))
    }

    /// Commit or roll back the state cache and every KV storage touched.
    pub(crate) async fn finish(&self, commit: bool) -> Result<(), EvalError> {
        let storages: Vec<_> = std::mem::take(&mut *self.kv_open.lock())
            .into_values()
            .collect();
        let state_tx = self.state_tx.lock().take();
        let mut outcome = match state_tx {
            Some(tx) if commit => tx.commit().await,
            Some(tx) => tx.rollback().await,
            None => Ok(()),
        };
        for storage in storages {
            let result = if commit {
                storage.commit().await
            } else {
                storage.rollback().await
            };
            if outcome.is_ok() {
                outcome = result;
            }
        }
        debug!(contract_id = %self.root_contract, commit, "session finished");
        Ok(outcome?)
    }

    async fn kv_storage(&self, contract_id: &str) -> Result<Arc<dyn BasicSortKeyCache<Value>>, EvalError> {
        let open = self.kv_open.lock().get(contract_id).cloned();
        if let Some(storage) = open {
            return Ok(storage);
        }
        let storage = self.core.kv_storage().storage(contract_id).begin().await?;
        self.kv_open
            .lock()
            .insert(contract_id.to_string(), Arc::clone(&storage));
        Ok(storage)
    }

    // =========================================================================
    // CALL STACK / WRITE SETS
    // =========================================================================

    pub(crate) fn register_call(&self, record: RecordId, call: InteractionCall) {
        self.call_stack.lock().add_interaction(record, call);
    }

    pub(crate) fn add_child(
        &self,
        parent: RecordId,
        tx_id: &str,
        contract_id: &str,
        call_type: InnerCallType,
    ) -> Result<RecordId, EvalError> {
        self.call_stack.lock().add_child(
            parent,
            tx_id,
            contract_id,
            call_type,
            self.options.max_call_depth,
        )
    }

    /// Record the outcome of an interaction in the call stack.
    pub(crate) fn finish_call(
        &self,
        record: RecordId,
        tx_id: &str,
        result: &EvalStateResult,
        elapsed: Duration,
    ) {
        let save_state = self.options.stack_trace.save_state;
        let mut stack = self.call_stack.lock();
        if let Some(call) = stack.interaction_mut(record, tx_id) {
            call.valid = result.validity_of(tx_id);
            call.error_message = result.error_messages.get(tx_id).cloned();
            call.execution_time_ms = Some(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
            if save_state {
                call.output_state = Some(result.state.clone());
            }
        }
    }

    pub(crate) fn write_set_depth(&self) -> usize {
        self.interaction_state.lock().depth()
    }

    pub(crate) fn push_write_set(&self, write_set: WriteSet) -> usize {
        self.interaction_state.lock().push(write_set)
    }

    pub(crate) fn pop_write_set(&self) -> Option<WriteSet> {
        self.interaction_state.lock().pop()
    }

    pub(crate) fn truncate_write_sets(&self, depth: usize) {
        self.interaction_state.lock().truncate(depth);
    }

    pub(crate) fn staged_state(&self, contract_id: &str, sort_key: &SortKey) -> Option<EvalStateResult> {
        self.interaction_state
            .lock()
            .staged_state(contract_id, sort_key)
            .cloned()
    }

    /// Keep a valid but unconfirmed interaction's write set for the rest of
    /// the session only.
    pub(crate) fn keep_provisional(&self, write_set: WriteSet) {
        debug!(tx_id = %write_set.interaction_id, "keeping write set of unconfirmed interaction");
        self.interaction_state.lock().keep_provisional(write_set);
    }

    /// Publish a valid interaction's write set: callee states and KV writes
    /// at the interaction's sort key. The owner stores its own state.
    pub(crate) async fn commit_write_set(&self, write_set: WriteSet) -> Result<(), EvalError> {
        let WriteSet {
            owner,
            sort_key,
            states,
            kv,
            ..
        } = write_set;
        let cache = self.state_cache()?;
        for (contract_id, result) in states {
            if contract_id == owner {
                continue;
            }
            cache
                .put(&CacheKey::new(contract_id, sort_key.clone()), result)
                .await?;
        }
        for (contract_id, ops) in kv {
            if ops.is_empty() {
                continue;
            }
            {
                let mut state = self.interaction_state.lock();
                for key in ops.keys() {
                    state.forget_provisional_kv(&contract_id, key, &sort_key);
                }
            }
            let storage = self.kv_storage(&contract_id).await?;
            let batch = ops
                .into_iter()
                .map(|(key, value)| {
                    let key = CacheKey::new(key, sort_key.clone());
                    match value {
                        Some(value) => BatchOp::Put { key, value },
                        None => BatchOp::Del { key },
                    }
                })
                .collect();
            storage.batch(batch).await?;
        }
        Ok(())
    }

    pub(crate) async fn put_state(
        &self,
        contract_id: &str,
        sort_key: &SortKey,
        result: EvalStateResult,
    ) -> Result<(), EvalError> {
        self.state_cache()?
            .put(&CacheKey::new(contract_id, sort_key.clone()), result)
            .await?;
        Ok(())
    }

    /// State of `contract_id` at exactly `sort_key`: staged first, then cached.
    pub(crate) async fn state_at_exactly(
        &self,
        contract_id: &str,
        sort_key: &SortKey,
    ) -> Result<Option<EvalStateResult>, EvalError> {
        if let Some(staged) = self.staged_state(contract_id, sort_key) {
            return Ok(Some(staged));
        }
        let cached = self
            .state_cache()?
            .get(&CacheKey::new(contract_id, sort_key.clone()))
            .await?;
        Ok(cached.map(|r| r.cached_value))
    }

    // =========================================================================
    // CONTRACT LOADING
    // =========================================================================

    /// Definition and handler of a contract, honouring the source whitelist.
    pub(crate) async fn load_contract(
        &self,
        contract_id: &str,
        evolved: Option<&str>,
    ) -> Result<(ContractDefinition, Arc<dyn ContractHandler>), EvalError> {
        let definition = self
            .core
            .definition_loader()
            .load(contract_id, evolved)
            .await?;
        if !self.options.is_source_allowed(&definition.src_tx_id) {
            return Err(EvalError::NonWhitelistedSource {
                contract_id: contract_id.to_string(),
                src_tx_id: definition.src_tx_id,
            });
        }
        let handler = self
            .core
            .executor_factory()
            .create(&definition, &self.options)
            .await?;
        Ok((definition, handler))
    }

    /// Run a handler under the interaction time budget.
    pub(crate) async fn invoke(
        &self,
        contract_id: &str,
        frame: &EvaluationFrame,
        handler: &dyn ContractHandler,
        state: Value,
        input: &Value,
    ) -> Result<Result<HandlerOutput, HandlerError>, EvalError> {
        let budget = self.options.interaction_budget();
        tokio::time::timeout(budget, handler.handle(frame, state, input))
            .await
            .map_err(|_| {
                error!(
                    contract_id = %contract_id,
                    tx_id = %frame.transaction().id,
                    seconds = budget.as_secs(),
                    "interaction evaluation timed out"
                );
                EvalError::InteractionTimeout {
                    contract_id: contract_id.to_string(),
                    tx_id: frame.transaction().id.clone(),
                    seconds: budget.as_secs(),
                }
            })
    }

    // =========================================================================
    // STATE READS
    // =========================================================================

    /// Evaluate `contract_id` up to `upper`.
    pub(crate) fn read_state_at(
        self: &Arc<Self>,
        record: RecordId,
        contract_id: ContractId,
        upper: Upper,
        chain: CallChain,
    ) -> BoxFuture<'static, Result<Evaluated, EvalError>> {
        let session = Arc::clone(self);
        async move { session.read_state_inner(record, contract_id, upper, chain).await }.boxed()
    }

    #[instrument(skip(self, chain), fields(depth = chain.len()))]
    async fn read_state_inner(
        self: Arc<Self>,
        record: RecordId,
        contract_id: ContractId,
        upper: Upper,
        chain: CallChain,
    ) -> Result<Evaluated, EvalError> {
        self.cancellation.check()?;
        let mut upper = upper;
        if let Some(in_progress) = chain.earliest_for(&contract_id) {
            upper = upper.before(in_progress);
        }
        if !record.is_root() {
            if upper == Upper::Latest {
                return Err(EvalError::MissingSortKeyForChild(contract_id));
            }
            if let Some(ceiling) = self.root_sort_key() {
                upper = upper.capped(&ceiling);
            }
        }

        let cache = self.state_cache()?;
        let base = match &upper {
            Upper::Latest => cache.get_last(&contract_id).await?,
            Upper::Inclusive(k) => cache.get_less_or_equal(&contract_id, k).await?,
            Upper::Exclusive(k) => cache.get_less_than(&contract_id, k).await?,
        };
        if let (Upper::Inclusive(requested), Some(hit)) = (&upper, base.as_ref()) {
            if &hit.sort_key == requested {
                debug!(contract_id = %contract_id, sort_key = %requested, "exact cache hit");
                return Ok(Evaluated::cached(hit.clone()));
            }
        }

        let evolved = base
            .as_ref()
            .and_then(|b| evolved_src(&b.cached_value.state));
        let (definition, handler) = self.load_contract(&contract_id, evolved.as_deref()).await?;

        self.cancellation.check()?;
        let from = base.as_ref().map(|b| &b.sort_key);
        let loaded = self
            .core
            .interactions_loader()
            .load(&contract_id, from, upper.key())
            .await?;
        let mut interactions: Vec<InteractionRecord> = self
            .core
            .sorter()
            .sort(loaded)
            .into_iter()
            .filter(|i| match &i.sort_key {
                Some(k) => from.map_or(true, |f| k > f) && upper.admits(k),
                None => true,
            })
            .collect();

        if let Some(cut) = chain.cut_in_progress(&contract_id, &mut interactions) {
            warn!(
                contract_id = %contract_id,
                tx_id = %cut,
                "interaction already in progress up the call chain, truncating"
            );
        }

        if record.is_root() {
            let ceiling = interactions
                .last()
                .and_then(|i| i.sort_key.clone())
                .or_else(|| upper.key().cloned());
            *self.root_sort_key.lock() = ceiling;
        }

        debug!(
            contract_id = %contract_id,
            base = ?base.as_ref().map(|b| &b.sort_key),
            missing = interactions.len(),
            "execution context assembled"
        );

        if interactions.is_empty() {
            return Ok(match base {
                Some(base) => Evaluated::cached(base),
                None => Evaluated {
                    sort_key: genesis_sort_key(),
                    result: EvalStateResult::genesis(definition.init_state),
                    last: None,
                },
            });
        }

        let ctx = ExecutionContext {
            contract_id,
            record,
            definition,
            handler,
            interactions,
            base,
            chain,
            view: false,
        };
        StateEvaluator::new(Arc::clone(&self)).eval(ctx).await
    }

    /// Evaluate a single speculative interaction on top of `base`.
    #[instrument(skip(self, base, interaction), fields(contract_id = %self.root_contract))]
    pub(crate) async fn evaluate_dry(
        self: &Arc<Self>,
        base: SortKeyCacheResult<EvalStateResult>,
        interaction: InteractionRecord,
        view: bool,
    ) -> Result<InteractionResult, EvalError> {
        let evolved = evolved_src(&base.cached_value.state);
        let (definition, handler) = self
            .load_contract(&self.root_contract, evolved.as_deref())
            .await?;
        *self.root_sort_key.lock() = interaction.sort_key.clone();
        let ctx = ExecutionContext {
            contract_id: self.root_contract.clone(),
            record: RecordId::ROOT,
            definition,
            handler,
            interactions: vec![interaction],
            base: Some(base),
            chain: CallChain::default(),
            view,
        };
        let evaluated = StateEvaluator::new(Arc::clone(self)).eval(ctx).await?;
        Ok(match evaluated.last {
            Some(step) => InteractionResult {
                kind: step.kind,
                state: evaluated.result.state,
                result: step.output,
                error_message: step.message,
            },
            None => InteractionResult::error(evaluated.result.state, "Interaction has no input"),
        })
    }

    // =========================================================================
    // FRAME OPERATIONS
    // =========================================================================

    /// Internal write into `callee` on behalf of the frame's contract.
    #[instrument(skip(self, frame, input), fields(writer = %frame.contract().id, tx_id = %frame.transaction().id))]
    pub(crate) async fn write(
        self: &Arc<Self>,
        frame: &EvaluationFrame,
        callee: &str,
        input: Value,
    ) -> Result<InteractionResult, EvalError> {
        if !self.options.internal_writes {
            return Err(EvalError::InternalWritesDisabled);
        }
        let tx = frame.transaction();
        let child = self.add_child(frame.record(), &tx.id, callee, InnerCallType::Write)?;

        let staged = self.staged_state(callee, &tx.sort_key);
        let base = match staged {
            Some(result) => result,
            None => {
                self.read_state_at(
                    child,
                    callee.to_string(),
                    Upper::Exclusive(tx.sort_key.clone()),
                    frame.chain().clone(),
                )
                .await?
                .result
            }
        };

        self.register_call(
            child,
            InteractionCall::new(&tx.id, &frame.contract().id, function_name(&input), true),
        );
        let started = Instant::now();
        let writer_src = &frame.contract().src_tx_id;

        let (next, result) = if write_allowed(&base.state, writer_src) {
            let (definition, handler) = self
                .load_contract(callee, evolved_src(&base.state).as_deref())
                .await?;
            let callee_frame = EvaluationFrame::new(
                Arc::clone(self),
                child,
                ContractInfo::from(&definition),
                tx.clone(),
                frame.contract().id.clone(),
                frame.chain().extended(callee, &tx.id, &tx.sort_key),
                false,
            );
            let depth = self.push_write_set(WriteSet::new(callee, &tx.id, &tx.sort_key));
            let outcome = match self
                .invoke(callee, &callee_frame, handler.as_ref(), base.state.clone(), &input)
                .await
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.truncate_write_sets(depth);
                    return Err(err);
                }
            };
            match outcome {
                Ok(output) => {
                    self.interaction_state.lock().merge_top();
                    let mut next = base;
                    next.state = output.state.clone();
                    next.record_valid(&tx.id);
                    (next, InteractionResult::ok(output.state, output.result))
                }
                Err(HandlerError::Rejected(message)) => {
                    self.truncate_write_sets(depth);
                    let state = base.state.clone();
                    (rejected(base, &tx.id, &message), InteractionResult::error(state, message))
                }
                Err(HandlerError::Exception(message)) => {
                    self.truncate_write_sets(depth);
                    let state = base.state.clone();
                    (rejected(base, &tx.id, &message), InteractionResult::exception(state, message))
                }
                Err(HandlerError::Fatal(err)) => {
                    self.truncate_write_sets(depth);
                    return Err(err);
                }
            }
        } else {
            let message = format!("[WriteNotAllowed] Source {writer_src} is not allowed to write into {callee}");
            warn!(callee = %callee, "{message}");
            let state = base.state.clone();
            (rejected(base, &tx.id, &message), InteractionResult::error(state, message))
        };

        self.finish_call(child, &tx.id, &next, started.elapsed());
        self.interaction_state.lock().stage_state(callee, next);
        metric_inc!(INTERNAL_WRITES, &[result.kind.as_str()]);
        debug!(callee = %callee, outcome = result.kind.as_str(), "internal write");
        Ok(result)
    }

    /// State of `contract_id` just before the frame's interaction.
    pub(crate) async fn read_contract_state(
        self: &Arc<Self>,
        frame: &EvaluationFrame,
        contract_id: &str,
    ) -> Result<Value, EvalError> {
        let tx = frame.transaction();
        let child = self.add_child(frame.record(), &tx.id, contract_id, InnerCallType::Read)?;
        let evaluated = self
            .read_state_at(
                child,
                contract_id.to_string(),
                Upper::Exclusive(tx.sort_key.clone()),
                frame.chain().clone(),
            )
            .await?;
        Ok(evaluated.result.state)
    }

    /// Run a view of `contract_id` on its state just before the frame's
    /// interaction. Nothing is staged.
    pub(crate) async fn view_contract_state(
        self: &Arc<Self>,
        frame: &EvaluationFrame,
        contract_id: &str,
        input: Value,
    ) -> Result<InteractionResult, EvalError> {
        let tx = frame.transaction();
        let child = self.add_child(frame.record(), &tx.id, contract_id, InnerCallType::View)?;
        let base = self
            .read_state_at(
                child,
                contract_id.to_string(),
                Upper::Exclusive(tx.sort_key.clone()),
                frame.chain().clone(),
            )
            .await?
            .result;
        let (definition, handler) = self
            .load_contract(contract_id, evolved_src(&base.state).as_deref())
            .await?;
        self.register_call(
            child,
            InteractionCall::new(&tx.id, &frame.contract().id, function_name(&input), false),
        );
        let view_frame = EvaluationFrame::new(
            Arc::clone(self),
            child,
            ContractInfo::from(&definition),
            tx.clone(),
            frame.contract().id.clone(),
            frame.chain().extended(contract_id, &tx.id, &tx.sort_key),
            true,
        );
        let started = Instant::now();
        let outcome = self
            .invoke(contract_id, &view_frame, handler.as_ref(), base.state.clone(), &input)
            .await?;
        let (record, result) = match outcome {
            Ok(output) => {
                let mut record = base;
                record.record_valid(&tx.id);
                (record, InteractionResult::ok(output.state, output.result))
            }
            Err(HandlerError::Rejected(message)) => {
                let state = base.state.clone();
                (rejected(base, &tx.id, &message), InteractionResult::error(state, message))
            }
            Err(HandlerError::Exception(message)) => {
                let state = base.state.clone();
                (rejected(base, &tx.id, &message), InteractionResult::exception(state, message))
            }
            Err(HandlerError::Fatal(err)) => return Err(err),
        };
        self.finish_call(child, &tx.id, &record, started.elapsed());
        Ok(result)
    }

    pub(crate) async fn kv_get(&self, frame: &EvaluationFrame, key: &str) -> Result<Option<Value>, EvalError> {
        let contract_id = &frame.contract().id;
        let sort_key = &frame.transaction().sort_key;
        let staged = self
            .interaction_state
            .lock()
            .staged_kv(contract_id, sort_key, key);
        if let Some(value) = staged {
            return Ok(value);
        }
        let storage = self.kv_storage(contract_id).await?;
        self.kv_before(storage.as_ref(), contract_id, sort_key, key).await
    }

    /// Value of `key` strictly before `sort_key`: the stored version or a
    /// newer provisional one.
    async fn kv_before(
        &self,
        storage: &dyn BasicSortKeyCache<Value>,
        contract_id: &str,
        sort_key: &SortKey,
        key: &str,
    ) -> Result<Option<Value>, EvalError> {
        let stored = storage.get_less_than(key, sort_key).await?;
        let provisional = self
            .interaction_state
            .lock()
            .provisional_kv(contract_id, key, sort_key);
        Ok(match (stored, provisional) {
            (Some(stored), Some((at, _))) if stored.sort_key > at => Some(stored.cached_value),
            (_, Some((_, value))) => value,
            (stored, None) => stored.map(|r| r.cached_value),
        })
    }

    pub(crate) fn kv_stage(&self, frame: &EvaluationFrame, key: &str, value: Option<Value>) {
        self.interaction_state
            .lock()
            .stage_kv(&frame.contract().id, key, value);
    }

    /// Entries as of just before the frame's interaction, overlaid with the
    /// writes staged during it.
    pub(crate) async fn kv_map(
        &self,
        frame: &EvaluationFrame,
        range: &RangeOptions,
    ) -> Result<Vec<(String, Value)>, EvalError> {
        let contract_id = &frame.contract().id;
        let sort_key = &frame.transaction().sort_key;
        let storage = self.kv_storage(contract_id).await?;

        let mut candidates: BTreeSet<String> = storage.all_keys().await?.into_iter().collect();
        candidates.extend(
            self.interaction_state
                .lock()
                .provisional_kv_keys(contract_id, sort_key),
        );
        let mut merged: BTreeMap<String, Value> = BTreeMap::new();
        for key in candidates.into_iter().filter(|k| range.contains(k)) {
            if let Some(value) = self
                .kv_before(storage.as_ref(), contract_id, sort_key, &key)
                .await?
            {
                merged.insert(key, value);
            }
        }

        let staged = self
            .interaction_state
            .lock()
            .staged_kv_ops(contract_id, sort_key);
        for (key, value) in staged {
            if !range.contains(&key) {
                continue;
            }
            match value {
                Some(value) => {
                    merged.insert(key, value);
                }
                None => {
                    merged.remove(&key);
                }
            }
        }
        let mut entries: Vec<_> = merged.into_iter().collect();
        if range.reverse {
            entries.reverse();
        }
        if let Some(limit) = range.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }
}

/// Whether the callee's `allowedSrcTxIds` list (if any) admits the writer.
fn write_allowed(callee_state: &Value, writer_src: &str) -> bool {
    match callee_state.get("allowedSrcTxIds").and_then(Value::as_array) {
        Some(allowed) => allowed.iter().any(|s| s.as_str() == Some(writer_src)),
        None => true,
    }
}

fn rejected(mut base: EvalStateResult, tx_id: &str, message: &str) -> EvalStateResult {
    base.record_invalid(tx_id, message);
    base
}
