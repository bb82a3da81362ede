//! # Handler Based Contract
//!
//! The client-facing handle of one contract. Every operation runs in its
//! own [`EvaluationSession`]: the state cache transaction is opened before
//! the first read and committed (reads) or rolled back (dry writes, views,
//! failures) when the operation ends.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use shared_types::{EvalStateResult, InteractionRecord, SortKey, Tag};
use sw_02_sort_key_cache::SortKeyCacheResult;
use sw_telemetry::{log_event, metric_inc, EVALUATIONS};
use tracing::{debug, error, info, instrument};

use crate::cancellation::CancellationSignal;
use crate::config::EvaluationOptions;
use crate::domain::call_stack::{CallChain, ContractCallStack, RecordId};
use crate::domain::evolve::evolved_src;
use crate::domain::inner_writes::InnerWritesEvaluator;
use crate::domain::interaction::{dummy_tx_id, InteractionResult};
use crate::domain::tags::interaction_tags;
use crate::engine::EngineCore;
use crate::errors::{EvalError, LoaderError};
use crate::ports::{ReadTarget, SmartWeaveContract};
use crate::session::{EvaluationSession, Upper};

/// Rolls a session back if its operation is dropped before finishing.
struct RollbackOnDrop {
    session: Option<Arc<EvaluationSession>>,
}

impl RollbackOnDrop {
    fn new(session: &Arc<EvaluationSession>) -> Self {
        Self {
            session: Some(Arc::clone(session)),
        }
    }

    fn disarm(&mut self) {
        self.session = None;
    }
}

impl Drop for RollbackOnDrop {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = session.finish(false).await {
                        error!(error = %err, "rollback of abandoned evaluation failed");
                    }
                });
            }
            Err(_) => error!("evaluation abandoned outside a runtime, cache transaction left open"),
        }
    }
}

pub struct HandlerBasedContract {
    core: Arc<EngineCore>,
    contract_id: String,
    options: EvaluationOptions,
    call_stack: Mutex<Option<ContractCallStack>>,
}

impl HandlerBasedContract {
    pub(crate) fn new(core: Arc<EngineCore>, contract_id: &str, options: EvaluationOptions) -> Self {
        Self {
            core,
            contract_id: contract_id.to_string(),
            options,
            call_stack: Mutex::new(None),
        }
    }

    /// Replace the evaluation options of this handle.
    #[must_use]
    pub fn with_options(mut self, options: EvaluationOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn options(&self) -> &EvaluationOptions {
        &self.options
    }

    /// Call stack of the last operation run through this handle.
    #[must_use]
    pub fn call_stack(&self) -> Option<ContractCallStack> {
        self.call_stack.lock().clone()
    }

    /// Folded state up to `target`, abandoning the evaluation once `signal`
    /// is raised.
    #[instrument(skip(self, signal), fields(contract_id = %self.contract_id))]
    pub async fn read_state_with_cancellation(
        &self,
        target: Option<ReadTarget>,
        signal: CancellationSignal,
    ) -> Result<SortKeyCacheResult<EvalStateResult>, EvalError> {
        let upper = match target {
            None => Upper::Latest,
            Some(ReadTarget::SortKey(sort_key)) => Upper::Inclusive(sort_key),
            Some(ReadTarget::BlockHeight(height)) => {
                Upper::Inclusive(self.core.sorter().generate_last_sort_key(height))
            }
        };
        let contract_id = self.contract_id.clone();
        let evaluated = self
            .run_in_session(true, signal, |session| async move {
                session
                    .read_state_at(RecordId::ROOT, contract_id, upper, CallChain::default())
                    .await
            })
            .await?;
        debug!(sort_key = %evaluated.sort_key, "state read");
        Ok(SortKeyCacheResult::new(evaluated.sort_key, evaluated.result))
    }

    /// Tags a real interaction with `input` would carry: the contract and
    /// input tags plus one `Interact-Write` tag per contract the
    /// interaction writes into.
    ///
    /// The interaction is dry-run first; a failing interaction is rejected.
    #[instrument(skip(self, input), fields(contract_id = %self.contract_id))]
    pub async fn prepare_interaction_tags(
        &self,
        input: &Value,
        caller: Option<&str>,
    ) -> Result<Vec<Tag>, EvalError> {
        let result = self.dry_write(input, caller).await?;
        if !result.is_ok() {
            return Err(EvalError::InteractionRejected(result.message().to_string()));
        }
        let writes = match self.call_stack() {
            Some(stack) if self.options.internal_writes => InnerWritesEvaluator::new().eval(&stack),
            _ => Vec::new(),
        };
        info!(interact_writes = writes.len(), "interaction tags prepared");
        Ok(interaction_tags(&self.contract_id, input, &writes))
    }

    async fn speculate(
        &self,
        input: &Value,
        caller: Option<&str>,
        view: bool,
    ) -> Result<InteractionResult, EvalError> {
        let base = self.read_state(None).await?;
        let block = self
            .core
            .network_info()
            .ok_or_else(|| LoaderError::Unavailable("no network info provider".to_string()))?
            .current_block()
            .await?;
        let caller = match caller {
            Some(caller) => caller.to_string(),
            None => {
                let evolved = evolved_src(&base.cached_value.state);
                self.core
                    .definition_loader()
                    .load(&self.contract_id, evolved.as_deref())
                    .await?
                    .owner
            }
        };

        let tx_id = dummy_tx_id();
        let sort_key: SortKey = self
            .core
            .sorter()
            .create_sort_key(&block.id, &tx_id, block.height, true);
        let record = InteractionRecord::new(
            tx_id,
            caller,
            block,
            interaction_tags(&self.contract_id, input, &[]),
        )
        .with_sort_key(sort_key)
        .dry();

        self.run_in_session(false, CancellationSignal::never(), |session| async move {
            session.evaluate_dry(base, record, view).await
        })
        .await
    }

    /// Run `operation` in a fresh session. Reads commit on success; every
    /// other outcome rolls back.
    async fn run_in_session<T, F, Fut>(
        &self,
        persist: bool,
        signal: CancellationSignal,
        operation: F,
    ) -> Result<T, EvalError>
    where
        F: FnOnce(Arc<EvaluationSession>) -> Fut,
        Fut: Future<Output = Result<T, EvalError>>,
    {
        self.options.validate()?;
        let session = Arc::new(EvaluationSession::new(
            Arc::clone(&self.core),
            self.options.clone(),
            &self.contract_id,
            persist,
            signal,
        ));
        session.begin().await?;
        let mut guard = RollbackOnDrop::new(&session);

        let result = operation(Arc::clone(&session)).await;
        let commit = result.is_ok() && session.persists();
        let finished = session.finish(commit).await;
        guard.disarm();
        *self.call_stack.lock() = Some(session.call_stack());

        match (&result, finished) {
            (Ok(_), Ok(())) => metric_inc!(EVALUATIONS, &["ok"]),
            (Ok(_), Err(err)) => {
                metric_inc!(EVALUATIONS, &["error"]);
                log_event!(error, "contract", "closing the evaluation failed", contract_id = %self.contract_id, error = %err);
                return Err(err);
            }
            (Err(EvalError::Cancelled), _) => {
                metric_inc!(EVALUATIONS, &["cancelled"]);
                log_event!(info, "contract", "evaluation cancelled", contract_id = %self.contract_id);
            }
            (Err(err), _) => {
                metric_inc!(EVALUATIONS, &["error"]);
                log_event!(error, "contract", "evaluation failed", contract_id = %self.contract_id, error = %err, kind = ?err.kind());
            }
        }
        result
    }
}

#[async_trait]
impl SmartWeaveContract for HandlerBasedContract {
    fn contract_id(&self) -> &str {
        &self.contract_id
    }

    async fn read_state(
        &self,
        target: Option<ReadTarget>,
    ) -> Result<SortKeyCacheResult<EvalStateResult>, EvalError> {
        self.read_state_with_cancellation(target, CancellationSignal::never())
            .await
    }

    #[instrument(skip(self, input), fields(contract_id = %self.contract_id))]
    async fn dry_write(
        &self,
        input: &Value,
        caller: Option<&str>,
    ) -> Result<InteractionResult, EvalError> {
        self.speculate(input, caller, false).await
    }

    #[instrument(skip(self, input), fields(contract_id = %self.contract_id))]
    async fn view_state(&self, input: &Value) -> Result<InteractionResult, EvalError> {
        self.speculate(input, None, true).await
    }
}
