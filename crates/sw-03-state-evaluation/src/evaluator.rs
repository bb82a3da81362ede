//! # State Evaluator
//!
//! The fold loop: applies the missing interactions of an
//! [`ExecutionContext`] to its base state, one at a time, in sort key order.
//!
//! Per interaction:
//!
//! 1. cancellation and VRF checks
//! 2. open a write set
//! 3. resolve an internal write (`Interact-Write` addressed to this
//!    contract) or run the handler on the interaction input
//! 4. run the context modifiers (evolve)
//! 5. close the write set, publishing it when the interaction is valid and
//!    confirmable
//! 6. store the state when persistence is due and advance the frontier
//!
//! Only the state after a confirmable interaction may become the cache
//! frontier. A dry or unconfirmed interaction is still applied, but the
//! frontier stays at the last confirmable state, and its write set stays
//! provisional: visible to the rest of the session, never published.

use std::sync::Arc;
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use shared_types::{EvalStateResult, InteractionRecord, SortKey};
use sw_01_sort_key::genesis_sort_key;
use sw_02_sort_key_cache::SortKeyCacheResult;
use sw_telemetry::{log_contract_event, metric_inc, time_histogram, INTERACTIONS_EVALUATED, INTERACTION_DURATION, INTERNAL_WRITES};
use tracing::{debug, error, instrument, warn};

use crate::context::ExecutionContext;
use crate::domain::call_stack::{InnerCallType, InteractionCall};
use crate::domain::interaction::{function_name, ResultKind};
use crate::domain::tags::TagsParser;
use crate::errors::{EvalError, HandlerError};
use crate::frame::{ContractInfo, EvaluationFrame, TransactionInfo};
use crate::interaction_state::WriteSet;
use crate::session::{EvaluationSession, Upper};

/// How the last interaction of a fold ended.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StepOutcome {
    pub kind: ResultKind,
    pub output: Option<Value>,
    pub message: Option<String>,
}

impl StepOutcome {
    fn ok(output: Option<Value>) -> Self {
        Self {
            kind: ResultKind::Ok,
            output,
            message: None,
        }
    }

    fn failed(kind: ResultKind, message: String) -> Self {
        Self {
            kind,
            output: None,
            message: Some(message),
        }
    }

    fn from_validity(result: &EvalStateResult, tx_id: &str) -> Self {
        match result.validity_of(tx_id) {
            Some(false) => Self::failed(
                ResultKind::Error,
                result.error_messages.get(tx_id).cloned().unwrap_or_default(),
            ),
            _ => Self::ok(None),
        }
    }
}

/// Result of evaluating a contract up to some sort key.
#[derive(Debug, Clone)]
pub(crate) struct Evaluated {
    /// Sort key of the last applied interaction (or of the cached base).
    pub sort_key: SortKey,
    pub result: EvalStateResult,
    pub last: Option<StepOutcome>,
}

impl Evaluated {
    pub(crate) fn cached(base: SortKeyCacheResult<EvalStateResult>) -> Self {
        Self {
            sort_key: base.sort_key,
            result: base.cached_value,
            last: None,
        }
    }
}

/// Last confirmable position of the fold and whether it is stored.
struct Frontier {
    sort_key: Option<SortKey>,
    persisted: bool,
    /// State at `sort_key`, kept once a non-confirmable interaction moves
    /// the fold past it.
    frozen: Option<EvalStateResult>,
}

impl Frontier {
    fn new(base: Option<SortKey>) -> Self {
        Self {
            sort_key: base,
            persisted: true,
            frozen: None,
        }
    }

    fn freeze(&mut self, current: &EvalStateResult) {
        if !self.persisted && self.frozen.is_none() {
            self.frozen = Some(current.clone());
        }
    }

    fn advance(&mut self, sort_key: SortKey, persisted: bool) {
        self.sort_key = Some(sort_key);
        self.persisted = persisted;
        self.frozen = None;
    }

    fn pending(self, current: &EvalStateResult) -> Option<(SortKey, EvalStateResult)> {
        if self.persisted {
            return None;
        }
        let sort_key = self.sort_key?;
        Some((sort_key, self.frozen.unwrap_or_else(|| current.clone())))
    }
}

pub(crate) struct StateEvaluator {
    session: Arc<EvaluationSession>,
    tags: TagsParser,
}

impl StateEvaluator {
    pub(crate) fn new(session: Arc<EvaluationSession>) -> Self {
        Self {
            session,
            tags: TagsParser::new(),
        }
    }

    /// Fold `ctx`. On failure every write set opened by this fold is dropped.
    pub(crate) fn eval(self, ctx: ExecutionContext) -> BoxFuture<'static, Result<Evaluated, EvalError>> {
        async move {
            let depth = self.session.write_set_depth();
            let result = self.fold(ctx).await;
            if let Err(err) = &result {
                self.session.truncate_write_sets(depth);
                debug!(error = %err, "fold aborted");
            }
            result
        }
        .boxed()
    }

    #[instrument(
        skip(self, ctx),
        fields(contract_id = %ctx.contract_id, interactions = ctx.interactions.len())
    )]
    async fn fold(&self, mut ctx: ExecutionContext) -> Result<Evaluated, EvalError> {
        let options = self.session.options().clone();
        let interactions = std::mem::take(&mut ctx.interactions);
        let mut current = ctx.initial_result();
        let mut frontier = Frontier::new(ctx.base.as_ref().map(|b| b.sort_key.clone()));
        let mut last_key = frontier.sort_key.clone();
        let mut last = None;
        let mut applied: u64 = 0;

        for interaction in &interactions {
            self.session.cancellation().check()?;
            let sort_key = interaction
                .sort_key
                .clone()
                .ok_or_else(|| EvalError::MissingSortKey {
                    tx_id: interaction.id.clone(),
                })?;
            self.verify_vrf(interaction, &sort_key)?;

            let confirmable = interaction.is_confirmable();
            if !confirmable {
                frontier.freeze(&current);
            }

            let started = Instant::now();
            let timer = time_histogram!(INTERACTION_DURATION);
            self.session
                .push_write_set(WriteSet::new(&ctx.contract_id, &interaction.id, &sort_key));

            let step = if options.internal_writes
                && self.tags.is_interact_write(interaction, &ctx.contract_id)
            {
                self.resolve_internal_write(&ctx, interaction, &sort_key, &mut current)
                    .await?
            } else {
                self.apply(&ctx, interaction, &sort_key, &mut current).await?
            };
            let Some(step) = step else {
                self.session.pop_write_set();
                drop(timer);
                metric_inc!(INTERACTIONS_EVALUATED, &["skipped"]);
                continue;
            };
            applied += 1;
            last_key = Some(sort_key.clone());

            let mut stop = false;
            for modifier in self.session.core().modifiers() {
                let modified = modifier
                    .modify(&current.state, &ctx, self.session.core(), &options)
                    .await;
                match modified {
                    Ok(Some(next)) => ctx = next,
                    Ok(None) => {}
                    Err(err @ EvalError::NonWhitelistedSource { .. }) => {
                        warn!(tx_id = %interaction.id, error = %err, "evolve into non-whitelisted source");
                        current.record_invalid(&interaction.id, &err.to_string());
                        stop = true;
                        break;
                    }
                    Err(err) => return Err(err),
                }
            }

            let valid = current
                .validity_of(&interaction.id)
                .ok_or_else(|| EvalError::ValidityNotSet {
                    contract_id: ctx.contract_id.clone(),
                    tx_id: interaction.id.clone(),
                })?;

            let write_set = self.session.pop_write_set();
            let wrote = write_set.as_ref().is_some_and(|ws| !ws.is_empty());
            match write_set {
                Some(write_set) if valid && confirmable => {
                    self.session.commit_write_set(write_set).await?;
                }
                Some(write_set) if valid => self.session.keep_provisional(write_set),
                _ => {}
            }

            if confirmable {
                let interval_due = options
                    .cache_every_n_interactions
                    .is_some_and(|n| applied.checked_rem(n) == Some(0));
                let persist = options.persists_each_interaction() || interval_due || wrote;
                if persist {
                    self.session
                        .put_state(&ctx.contract_id, &sort_key, current.clone())
                        .await?;
                }
                frontier.advance(sort_key.clone(), persist);
            }

            self.session
                .finish_call(ctx.record, &interaction.id, &current, started.elapsed());
            drop(timer);
            metric_inc!(INTERACTIONS_EVALUATED, &[step.kind.as_str()]);
            last = Some(step);
            if stop {
                break;
            }
        }

        if let Some((sort_key, result)) = frontier.pending(&current) {
            self.session
                .put_state(&ctx.contract_id, &sort_key, result)
                .await?;
        }

        debug!(applied, "fold finished");
        Ok(Evaluated {
            sort_key: last_key.unwrap_or_else(genesis_sort_key),
            result: current,
            last,
        })
    }

    fn verify_vrf(&self, interaction: &InteractionRecord, sort_key: &SortKey) -> Result<(), EvalError> {
        let Some(vrf) = &interaction.vrf else {
            return Ok(());
        };
        match self.session.core().vrf_verifier() {
            Some(verifier) if !verifier.verify(vrf, sort_key) => {
                error!(tx_id = %interaction.id, sort_key = %sort_key, "VRF verification failed");
                Err(EvalError::VrfVerificationFailed {
                    tx_id: interaction.id.clone(),
                    sort_key: sort_key.clone(),
                })
            }
            Some(_) => Ok(()),
            None => {
                warn!(tx_id = %interaction.id, "no VRF verifier configured, accepting payload");
                Ok(())
            }
        }
    }

    /// Run the contract handler on the interaction input. `None` when the
    /// interaction carries no usable input.
    async fn apply(
        &self,
        ctx: &ExecutionContext,
        interaction: &InteractionRecord,
        sort_key: &SortKey,
        current: &mut EvalStateResult,
    ) -> Result<Option<StepOutcome>, EvalError> {
        let input = match self.tags.input(interaction, &ctx.contract_id) {
            Ok(input) => input,
            Err(reason) => {
                warn!(
                    contract_id = %ctx.contract_id,
                    tx_id = %interaction.id,
                    ?reason,
                    "skipping interaction without usable input"
                );
                return Ok(None);
            }
        };

        self.session.register_call(
            ctx.record,
            InteractionCall::new(
                &interaction.id,
                interaction.caller(),
                function_name(&input),
                interaction.dry,
            ),
        );
        let frame = EvaluationFrame::new(
            Arc::clone(&self.session),
            ctx.record,
            ContractInfo::from(&ctx.definition),
            TransactionInfo::new(interaction, sort_key),
            interaction.caller().to_string(),
            ctx.chain.extended(&ctx.contract_id, &interaction.id, sort_key),
            ctx.view,
        );
        let outcome = self
            .session
            .invoke(
                &ctx.contract_id,
                &frame,
                ctx.handler.as_ref(),
                current.state.clone(),
                &input,
            )
            .await?;

        let step = match outcome {
            Ok(output) => {
                current.state = output.state;
                current.record_valid(&interaction.id);
                StepOutcome::ok(output.result)
            }
            Err(HandlerError::Rejected(message)) => {
                current.record_invalid(&interaction.id, &message);
                StepOutcome::failed(ResultKind::Error, message)
            }
            Err(HandlerError::Exception(message)) => {
                if !self.session.options().ignore_exceptions {
                    error!(
                        contract_id = %ctx.contract_id,
                        tx_id = %interaction.id,
                        %message,
                        "exception in contract handler"
                    );
                    return Err(EvalError::RuntimeException {
                        contract_id: ctx.contract_id.clone(),
                        tx_id: interaction.id.clone(),
                        message,
                    });
                }
                current.record_invalid(&interaction.id, &message);
                StepOutcome::failed(ResultKind::Exception, message)
            }
            Err(HandlerError::Fatal(err)) => {
                log_contract_event!(
                    error,
                    "evaluator",
                    "fatal error in contract handler",
                    ctx.contract_id,
                    sort_key,
                    tx_id = %interaction.id,
                    error = %err
                );
                return Err(err);
            }
        };
        Ok(Some(step))
    }

    /// Adopt the state written into this contract by the interaction's
    /// writer, evaluating the writer first when it is not known yet.
    async fn resolve_internal_write(
        &self,
        ctx: &ExecutionContext,
        interaction: &InteractionRecord,
        sort_key: &SortKey,
        current: &mut EvalStateResult,
    ) -> Result<Option<StepOutcome>, EvalError> {
        let tx_id = &interaction.id;
        self.session.register_call(
            ctx.record,
            InteractionCall::new(tx_id, interaction.caller(), None, interaction.dry),
        );

        if let Some(known) = self.session.state_at_exactly(&ctx.contract_id, sort_key).await? {
            debug!(tx_id = %tx_id, "internal write already evaluated");
            *current = known;
            return Ok(Some(StepOutcome::from_validity(current, tx_id)));
        }

        let Some(writer) = self.tags.contract(interaction).map(str::to_string) else {
            let message = "[InternalWriteMissing] no writing contract".to_string();
            current.record_invalid(tx_id, &message);
            return Ok(Some(StepOutcome::failed(ResultKind::Error, message)));
        };

        debug!(writer = %writer, tx_id = %tx_id, "evaluating writer of internal write");
        let child = self
            .session
            .add_child(ctx.record, tx_id, &writer, InnerCallType::Read)?;
        let chain = ctx.chain.extended(&ctx.contract_id, tx_id, sort_key);
        let writer_state = self
            .session
            .read_state_at(child, writer.clone(), Upper::Inclusive(sort_key.clone()), chain)
            .await?;

        if writer_state.result.validity_of(tx_id) == Some(false) {
            let message = writer_state
                .result
                .error_messages
                .get(tx_id)
                .cloned()
                .unwrap_or_else(|| "Parent errorMessage not set".to_string());
            current.record_invalid(tx_id, &message);
            metric_inc!(INTERNAL_WRITES, &["error"]);
            return Ok(Some(StepOutcome::failed(ResultKind::Error, message)));
        }

        match self.session.state_at_exactly(&ctx.contract_id, sort_key).await? {
            Some(written) => {
                *current = written;
                Ok(Some(StepOutcome::from_validity(current, tx_id)))
            }
            None => {
                let message = format!(
                    "[InternalWriteMissing] {writer} did not write into {} at {sort_key}",
                    ctx.contract_id
                );
                warn!(tx_id = %tx_id, "{message}");
                current.record_invalid(tx_id, &message);
                Ok(Some(StepOutcome::failed(ResultKind::Error, message)))
            }
        }
    }
}
