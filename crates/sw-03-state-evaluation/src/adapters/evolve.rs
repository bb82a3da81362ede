//! Context modifier swapping a contract's source when its state asks to
//! evolve.

use async_trait::async_trait;
use serde_json::Value;
use sw_telemetry::log_event;

use crate::config::EvaluationOptions;
use crate::context::ExecutionContext;
use crate::domain::evolve::{evolved_src, is_valid_src_id};
use crate::engine::EngineCore;
use crate::errors::EvalError;
use crate::ports::ExecutionContextModifier;

#[derive(Debug, Clone, Copy, Default)]
pub struct Evolve;

impl Evolve {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutionContextModifier for Evolve {
    async fn modify(
        &self,
        state: &Value,
        ctx: &ExecutionContext,
        core: &EngineCore,
        options: &EvaluationOptions,
    ) -> Result<Option<ExecutionContext>, EvalError> {
        let Some(evolved) = evolved_src(state) else {
            return Ok(None);
        };
        if evolved == ctx.definition.src_tx_id {
            return Ok(None);
        }
        if !is_valid_src_id(&evolved) {
            return Err(EvalError::InvalidEvolveSource(evolved));
        }

        let definition = core
            .definition_loader()
            .load(&ctx.contract_id, Some(&evolved))
            .await?;
        if !options.is_source_allowed(&definition.src_tx_id) {
            return Err(EvalError::NonWhitelistedSource {
                contract_id: ctx.contract_id.clone(),
                src_tx_id: definition.src_tx_id,
            });
        }
        let handler = core.executor_factory().create(&definition, options).await?;
        log_event!(
            info,
            "evolve",
            "contract evolved",
            contract_id = %ctx.contract_id,
            from = %ctx.definition.src_tx_id,
            to = %definition.src_tx_id
        );

        let mut next = ctx.clone();
        next.definition = definition;
        next.handler = handler;
        Ok(Some(next))
    }
}
