//! Contracts written to by a (dry) interaction.
//!
//! Walks the write edges of a call stack and collects every contract that
//! received an internal write, except the root contract itself. The result
//! becomes the `Interact-Write` tag list of a new interaction.

use shared_types::ContractId;

use super::call_stack::{CallRecord, ContractCallStack, InnerCallType};

#[derive(Debug, Clone, Copy, Default)]
pub struct InnerWritesEvaluator;

impl InnerWritesEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Distinct written contracts, in discovery order.
    #[must_use]
    pub fn eval(&self, stack: &ContractCallStack) -> Vec<ContractId> {
        let mut result = Vec::new();
        let root_id = stack.root().contract_id.clone();
        self.visit(stack, stack.root(), &root_id, &mut result);
        result
    }

    fn visit(
        &self,
        stack: &ContractCallStack,
        record: &CallRecord,
        root_id: &str,
        result: &mut Vec<ContractId>,
    ) {
        for call in &record.interactions {
            for child_id in call.foreign_calls.values() {
                let Some(child) = stack.record(*child_id) else {
                    continue;
                };
                if child.inner_call_type != Some(InnerCallType::Write) {
                    continue;
                }
                if child.interactions.iter().any(|c| c.dry_write)
                    && child.contract_id != root_id
                    && !result.contains(&child.contract_id)
                {
                    result.push(child.contract_id.clone());
                }
                self.visit(stack, child, root_id, result);
            }
        }
    }
}
