use std::sync::Arc;

use async_trait::async_trait;
use handoff_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use tracing::{error, info};

use super::session_keys;
use crate::clients::ChatModel;
use crate::prompts::{REFERENCE_SUMMARY_SYSTEM, reference_summary_prompt};
use crate::references::ReferenceDocument;

/// Asks the model for the treatment-relevant part of each retrieved reference
pub struct TreatmentSummaryTask {
    model: Arc<dyn ChatModel>,
}

impl TreatmentSummaryTask {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Task for TreatmentSummaryTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let patient_state: String = context.require(session_keys::PATIENT_STATE)?;
        let references: Vec<ReferenceDocument> = context.get(session_keys::REFERENCES).unwrap_or_default();

        let mut summaries: Vec<(String, String)> = Vec::with_capacity(references.len());
        for reference in &references {
            let prompt = reference_summary_prompt(&patient_state, reference);
            let summary = self
                .model
                .prompt(REFERENCE_SUMMARY_SYSTEM, &prompt)
                .await
                .map_err(|e| {
                    error!(source = %reference.source, error = %e, "reference summary failed");
                    GraphError::TaskExecutionFailed(format!(
                        "Reference summary failed for {}: {e}",
                        reference.source
                    ))
                })?;
            summaries.push((reference.source.clone(), summary.trim().to_string()));
        }

        info!(summaries = summaries.len(), "reference summaries generated");
        context.set(session_keys::REFERENCE_SUMMARIES, &summaries)?;

        Ok(TaskResult::new(None, NextAction::Continue))
    }
}
