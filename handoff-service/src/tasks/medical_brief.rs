use std::sync::Arc;

use async_trait::async_trait;
use handoff_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use tracing::{error, info};

use crate::clients::ChatModel;
use crate::prompts::{MEDICAL_BRIEF_SYSTEM, medical_brief_prompt, render_transcript};

/// Turns the whole field conversation into a four-section hospital handoff brief
pub struct MedicalBriefTask {
    model: Arc<dyn ChatModel>,
}

impl MedicalBriefTask {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Task for MedicalBriefTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let conversation = context.conversation().await;
        if conversation.is_empty() {
            return Err(GraphError::ContextError(
                "conversation is empty, nothing to brief".to_string(),
            ));
        }

        info!(messages = conversation.len(), "generating medical brief");

        let prompt = medical_brief_prompt(&render_transcript(&conversation));
        let brief = self
            .model
            .prompt(MEDICAL_BRIEF_SYSTEM, &prompt)
            .await
            .map_err(|e| {
                error!(error = %e, "medical brief generation failed");
                GraphError::TaskExecutionFailed(format!("Medical brief generation failed: {e}"))
            })?;

        Ok(TaskResult::new_with_status(
            Some(brief),
            NextAction::End,
            Some("medical brief ready".to_string()),
        ))
    }
}
