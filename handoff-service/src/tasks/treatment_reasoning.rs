use std::sync::Arc;

use async_trait::async_trait;
use handoff_flow::{Context, GraphError, Message, NextAction, Result, Task, TaskResult};
use tracing::{error, info};

use super::session_keys;
use crate::clients::ChatModel;
use crate::formatting::format_ai_response;
use crate::prompts::{TREATMENT_REASONING_SYSTEM, treatment_reasoning_prompt};
use crate::turns::info_sufficient;

/// Final retrieval step: joint reasoning over every reference summary and the patient state
pub struct TreatmentReasoningTask {
    model: Arc<dyn ChatModel>,
}

impl TreatmentReasoningTask {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Task for TreatmentReasoningTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let patient_state: String = context.require(session_keys::PATIENT_STATE)?;
        let summaries: Vec<(String, String)> = context
            .get(session_keys::REFERENCE_SUMMARIES)
            .unwrap_or_default();

        let prompt = treatment_reasoning_prompt(&patient_state, &summaries);
        let advice = self
            .model
            .prompt(TREATMENT_REASONING_SYSTEM, &prompt)
            .await
            .map_err(|e| {
                error!(error = %e, "treatment reasoning failed");
                GraphError::TaskExecutionFailed(format!("Treatment reasoning failed: {e}"))
            })?;

        let required_info = !info_sufficient(&advice);
        let formatted = format_ai_response(&advice);

        context.set(session_keys::REQUIRED_INFO, required_info)?;
        context.set(session_keys::SHOULD_END, !required_info)?;
        context.push_message(Message::assistant(formatted.clone())).await;

        info!(
            references = summaries.len(),
            required_info, "treatment advice generated"
        );

        Ok(TaskResult::new_with_status(
            Some(formatted),
            NextAction::End,
            Some(if required_info {
                "more patient information requested".to_string()
            } else {
                "patient information sufficient".to_string()
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::test_support::ScriptedModel;

    async fn run_with_reply(reply: &str) -> (Context, TaskResult) {
        let task = TreatmentReasoningTask::new(Arc::new(ScriptedModel::new(reply)));
        let context = Context::new();
        context.set(session_keys::PATIENT_STATE, "의식 저하, 혈당 40").unwrap();
        let result = task.run(context.clone()).await.unwrap();
        (context, result)
    }

    #[tokio::test]
    async fn sufficiency_phrase_ends_the_dialogue() {
        let (context, result) =
            run_with_reply("1. 저혈당 2. 포도당 투여 추가 정보가 필요하지 않습니다").await;

        assert_eq!(context.get::<bool>(session_keys::REQUIRED_INFO), Some(false));
        assert_eq!(context.get::<bool>(session_keys::SHOULD_END), Some(true));
        assert!(result.response.unwrap().starts_with("1. 저혈당\n\n2."));
    }

    #[tokio::test]
    async fn other_replies_keep_asking() {
        let (context, _) = run_with_reply("복용 중인 약물을 확인해 주세요.").await;

        assert_eq!(context.get::<bool>(session_keys::REQUIRED_INFO), Some(true));
        assert_eq!(context.get::<bool>(session_keys::SHOULD_END), Some(false));
        assert_eq!(context.conversation().await.len(), 1);
    }
}
