use std::sync::Arc;

use async_trait::async_trait;
use handoff_flow::{Context, GraphError, Message, NextAction, Result, Task, TaskResult};
use tracing::{error, info};

use super::session_keys;
use crate::clients::ChatModel;
use crate::formatting::format_ai_response;

/// Sends the whole conversation plus the turn's system instruction to the chat model
pub struct ChatReplyTask {
    model: Arc<dyn ChatModel>,
}

impl ChatReplyTask {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Task for ChatReplyTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let instruction: String = context.require(session_keys::SYSTEM_INSTRUCTION)?;
        let history = context.conversation().await;

        let reply = self
            .model
            .complete(Some(&instruction), &history)
            .await
            .map_err(|e| {
                error!(error = %e, "chat model call failed");
                GraphError::TaskExecutionFailed(e.to_string())
            })?;

        let formatted = format_ai_response(&reply);
        context.push_message(Message::assistant(formatted.clone())).await;

        info!(reply_chars = formatted.chars().count(), "chat reply generated");

        Ok(TaskResult::new(Some(formatted), NextAction::End))
    }
}
