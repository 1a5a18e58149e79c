use async_trait::async_trait;
use handoff_flow::{Context, NextAction, Result, Role, Task, TaskResult};
use tracing::info;

use super::session_keys;
use crate::prompts::stage_instruction;
use crate::turns::{ConversationStage, should_end_after};

/// Picks the prompt for this turn from the number of user messages so far
pub struct TurnGateTask;

#[async_trait]
impl Task for TurnGateTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let user_turns = context.count_role(Role::User).await;
        let stage = ConversationStage::from_user_turns(user_turns);
        let should_end = should_end_after(user_turns);

        info!(user_turns, ?stage, should_end, "turn gate evaluated");

        context.set(session_keys::USER_TURNS, user_turns)?;
        context.set(session_keys::STAGE, stage)?;
        context.set(session_keys::SHOULD_END, should_end)?;
        context.set(session_keys::SYSTEM_INSTRUCTION, stage_instruction(stage))?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some(format!("user turn {user_turns}, stage {stage:?}")),
        ))
    }
}
