use handoff_flow::{Message, Role};
use serde::{Deserialize, Serialize};

/// Number of user turns after which the turn-gated dialogue is over
pub const FINAL_USER_TURN: usize = 4;

/// Phrases the treatment-reasoning reply uses to say it needs nothing more
pub const INFO_SUFFICIENT_PHRASES: [&str; 2] = ["추가 정보가 필요하지 않습니다", "충분한 정보를 수집했습니다"];

/// Where the paramedic dialogue stands, derived only from the number of user turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStage {
    /// Gather the basic patient picture
    Intake,
    /// Recommend the first on-scene actions
    InitialAction,
    /// Differential diagnosis and treatment plan
    Differential,
    /// Final disposition and transport
    FinalDisposition,
}

impl ConversationStage {
    pub fn from_user_turns(user_turns: usize) -> Self {
        match user_turns.saturating_sub(1) {
            0 => ConversationStage::Intake,
            1 => ConversationStage::InitialAction,
            2 => ConversationStage::Differential,
            _ => ConversationStage::FinalDisposition,
        }
    }
}

pub fn count_user_turns(messages: &[Message]) -> usize {
    messages.iter().filter(|m| m.role == Role::User).count()
}

/// The turn-gated dialogue ends on exactly the fourth user turn
pub fn should_end_after(user_turns: usize) -> bool {
    user_turns == FINAL_USER_TURN
}

/// True when the reply says no further patient information is required
pub fn info_sufficient(reply: &str) -> bool {
    INFO_SUFFICIENT_PHRASES.iter().any(|phrase| reply.contains(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(user_turns: usize) -> Vec<Message> {
        (0..user_turns)
            .flat_map(|i| {
                [
                    Message::user(format!("보고 {i}")),
                    Message::assistant(format!("응답 {i}")),
                ]
            })
            .collect()
    }

    #[test]
    fn stages_advance_with_user_turns() {
        assert_eq!(ConversationStage::from_user_turns(0), ConversationStage::Intake);
        assert_eq!(ConversationStage::from_user_turns(1), ConversationStage::Intake);
        assert_eq!(ConversationStage::from_user_turns(2), ConversationStage::InitialAction);
        assert_eq!(ConversationStage::from_user_turns(3), ConversationStage::Differential);
        assert_eq!(ConversationStage::from_user_turns(4), ConversationStage::FinalDisposition);
        assert_eq!(ConversationStage::from_user_turns(9), ConversationStage::FinalDisposition);
    }

    #[test]
    fn only_user_messages_count() {
        let mut messages = history(3);
        messages.insert(0, Message::system("지침"));
        assert_eq!(count_user_turns(&messages), 3);
    }

    #[test]
    fn dialogue_ends_on_exactly_the_fourth_turn() {
        assert!(!should_end_after(count_user_turns(&history(3))));
        assert!(should_end_after(count_user_turns(&history(4))));
        assert!(!should_end_after(count_user_turns(&history(5))));
    }

    #[test]
    fn sufficiency_is_a_phrase_match() {
        assert!(info_sufficient("판단 결과 추가 정보가 필요하지 않습니다. 이송하세요."));
        assert!(info_sufficient("충분한 정보를 수집했습니다"));
        assert!(!info_sufficient("혈압을 다시 측정해 주세요."));
    }
}
