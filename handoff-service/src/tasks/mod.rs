pub mod chat_reply;
pub mod medical_brief;
pub mod reference_retrieval;
pub mod treatment_reasoning;
pub mod treatment_summary;
pub mod turn_gate;

pub use chat_reply::ChatReplyTask;
pub use medical_brief::MedicalBriefTask;
pub use reference_retrieval::ReferenceRetrievalTask;
pub use treatment_reasoning::TreatmentReasoningTask;
pub use treatment_summary::TreatmentSummaryTask;
pub use turn_gate::TurnGateTask;

/// Context keys shared between tasks and the HTTP layer
pub mod session_keys {
    pub const USER_TURNS: &str = "user_turns";
    pub const STAGE: &str = "stage";
    pub const SYSTEM_INSTRUCTION: &str = "system_instruction";
    pub const SHOULD_END: &str = "should_end";
    pub const PATIENT_STATE: &str = "patient_state";
    pub const REFERENCES: &str = "references";
    pub const REFERENCE_SUMMARIES: &str = "reference_summaries";
    pub const REQUIRED_INFO: &str = "required_info";
}
