use handoff_flow::Message;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub should_end: bool,
    pub conversation: Vec<Message>,
    /// Always null here; briefs come from `/generate_medical_brief`
    pub medical_brief: Option<String>,
}

/// `/chat` failures are reported with HTTP 200 and this body
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatErrorResponse {
    pub error: String,
    pub should_end: bool,
}

impl ChatErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            should_end: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BriefRequest {
    #[serde(default)]
    pub conversation: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BriefResponse {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HospitalSendResponse {
    pub status: String,
    pub message: String,
}
