//! Thin clients for the hosted services the relay depends on.
//!
//! Each collaborator sits behind a trait so the workflows and the HTTP layer
//! can be exercised with in-process fakes.

pub mod llm;
pub mod search;
pub mod speech;

use std::time::Duration;

pub use llm::{ChatModel, UpstageChatModel};
pub use search::{HostedSimilaritySearch, SearchHit, SimilaritySearch};
pub use speech::{HostedTranscriber, Transcriber};

/// Shared outbound HTTP client
pub fn build_http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(client)
}

/// Turn a non-2xx response into an error that carries the upstream body
pub(crate) async fn ensure_success(
    service: &str,
    response: reqwest::Response,
) -> anyhow::Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(anyhow::anyhow!("{service} request failed: {status} {body}"))
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
