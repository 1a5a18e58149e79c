use std::sync::Arc;

use async_trait::async_trait;
use handoff_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use tracing::{debug, error, info, warn};

use super::session_keys;
use crate::clients::{SimilaritySearch, search::filter_hits};
use crate::config::RetrievalConfig;
use crate::references::{ReferenceDocument, ReferenceStore};

/// Finds reference documents for the latest patient report
pub struct ReferenceRetrievalTask {
    search: Arc<dyn SimilaritySearch>,
    store: ReferenceStore,
    top_k: usize,
    score_threshold: f32,
    metadata_key: String,
}

impl ReferenceRetrievalTask {
    pub fn new(search: Arc<dyn SimilaritySearch>, config: &RetrievalConfig) -> Self {
        Self {
            search,
            store: ReferenceStore::new(config.reference_dir.clone()),
            top_k: config.top_k,
            score_threshold: config.score_threshold,
            metadata_key: config.metadata_key.clone(),
        }
    }
}

#[async_trait]
impl Task for ReferenceRetrievalTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let patient_state = context
            .last_user_message()
            .await
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| GraphError::ContextError("no user message to search with".to_string()))?;

        let hits = self
            .search
            .search(&patient_state, self.top_k)
            .await
            .map_err(|e| {
                error!(error = %e, "similarity search failed");
                GraphError::TaskExecutionFailed(format!("Similarity search failed: {e}"))
            })?;
        let total = hits.len();
        let hits = filter_hits(hits, self.score_threshold);

        let mut references: Vec<ReferenceDocument> = Vec::new();
        for hit in &hits {
            let Some(title) = hit.metadata_str(&self.metadata_key) else {
                debug!(hit = %hit.id, key = %self.metadata_key, "hit has no reference title");
                continue;
            };
            match self.store.load(title).await {
                Ok(Some(document)) => {
                    info!(title = %title, score = hit.score, "reference loaded");
                    references.push(document);
                }
                Ok(None) => warn!(title = %title, "no reference file for hit, skipping"),
                Err(e) => warn!(title = %title, error = %e, "skipping unreadable reference"),
            }
        }

        info!(
            total_hits = total,
            kept_hits = hits.len(),
            references = references.len(),
            "reference retrieval completed"
        );

        context.set(session_keys::PATIENT_STATE, &patient_state)?;
        context.set(session_keys::REFERENCES, &references)?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some(format!("{} reference(s) retrieved", references.len())),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::test_support::{FixedSearch, hit};
    use handoff_flow::Message;

    fn config(dir: &std::path::Path) -> RetrievalConfig {
        RetrievalConfig {
            index: None,
            embedding_model: "embedding-query".to_string(),
            top_k: 5,
            score_threshold: 0.2,
            reference_dir: dir.to_path_buf(),
            metadata_key: "source".to_string(),
        }
    }

    #[tokio::test]
    async fn missing_reference_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("아나필락시스.json"),
            r#"{"source": "아나필락시스", "full_text": "에피네프린 0.3mg 근주"}"#,
        )
        .unwrap();

        let search = Arc::new(FixedSearch::new(vec![
            hit("1", 0.9, "없는_문서"),
            hit("2", 0.7, "아나필락시스"),
            hit("3", 0.1, "아나필락시스"),
        ]));
        let task = ReferenceRetrievalTask::new(search.clone(), &config(dir.path()));
        let context = Context::with_conversation(vec![
            Message::user("벌에 쏘인 후 호흡곤란"),
            Message::assistant("혈압은?"),
            Message::user("혈압 70/40, 전신 두드러기"),
        ]);

        task.run(context.clone()).await.unwrap();

        let references: Vec<ReferenceDocument> = context.get(session_keys::REFERENCES).unwrap();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].source, "아나필락시스");

        let queries = search.queries.lock().unwrap();
        assert_eq!(queries[0], ("혈압 70/40, 전신 두드러기".to_string(), 5));
        assert_eq!(
            context.get::<String>(session_keys::PATIENT_STATE).as_deref(),
            Some("혈압 70/40, 전신 두드러기")
        );
    }

    #[tokio::test]
    async fn conversation_without_user_text_fails() {
        let dir = tempfile::tempdir().unwrap();
        let task = ReferenceRetrievalTask::new(Arc::new(FixedSearch::new(vec![])), &config(dir.path()));
        let context = Context::with_conversation(vec![Message::assistant("안녕하세요")]);

        assert!(task.run(context).await.is_err());
    }
}
