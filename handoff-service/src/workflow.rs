use std::sync::Arc;

use handoff_flow::{Graph, GraphBuilder, Task};

use crate::clients::{ChatModel, SimilaritySearch};
use crate::config::{ChatStrategy, RetrievalConfig};
use crate::references::ReferenceDocument;
use crate::tasks::*;

/// Turn-gated dialogue: choose the stage prompt, then ask the model
pub fn build_turn_gated_workflow(model: Arc<dyn ChatModel>) -> Graph {
    let turn_gate_task = Arc::new(TurnGateTask);
    let turn_gate_id = turn_gate_task.id().to_string();

    let chat_reply_task = Arc::new(ChatReplyTask::new(model));
    let chat_reply_id = chat_reply_task.id().to_string();

    GraphBuilder::new("turn_gated_chat")
        .add_task(turn_gate_task)
        .add_task(chat_reply_task)
        .add_edge(turn_gate_id, chat_reply_id)
        .build()
}

/// Retrieval-augmented dialogue: search, summarize each reference, reason over all of them.
/// Summarization is skipped when no reference survived retrieval.
pub fn build_retrieval_workflow(
    model: Arc<dyn ChatModel>,
    search: Arc<dyn SimilaritySearch>,
    config: &RetrievalConfig,
) -> Graph {
    let retrieval_task = Arc::new(ReferenceRetrievalTask::new(search, config));
    let retrieval_id = retrieval_task.id().to_string();

    let summary_task = Arc::new(TreatmentSummaryTask::new(model.clone()));
    let summary_id = summary_task.id().to_string();

    let reasoning_task = Arc::new(TreatmentReasoningTask::new(model));
    let reasoning_id = reasoning_task.id().to_string();

    GraphBuilder::new("retrieval_chat")
        .add_task(retrieval_task)
        .add_task(summary_task)
        .add_task(reasoning_task)
        .add_conditional_edge(
            retrieval_id,
            |context| {
                context
                    .get::<Vec<ReferenceDocument>>(session_keys::REFERENCES)
                    .is_some_and(|refs| !refs.is_empty())
            },
            summary_id.clone(),
            reasoning_id.clone(),
        )
        .add_edge(summary_id, reasoning_id)
        .build()
}

pub fn build_brief_workflow(model: Arc<dyn ChatModel>) -> Graph {
    GraphBuilder::new("medical_brief")
        .add_task(Arc::new(MedicalBriefTask::new(model)))
        .build()
}

/// Graphs built once at startup and shared by every request
pub struct Workflows {
    pub strategy: ChatStrategy,
    pub chat: Arc<Graph>,
    pub brief: Arc<Graph>,
}

impl Workflows {
    pub fn turn_gated(model: Arc<dyn ChatModel>) -> Self {
        Self {
            strategy: ChatStrategy::TurnGated,
            chat: Arc::new(build_turn_gated_workflow(model.clone())),
            brief: Arc::new(build_brief_workflow(model)),
        }
    }

    pub fn retrieval(
        model: Arc<dyn ChatModel>,
        search: Arc<dyn SimilaritySearch>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            strategy: ChatStrategy::Retrieval,
            chat: Arc::new(build_retrieval_workflow(model.clone(), search, config)),
            brief: Arc::new(build_brief_workflow(model)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::test_support::{FixedSearch, ScriptedModel, hit};
    use handoff_flow::{Context, Message};

    fn retrieval_config(dir: &std::path::Path) -> RetrievalConfig {
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
    async fn turn_gated_run_visits_gate_then_reply() {
        let graph = build_turn_gated_workflow(Arc::new(ScriptedModel::new("확인했습니다")));
        let context = Context::with_conversation(vec![Message::user("교통사고 환자")]);

        let result = graph.execute(context).await.unwrap();

        assert_eq!(result.visited.len(), 2);
        assert!(result.visited[0].ends_with("TurnGateTask"));
        assert_eq!(result.response.as_deref(), Some("확인했습니다"));
    }

    #[tokio::test]
    async fn retrieval_skips_summaries_when_nothing_survives() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedModel::new("추가 정보가 필요하지 않습니다"));
        let search = Arc::new(FixedSearch::new(vec![hit("1", 0.05, "low_score")]));
        let graph = build_retrieval_workflow(model.clone(), search, &retrieval_config(dir.path()));
        let context = Context::with_conversation(vec![Message::user("두통")]);

        let result = graph.execute(context.clone()).await.unwrap();

        assert_eq!(result.visited.len(), 2);
        assert!(result.visited[1].ends_with("TreatmentReasoningTask"));
        // only the reasoning call reached the model
        assert_eq!(model.call_count(), 1);
        assert_eq!(context.get::<bool>(session_keys::SHOULD_END), Some(true));
        assert_eq!(
            result.status_message.as_deref(),
            Some("patient information sufficient")
        );
    }

    #[tokio::test]
    async fn retrieval_summarizes_each_loaded_reference() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("뇌졸중.json"),
            r#"{"source": "뇌졸중", "full_text": "FAST 평가, 발생 시각 확인"}"#,
        )
        .unwrap();
        let model = Arc::new(ScriptedModel::with_replies(
            &["발생 시각이 중요", "편측 마비 여부를 알려주세요"],
            "unused",
        ));
        let search = Arc::new(FixedSearch::new(vec![
            hit("1", 0.8, "뇌졸중"),
            hit("2", 0.6, "파일_없음"),
        ]));
        let graph = build_retrieval_workflow(model.clone(), search, &retrieval_config(dir.path()));
        let context = Context::with_conversation(vec![Message::user("갑자기 말이 어눌해짐")]);

        let result = graph.execute(context.clone()).await.unwrap();

        assert_eq!(result.visited.len(), 3);
        assert_eq!(model.call_count(), 2);
        assert_eq!(result.response.as_deref(), Some("편측 마비 여부를 알려주세요"));
        assert_eq!(context.get::<bool>(session_keys::REQUIRED_INFO), Some(true));
    }
}
