//! Prompt templates sent to the chat model.

use handoff_flow::Message;

use crate::references::ReferenceDocument;
use crate::turns::ConversationStage;

const BASE_FORMAT_INSTRUCTION: &str = r#"당신은 119 구급대원을 실시간으로 지원하는 응급의학 AI입니다.
항상 한국어로, 현장에서 바로 읽을 수 있도록 짧고 명확하게 답하세요.
권고 사항은 1. 2. 3. 4. 처럼 번호를 붙여 최대 4개까지 제시하고, 각 항목은 한두 문장으로 작성하세요.
확실하지 않은 내용은 추정이라고 밝히고, 약물 용량은 표준 프로토콜 범위 안에서만 언급하세요."#;

const INTAKE_BLOCK: &str = r#"[현재 단계: 정보 수집]
구급대원의 첫 보고입니다. 환자의 나이, 성별, 주증상, 의식 수준, 활력징후(혈압, 맥박, 호흡수, 산소포화도, 체온) 중
아직 보고되지 않은 핵심 정보를 번호 목록으로 질문하세요. 아직 진단을 내리지 마세요."#;

const INITIAL_ACTION_BLOCK: &str = r#"[현재 단계: 초기 처치]
지금까지의 보고를 바탕으로 현장에서 즉시 시행해야 할 처치(기도, 호흡, 순환 확보 등)를 우선순위대로 제시하세요.
처치를 결정하는 데 꼭 필요한 추가 정보가 있다면 마지막에 한 가지만 질문하세요."#;

const DIFFERENTIAL_BLOCK: &str = r#"[현재 단계: 감별 진단 및 계획]
가능성이 높은 감별 진단을 근거와 함께 제시하고, 이송 중 시행할 처치 계획과 모니터링 항목을 정리하세요.
마지막으로 최종 판단 전에 확인할 사항을 한 가지 질문하세요."#;

const FINAL_DISPOSITION_BLOCK: &str = r#"[현재 단계: 최종 판단]
대화를 마무리합니다. 추정 진단, 중증도, 권장 이송 병원 유형(권역응급의료센터, 지역응급의료센터 등),
이송 중 주의 사항을 정리하세요. 더 이상 질문하지 말고, 병원 브리핑을 준비하겠다는 말로 끝내세요."#;

/// System instruction for one turn of the turn-gated dialogue
pub fn stage_instruction(stage: ConversationStage) -> String {
    let block = match stage {
        ConversationStage::Intake => INTAKE_BLOCK,
        ConversationStage::InitialAction => INITIAL_ACTION_BLOCK,
        ConversationStage::Differential => DIFFERENTIAL_BLOCK,
        ConversationStage::FinalDisposition => FINAL_DISPOSITION_BLOCK,
    };
    format!("{BASE_FORMAT_INSTRUCTION}\n\n{block}")
}

pub const REFERENCE_SUMMARY_SYSTEM: &str =
    "당신은 응급의학 문헌을 요약하는 전문가입니다. 환자 치료에 직접 쓰이는 내용만 뽑아냅니다.";

pub fn reference_summary_prompt(patient_state: &str, reference: &ReferenceDocument) -> String {
    format!(
        r#"아래 참고 문서에서 현재 환자의 처치와 관련된 내용만 요약하세요.
적응증, 처치 순서, 약물과 용량, 금기 사항, 이송 기준을 중심으로 5줄 이내로 정리하고,
관련 내용이 없으면 "관련 내용 없음"이라고만 답하세요.

환자 상태:
{patient_state}

참고 문서 ({source}):
{text}"#,
        source = reference.source,
        text = reference.full_text,
    )
}

pub const TREATMENT_REASONING_SYSTEM: &str = "당신은 구급대원에게 현장 처치를 조언하는 응급의학 전문의입니다. 근거가 된 참고 문서를 밝히고, 한국어로 답합니다.";

pub fn treatment_reasoning_prompt(patient_state: &str, summaries: &[(String, String)]) -> String {
    let references = if summaries.is_empty() {
        "(관련 참고 문서 없음. 일반적인 응급처치 원칙에 따라 판단하세요.)".to_string()
    } else {
        summaries
            .iter()
            .map(|(source, summary)| format!("- [{source}] {summary}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"환자 상태와 참고 문서 요약을 함께 검토해 현장 처치 조언을 작성하세요.

1. 가장 가능성 높은 상황 판단
2. 지금 시행할 처치
3. 이송 중 모니터링 항목
4. 병원에 미리 알릴 사항

판단에 필요한 정보가 부족하면 무엇이 더 필요한지 질문하세요.
정보가 충분하면 답변 마지막에 정확히 "추가 정보가 필요하지 않습니다"라고 쓰세요.

환자 상태:
{patient_state}

참고 문서 요약:
{references}"#
    )
}

pub const MEDICAL_BRIEF_SYSTEM: &str =
    "당신은 구급대원과 AI의 대화를 바탕으로 병원 인계 브리핑을 작성하는 응급의학 AI입니다.";

pub fn medical_brief_prompt(transcript: &str) -> String {
    format!(
        r#"다음은 구급대원과 AI의 현장 대화 기록입니다. 이를 바탕으로 수용 병원 의료진에게 전달할 인계 브리핑을 작성하세요.

반드시 아래 네 개의 번호 섹션을 이 순서대로 작성하고, 각 섹션의 내용은 "- "로 시작하는 항목으로 나열하세요.

1. 환자 정보 (나이, 성별, 주증상, 발생 시각 및 경위)
2. 활력징후 및 주요 소견
3. 현장 및 이송 중 처치 내역
4. 추정 진단 및 병원 도착 후 권장 조치

대화에 없는 정보는 지어내지 말고 "확인 안 됨"이라고 쓰세요.

대화 기록:
{transcript}"#
    )
}

/// One `[role] content` line per message
pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("[{}] {}", m.role.as_str(), m.content.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_stage_shares_the_base_instruction() {
        let stages = [
            ConversationStage::Intake,
            ConversationStage::InitialAction,
            ConversationStage::Differential,
            ConversationStage::FinalDisposition,
        ];
        let instructions: Vec<String> = stages.iter().map(|s| stage_instruction(*s)).collect();

        for instruction in &instructions {
            assert!(instruction.starts_with(BASE_FORMAT_INSTRUCTION));
        }
        assert!(instructions[0].contains("정보 수집"));
        assert!(instructions[3].contains("최종 판단"));
    }

    #[test]
    fn transcript_keeps_order_and_roles() {
        let transcript = render_transcript(&[
            Message::user(" 60대 남성 흉통 "),
            Message::assistant("활력징후는?"),
        ]);
        assert_eq!(transcript, "[user] 60대 남성 흉통\n[assistant] 활력징후는?");
    }

    #[test]
    fn reasoning_prompt_notes_missing_references() {
        let prompt = treatment_reasoning_prompt("의식 저하", &[]);
        assert!(prompt.contains("관련 참고 문서 없음"));

        let prompt = treatment_reasoning_prompt(
            "의식 저하",
            &[("저혈당_프로토콜".to_string(), "포도당 투여".to_string())],
        );
        assert!(prompt.contains("- [저혈당_프로토콜] 포도당 투여"));
    }

    #[test]
    fn long_references_reach_the_summarizer_whole() {
        let mut full_text = "개요 ".repeat(5000);
        full_text.push_str("처치: 아스피린 300mg 씹어서 복용");
        let reference = ReferenceDocument {
            source: "급성관상동맥증후군".to_string(),
            full_text,
        };

        let prompt = reference_summary_prompt("60대 남성 흉통", &reference);

        assert!(prompt.contains("참고 문서 (급성관상동맥증후군)"));
        assert!(prompt.ends_with("처치: 아스피린 300mg 씹어서 복용"));
    }
}
