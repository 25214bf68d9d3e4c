//! LLM-backed knowledge collaborator
//!
//! One chat completion per call. The answer is cleaned of reasoning blocks and
//! markdown fences, then each array element is parsed on its own so a single
//! malformed candidate does not sink the rest.

use std::collections::HashMap;

use async_stream::stream;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::domain::knowledge::{
    CandidateNode, CandidateStream, DifficultyLevel, KnowledgeCollaborator, KnowledgePoint,
};
use crate::error::{Error, Result};
use crate::llm::{LlmClient, Message};

/// Scores below this are treated as weak areas
const WEAK_SCORE_THRESHOLD: f64 = 60.0;

/// Longest course text sent to the model, in characters
const MAX_COURSE_TEXT_CHARS: usize = 24_000;

const MAX_RECOMMENDATIONS: usize = 5;

const EXTRACTION_SYSTEM_PROMPT: &str = "You are an educational content analyst. You extract \
structured knowledge points from course material and answer with a single JSON object only.";

const RECOMMENDATION_SYSTEM_PROMPT: &str = "You are a tutor who turns a student's scores into \
short, concrete study suggestions. Answer with a single JSON object only.";

/// Collaborator that asks an LLM
pub struct LlmKnowledgeCollaborator {
    client: LlmClient,
}

impl LlmKnowledgeCollaborator {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KnowledgeCollaborator for LlmKnowledgeCollaborator {
    async fn extract_knowledge_points(
        &self,
        course_text: &str,
        course_id: i64,
        existing: &[KnowledgePoint],
    ) -> Result<CandidateStream> {
        info!(course_id, existing = existing.len(), model = %self.client.model(), "Extracting knowledge points");

        let messages = vec![
            Message::system(EXTRACTION_SYSTEM_PROMPT),
            Message::user(extraction_prompt(course_text, course_id, existing)),
        ];
        let completion = self
            .client
            .complete_json(messages)
            .await
            .map_err(Error::into_collaborator)?;
        if completion.is_truncated() {
            warn!(course_id, "Extraction answer was cut off at the token limit");
        }

        let items = candidate_values(&completion.content)?;
        debug!(course_id, candidates = items.len(), "Parsed extraction answer");

        let candidates = stream! {
            for (position, value) in items.into_iter().enumerate() {
                yield parse_candidate(position, value);
            }
        };
        Ok(Box::pin(candidates))
    }

    async fn recommend(
        &self,
        student_id: i64,
        performance: &HashMap<i64, f64>,
        course_id: i64,
    ) -> Result<Vec<String>> {
        let messages = vec![
            Message::system(RECOMMENDATION_SYSTEM_PROMPT),
            Message::user(recommendation_prompt(student_id, performance, course_id)),
        ];
        let completion = self
            .client
            .complete_json(messages)
            .await
            .map_err(Error::into_collaborator)?;

        let recommendations = parse_recommendations(&completion.content)?;
        info!(student_id, course_id, count = recommendations.len(), "Recommendations received");
        Ok(recommendations)
    }
}

fn extraction_prompt(course_text: &str, course_id: i64, existing: &[KnowledgePoint]) -> String {
    let existing_lines = if existing.is_empty() {
        "(none)".to_string()
    } else {
        existing
            .iter()
            .map(|p| format!("- id {}: {} ({})", p.id, p.name, p.difficulty))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"Extract the key knowledge points from the course content below.

Rules:
- Do not repeat existing knowledge points; reference them by id instead.
- Give every new point an "id" counting up from 10001; new points may reference each other by these ids.
- "prerequisiteKnowledgePointIds" lists what must be learned first; "relatedKnowledgePointIds" lists useful companions.
- A point never references itself.
- "difficultyLevel" is one of "BEGINNER", "INTERMEDIATE", "ADVANCED".
- Produce at least three points.

Course ID: {course_id}

Existing knowledge points:
{existing_lines}

Course content:
{content}

Answer format:
{{"knowledgePoints": [{{"id": 10001, "name": "...", "briefDescription": "...", "detailedContent": "...", "prerequisiteKnowledgePointIds": [], "relatedKnowledgePointIds": [], "difficultyLevel": "BEGINNER"}}]}}"#,
        content = truncate_chars(course_text, MAX_COURSE_TEXT_CHARS),
    )
}

fn recommendation_prompt(student_id: i64, performance: &HashMap<i64, f64>, course_id: i64) -> String {
    let mut scores: Vec<(i64, f64)> = performance.iter().map(|(k, v)| (*k, *v)).collect();
    scores.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    let score_lines = scores
        .iter()
        .map(|(id, score)| format!("- knowledge point {}: {:.1}", id, score))
        .collect::<Vec<_>>()
        .join("\n");
    let weak = scores
        .iter()
        .filter(|(_, score)| *score < WEAK_SCORE_THRESHOLD)
        .map(|(id, _)| id.to_string())
        .collect::<Vec<_>>();
    let weak_areas = if weak.is_empty() {
        "none below threshold".to_string()
    } else {
        weak.join(", ")
    };

    format!(
        r#"Student {student_id} in course {course_id} scored (0-100):
{score_lines}

Weak areas: {weak_areas}

Suggest 3 to 5 specific study activities, weakest areas first.
Answer format: {{"recommendations": ["...", "..."]}}"#
    )
}

/// Raw candidate as the model writes it
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCandidate {
    id: Option<i64>,
    name: Option<String>,
    #[serde(default)]
    brief_description: Option<String>,
    #[serde(default)]
    detailed_content: Option<String>,
    #[serde(default)]
    prerequisite_knowledge_point_ids: Option<Vec<i64>>,
    #[serde(default)]
    related_knowledge_point_ids: Option<Vec<i64>>,
    #[serde(default)]
    difficulty_level: Option<String>,
}

fn parse_candidate(position: usize, value: serde_json::Value) -> Result<CandidateNode> {
    let raw: RawCandidate = serde_json::from_value(value).map_err(|e| {
        Error::CollaboratorError(format!("candidate {} is malformed: {}", position, e))
    })?;

    let name = raw
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::CollaboratorError(format!("candidate {} has no name", position)))?;

    let difficulty = match raw.difficulty_level.as_deref() {
        None => DifficultyLevel::default(),
        Some(level) => DifficultyLevel::parse(level).unwrap_or_else(|| {
            debug!(position, level, "Unknown difficulty, using default");
            DifficultyLevel::default()
        }),
    };

    Ok(CandidateNode {
        draft_id: raw.id,
        name,
        brief_description: raw.brief_description.unwrap_or_default(),
        detailed_content: raw.detailed_content.unwrap_or_default(),
        difficulty,
        prerequisite_hints: raw.prerequisite_knowledge_point_ids.unwrap_or_default(),
        related_hints: raw.related_knowledge_point_ids.unwrap_or_default(),
    })
}

/// Pull the candidate array out of an answer
///
/// Accepts a bare array or an object holding one array field.
fn candidate_values(response: &str) -> Result<Vec<serde_json::Value>> {
    let json = extract_json(&strip_reasoning(response));
    let parsed: serde_json::Value = serde_json::from_str(&json)
        .map_err(|e| Error::CollaboratorError(format!("answer is not JSON: {}", e)))?;

    match parsed {
        serde_json::Value::Array(items) => Ok(items),
        serde_json::Value::Object(mut fields) => fields
            .remove("knowledgePoints")
            .or_else(|| fields.into_iter().map(|(_, v)| v).find(|v| v.is_array()))
            .and_then(|v| match v {
                serde_json::Value::Array(items) => Some(items),
                _ => None,
            })
            .ok_or_else(|| Error::CollaboratorError("answer holds no candidate array".into())),
        _ => Err(Error::CollaboratorError("answer holds no candidate array".into())),
    }
}

fn parse_recommendations(response: &str) -> Result<Vec<String>> {
    let json = extract_json(&strip_reasoning(response));
    let parsed: serde_json::Value = serde_json::from_str(&json)
        .map_err(|e| Error::CollaboratorError(format!("answer is not JSON: {}", e)))?;

    let items: &[serde_json::Value] = match &parsed {
        serde_json::Value::Array(items) => items.as_slice(),
        serde_json::Value::Object(fields) => fields
            .get("recommendations")
            .and_then(serde_json::Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };

    let recommendations: Vec<String> = items
        .iter()
        .filter_map(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(MAX_RECOMMENDATIONS)
        .map(String::from)
        .collect();

    if recommendations.is_empty() {
        return Err(Error::CollaboratorError("answer holds no recommendations".into()));
    }
    Ok(recommendations)
}

/// Drop `<think>...</think>` blocks some reasoning models prepend
fn strip_reasoning(response: &str) -> String {
    let mut out = response.to_string();
    while let Some(start) = out.find("<think>") {
        match out[start..].find("</think>") {
            Some(end) => out.replace_range(start..start + end + "</think>".len(), ""),
            None => out.truncate(start),
        }
    }
    out.trim().to_string()
}

/// Find the JSON payload: a ```json fence, any fence, or the outermost brackets
fn extract_json(response: &str) -> String {
    if let Some(start) = response.find("```json") {
        let body = start + "```json".len();
        if let Some(end) = response[body..].find("```") {
            return response[body..body + end].trim().to_string();
        }
    }

    if let Some(start) = response.find("```") {
        let after = start + 3;
        if let Some(newline) = response[after..].find('\n') {
            let body = after + newline + 1;
            if let Some(end) = response[body..].find("```") {
                return response[body..body + end].trim().to_string();
            }
        }
    }

    let open = [response.find('{'), response.find('[')]
        .into_iter()
        .flatten()
        .min();
    let close = [response.rfind('}'), response.rfind(']')]
        .into_iter()
        .flatten()
        .max();
    match (open, close) {
        (Some(start), Some(end)) if start <= end => response[start..=end].to_string(),
        _ => response.trim().to_string(),
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
