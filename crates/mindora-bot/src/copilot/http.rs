use super::{Copilot, CopilotError, GuessAssist, GuessRequest, QuestionRequest};
use async_trait::async_trait;
use mindora_core::model::{Entity, Question, SharedEntity};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "deepseek/deepseek-r1";
const REFERER: &str = "https://mindora.ai";
const TITLE: &str = "Mindora";
const GUESS_DISCOUNT: f64 = 0.8;
const GENERATED_QUALITY: f64 = 0.85;
const DISTINCTION_QUALITY: f64 = 0.95;

static THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid think regex"));
static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json)?").expect("valid fence regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct HttpCopilotConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl HttpCopilotConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// `None` unless `MINDORA_COPILOT_API_KEY` or `OPENAI_API_KEY` is set.
    pub fn from_env() -> Option<Self> {
        Self::from_reader(|key| std::env::var(key).ok())
    }

    fn from_reader<F>(mut read: F) -> Option<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let api_key = read("MINDORA_COPILOT_API_KEY")
            .or_else(|| read("OPENAI_API_KEY"))
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())?;
        let mut config = Self::new(api_key);
        if let Some(url) = read("MINDORA_COPILOT_BASE_URL").filter(|raw| !raw.trim().is_empty()) {
            config.base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(model) = read("MINDORA_COPILOT_MODEL").filter(|raw| !raw.trim().is_empty()) {
            config.model = model.trim().to_string();
        }
        Some(config)
    }
}

/// OpenAI-compatible chat-completions client speaking JSON-only prompts.
#[derive(Debug, Clone)]
pub struct HttpCopilot {
    client: reqwest::Client,
    config: HttpCopilotConfig,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl HttpCopilot {
    pub fn new(config: HttpCopilotConfig) -> Result<Self, CopilotError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| CopilotError::Transport(err.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn chat(
        &self,
        system: Option<&str>,
        prompt: &str,
        temperature: Option<f64>,
    ) -> Result<String, CopilotError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "response_format": { "type": "json_object" },
        });
        if let Some(temperature) = temperature {
            body["temperature"] = json!(temperature);
        }

        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .header("HTTP-Referer", REFERER)
            .header("X-Title", TITLE)
            .json(&body)
            .send()
            .await
            .map_err(|err| CopilotError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CopilotError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|err| CopilotError::Malformed(err.to_string()))?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_else(|| "{}".to_string());
        debug!(target: "mindora_bot::copilot", bytes = content.len(), "copilot replied");
        Ok(content)
    }
}

#[async_trait]
impl Copilot for HttpCopilot {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn generate_questions(
        &self,
        request: QuestionRequest<'_>,
    ) -> Result<Vec<Question>, CopilotError> {
        let prompt = format!(
            "Context: A guessing game (20 Questions style).\n\
             Theme: {theme}\n\
             Player style: {style}\n\
             Remaining Candidates: {names}\n\n\
             Task: Generate 2 strategic YES/NO questions that effectively separate these candidates.\n\
             Output JSON Format: {{ \"questions\": [ {{ \"text\": \"Question?\", \"featureKey\": \"camelCaseKey\" }} ] }}",
            theme = request.theme,
            style = request.profile.archetype,
            names = candidate_names(request.candidates),
        );
        let content = self
            .chat(
                Some("You are a logical game engine. Output ONLY valid JSON."),
                &prompt,
                Some(0.6),
            )
            .await?;
        parse_questions(&content)
    }

    async fn assist_guess(
        &self,
        request: GuessRequest<'_>,
    ) -> Result<Option<GuessAssist>, CopilotError> {
        let history = request
            .history
            .iter()
            .map(|answer| format!("Q: {} A: {}", answer.question_id, answer.value))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "History:\n{history}\n\n\
             Candidates: {names}\n\n\
             Task: Based on the history, which candidate is the most likely match?\n\
             Return JSON: {{ \"candidateName\": \"Name\", \"confidence\": 0.0-1.0 }}",
            names = candidate_names(request.candidates),
        );
        let content = self
            .chat(
                Some("You are an inference engine. Output ONLY valid JSON."),
                &prompt,
                Some(0.5),
            )
            .await?;
        parse_guess(&content, request.candidates)
    }

    async fn differentiate(
        &self,
        wrong: &Entity,
        correct_name: &str,
        _theme: &str,
    ) -> Result<Vec<Question>, CopilotError> {
        let prompt = format!(
            "Entity A (Wrong Guess): {wrong} ({description})\n\
             Entity B (Correct Answer): {correct_name}\n\n\
             Task: Generate 1 decisive YES/NO question that is TRUE for {correct_name} and FALSE for {wrong}.\n\
             Output JSON: {{ \"text\": \"Question?\", \"featureKey\": \"key\" }}",
            wrong = wrong.name,
            description = wrong.description,
        );
        let content = self.chat(None, &prompt, None).await?;
        parse_distinction(&content)
    }
}

fn candidate_names(candidates: &[SharedEntity]) -> String {
    candidates
        .iter()
        .map(|entity| entity.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Strips reasoning blocks and markdown fences around a JSON reply.
pub fn clean_response(content: &str) -> String {
    let without_think = THINK_BLOCK.replace_all(content, "");
    CODE_FENCE.replace_all(&without_think, "").trim().to_string()
}

fn parse_json(content: &str) -> Result<Value, CopilotError> {
    let cleaned = clean_response(content);
    serde_json::from_str(&cleaned).map_err(|err| CopilotError::Malformed(err.to_string()))
}

fn string_field<'v>(value: &'v Value, keys: &[&str]) -> Option<&'v str> {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

/// Questions from `{"questions": [...]}` or a bare array.
pub fn parse_questions(content: &str) -> Result<Vec<Question>, CopilotError> {
    let value = parse_json(content)?;
    let items = match value.get("questions").unwrap_or(&value) {
        Value::Array(items) => items.clone(),
        _ => return Ok(Vec::new()),
    };
    let batch = Uuid::new_v4().simple().to_string();
    let questions = items
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            let text = string_field(item, &["text"])?;
            let feature_key = string_field(item, &["featureKey", "feature_key"])
                .map(str::to_string)
                .unwrap_or_else(|| format!("ai_feature_{idx}"));
            Some(
                Question::new(format!("ai_gen_{batch}_{idx}"), text, feature_key)
                    .with_tags(["generated", "ai"])
                    .with_quality(GENERATED_QUALITY),
            )
        })
        .collect();
    Ok(questions)
}

/// Maps the suggested name onto a candidate and discounts its confidence.
pub fn parse_guess(
    content: &str,
    candidates: &[SharedEntity],
) -> Result<Option<GuessAssist>, CopilotError> {
    let value = parse_json(content)?;
    let Some(name) = string_field(&value, &["candidateName", "candidate_name"]) else {
        return Ok(None);
    };
    let confidence = value.get("confidence").and_then(Value::as_f64).unwrap_or(0.0);
    let assist = candidates
        .iter()
        .find(|entity| entity.name.eq_ignore_ascii_case(name))
        .map(|entity| GuessAssist {
            entity_id: entity.id.clone(),
            confidence: (confidence * GUESS_DISCOUNT).clamp(0.0, 1.0),
        });
    Ok(assist)
}

/// A single distinguishing question from `{"text": ..., "featureKey": ...}`.
pub fn parse_distinction(content: &str) -> Result<Vec<Question>, CopilotError> {
    let value = parse_json(content)?;
    let Some(text) = string_field(&value, &["text"]) else {
        return Ok(Vec::new());
    };
    let feature_key = string_field(&value, &["featureKey", "feature_key"]).unwrap_or("distinguisher");
    let question = Question::new(
        format!("diff_{}", Uuid::new_v4().simple()),
        text,
        feature_key,
    )
    .with_tags(["learning", "comparison"])
    .with_quality(DISTINCTION_QUALITY);
    Ok(vec![question])
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindora_core::model::EntityId;
    use std::collections::HashMap;

    #[test]
    fn strips_think_blocks_and_fences() {
        let raw = "<think>\nlet me reason\n</think>\n```json\n{\"text\": \"Is it red?\"}\n```";
        assert_eq!(clean_response(raw), "{\"text\": \"Is it red?\"}");
    }

    #[test]
    fn parses_generated_questions() {
        let raw = r#"{"questions": [{"text": "Does it sing?", "featureKey": "sings"}, {"text": "Is it blue?"}, {"featureKey": "nothing"}]}"#;
        let questions = parse_questions(raw).unwrap();
        assert_eq!(questions.len(), 2);
        assert!(questions[0].id.as_str().starts_with("ai_gen_"));
        assert_eq!(questions[0].feature_key, "sings");
        assert_eq!(questions[1].feature_key, "ai_feature_1");
        assert_eq!(questions[0].quality, 0.85);
        assert!(questions[0].has_tag("generated") && questions[0].has_tag("ai"));
    }

    #[test]
    fn parses_bare_question_array() {
        let raw = r#"[{"text": "Is it a car?", "feature_key": "is_car"}]"#;
        assert_eq!(parse_questions(raw).unwrap()[0].feature_key, "is_car");
    }

    #[test]
    fn guess_is_matched_case_insensitively_and_discounted() {
        let candidates = vec![
            Entity::new("e1", "Eagle", "cat").shared(),
            Entity::new("e2", "Hawk", "cat").shared(),
        ];
        let assist = parse_guess(r#"{"candidateName": "hawk", "confidence": 0.9}"#, &candidates)
            .unwrap()
            .unwrap();
        assert_eq!(assist.entity_id, EntityId::from("e2"));
        assert!((assist.confidence - 0.72).abs() < 1e-9);

        let unknown = parse_guess(r#"{"candidateName": "Owl", "confidence": 1.0}"#, &candidates).unwrap();
        assert!(unknown.is_none());
    }

    #[test]
    fn malformed_reply_is_an_error() {
        assert!(matches!(parse_questions("not json"), Err(CopilotError::Malformed(_))));
    }

    #[test]
    fn distinction_questions_are_tagged_for_learning() {
        let questions = parse_distinction(r#"{"text": "Does it hunt at night?"}"#).unwrap();
        assert_eq!(questions[0].feature_key, "distinguisher");
        assert_eq!(questions[0].quality, 0.95);
        assert!(questions[0].has_tag("comparison"));
    }

    #[test]
    fn config_requires_api_key() {
        let empty: HashMap<&str, &str> = HashMap::new();
        assert!(HttpCopilotConfig::from_reader(|key| empty.get(key).map(|v| v.to_string())).is_none());

        let mut vars = HashMap::new();
        vars.insert("OPENAI_API_KEY", "sk-test");
        vars.insert("MINDORA_COPILOT_BASE_URL", "http://localhost:8080/v1/");
        let config = HttpCopilotConfig::from_reader(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.base_url, "http://localhost:8080/v1");
        assert_eq!(config.model, DEFAULT_MODEL);
    }
}
