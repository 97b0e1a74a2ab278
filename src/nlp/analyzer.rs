//! Model-backed ticket analysis with a bounded worker pool.
//!
//! Each ticket costs one chat-completion request. A counting semaphore
//! bounds in-flight requests; the semaphore and the model id live in a
//! small swappable settings object so the HTTP layer can retune the
//! pool at runtime without touching in-flight calls (they finish on
//! the old semaphore, which is then dropped).
//!
//! The model answers with Russian classification labels in strict
//! JSON. Its urgency number is discarded; priority is recomputed
//! deterministically from the labels. Every failure mode folds into a
//! manual-review fallback record so the batch always progresses.

use std::sync::{Arc, LazyLock as Lazy, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::{AVAILABLE_CONCURRENCY, AVAILABLE_MODELS};
use crate::domain::{Language, RequestType, Segment, Sentiment};
use crate::error::{Error, Result};

use super::priority::score_priority;

const SYSTEM_PROMPT: &str = r#"You are an AI assistant for a bank's customer support routing system.
Analyze the given customer request and return a JSON object with the following fields:

- request_type: One of ["Жалоба", "Смена данных", "Консультация", "Претензия", "Неработоспособность приложения", "Мошеннические действия", "Спам"]
- sentiment: One of ["Положительная", "Нейтральная", "Негативная"]
- priority: Integer from 1 (lowest) to 10 (highest urgency)
- language: One of ["KZ", "ENG", "RU"] — if unclear, default to "RU"
- summary: Must contain 1–2 concise sentences summarizing the request and must be shorter than the original customer description.
- next_actions: A short string with recommended next actions for the manager (1–3 steps)

Return ONLY valid JSON. No markdown, no explanation."#;

const MAX_TOKENS: u32 = 200;
const NUM_CTX: u32 = 1024;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Enrichment fields produced for one ticket.
#[derive(Debug, Clone, PartialEq)]
pub struct NlpOutcome {
    pub request_type: RequestType,
    pub sentiment: Sentiment,
    pub language: Language,
    pub priority_score: u8,
    pub summary: String,
    pub next_actions: String,
    pub infer_time_ms: u64,
}

impl NlpOutcome {
    /// Manual-review record used whenever the model call or its answer
    /// is unusable.
    fn fallback(segment: Segment) -> Self {
        Self {
            request_type: RequestType::Consultation,
            sentiment: Sentiment::Neutral,
            language: Language::Ru,
            priority_score: score_priority("Консультация", "Нейтральная", segment),
            summary: "Не удалось проанализировать — требуется ручная проверка.".to_string(),
            next_actions: "Передать на ручную обработку.".to_string(),
            infer_time_ms: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Chat endpoint seam
// ---------------------------------------------------------------------------

type ChatError = Box<dyn std::error::Error + Send + Sync>;

/// One chat-completion round-trip. Implemented over HTTP in
/// production and scripted in tests.
#[async_trait]
pub trait ChatEndpoint: Send + Sync {
    async fn complete(
        &self,
        model_id: &str,
        system: &str,
        user: &str,
    ) -> std::result::Result<String, ChatError>;
}

/// Ollama-compatible chat-completions client.
pub struct HttpChatEndpoint {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

impl HttpChatEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ChatEndpoint for HttpChatEndpoint {
    async fn complete(
        &self,
        model_id: &str,
        system: &str,
        user: &str,
    ) -> std::result::Result<String, ChatError> {
        let body = json!({
            "model": model_id,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": 0,
            "max_tokens": MAX_TOKENS,
            "options": { "num_ctx": NUM_CTX },
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or("model response carried no choices")?;
        Ok(content)
    }
}

// ---------------------------------------------------------------------------
// JSON extraction
// ---------------------------------------------------------------------------

static FENCE_OPEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```(?:json)?\s*").unwrap());
static FENCE_CLOSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*```$").unwrap());

/// Strip optional code fences and return the first balanced `{…}` span.
fn extract_json(text: &str) -> Option<String> {
    let mut text = text.trim().to_string();
    if text.starts_with("```") {
        text = FENCE_OPEN_RE.replace(&text, "").to_string();
        text = FENCE_CLOSE_RE.replace(&text, "").to_string();
    }

    let start = text.find('{')?;
    let mut depth = 0usize;
    for (offset, c) in text[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + c.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Default, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    request_type: String,
    #[serde(default)]
    sentiment: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    next_actions: String,
}

fn parse_language(label: &str) -> Language {
    match label.trim() {
        "KZ" => Language::Kz,
        "ENG" => Language::Eng,
        _ => Language::Ru,
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// The swappable half of the pool: model id + its semaphore.
struct PoolSettings {
    model_id: String,
    concurrency: usize,
    semaphore: Arc<tokio::sync::Semaphore>,
}

/// Process-wide NLP worker pool.
pub struct NlpPool {
    endpoint: Arc<dyn ChatEndpoint>,
    settings: RwLock<Arc<PoolSettings>>,
}

impl NlpPool {
    pub fn new(endpoint: Arc<dyn ChatEndpoint>, model_id: impl Into<String>, concurrency: usize) -> Self {
        let model_id = model_id.into();
        Self {
            endpoint,
            settings: RwLock::new(Arc::new(PoolSettings {
                semaphore: Arc::new(tokio::sync::Semaphore::new(concurrency)),
                concurrency,
                model_id,
            })),
        }
    }

    /// Current (model_id, concurrency) pair.
    pub fn current_settings(&self) -> (String, usize) {
        let settings = self.settings.read().expect("settings lock poisoned");
        (settings.model_id.clone(), settings.concurrency)
    }

    /// Swap in a fresh semaphore and model id. In-flight calls keep
    /// their permits on the old semaphore and complete undisturbed.
    pub fn update_settings(&self, model_id: &str, concurrency: usize) -> Result<()> {
        if !AVAILABLE_MODELS.contains(&model_id) {
            return Err(Error::InvalidSetting(format!(
                "model '{model_id}' not in {AVAILABLE_MODELS:?}"
            )));
        }
        if !AVAILABLE_CONCURRENCY.contains(&concurrency) {
            return Err(Error::InvalidSetting(format!(
                "concurrency {concurrency} not in {AVAILABLE_CONCURRENCY:?}"
            )));
        }

        let fresh = Arc::new(PoolSettings {
            model_id: model_id.to_string(),
            concurrency,
            semaphore: Arc::new(tokio::sync::Semaphore::new(concurrency)),
        });
        *self.settings.write().expect("settings lock poisoned") = fresh;
        debug!(model_id, concurrency, "nlp settings updated");
        Ok(())
    }

    /// Analyze one ticket description. Never fails: every error path
    /// degrades to the manual-review fallback record.
    pub async fn analyze(
        &self,
        description: &str,
        segment: Segment,
        index: usize,
        total: usize,
    ) -> NlpOutcome {
        let settings = self.settings.read().expect("settings lock poisoned").clone();

        let Ok(_permit) = settings.semaphore.clone().acquire_owned().await else {
            return NlpOutcome::fallback(segment);
        };

        let started = Instant::now();
        let answer = self
            .endpoint
            .complete(&settings.model_id, SYSTEM_PROMPT, description)
            .await;
        let infer_time_ms = started.elapsed().as_millis() as u64;

        match answer {
            Ok(content) => match self.interpret(&content, segment, infer_time_ms) {
                Some(outcome) => {
                    debug!(index, total, infer_time_ms, "nlp analysis done");
                    outcome
                }
                None => {
                    warn!(index, total, "model answer was not parseable JSON");
                    NlpOutcome::fallback(segment)
                }
            },
            Err(err) => {
                warn!(index, total, %err, "model request failed");
                NlpOutcome::fallback(segment)
            }
        }
    }

    fn interpret(&self, content: &str, segment: Segment, infer_time_ms: u64) -> Option<NlpOutcome> {
        let span = extract_json(content)?;
        let raw: RawAnalysis = serde_json::from_str(&span).ok()?;

        // Priority comes from the raw Russian labels, never from the
        // model's own number.
        let priority_score = score_priority(&raw.request_type, &raw.sentiment, segment);

        Some(NlpOutcome {
            request_type: RequestType::from_label(&raw.request_type),
            sentiment: Sentiment::from_label(&raw.sentiment),
            language: parse_language(&raw.language),
            priority_score,
            summary: raw.summary,
            next_actions: raw.next_actions,
            infer_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;

    struct ScriptedEndpoint {
        reply: Box<dyn Fn(&str) -> std::result::Result<String, String> + Send + Sync>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedEndpoint {
        fn new(
            reply: impl Fn(&str) -> std::result::Result<String, String> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                reply: Box::new(reply),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChatEndpoint for ScriptedEndpoint {
        async fn complete(
            &self,
            _model_id: &str,
            _system: &str,
            user: &str,
        ) -> std::result::Result<String, ChatError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            (self.reply)(user).map_err(|e| e.into())
        }
    }

    const GOOD_ANSWER: &str = r#"{"request_type": "Жалоба", "sentiment": "Негативная", "priority": 2, "language": "RU", "summary": "Клиент недоволен комиссией.", "next_actions": "Проверить тариф."}"#;

    #[test]
    fn test_extract_json_plain() {
        let out = extract_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(out, r#"{"a": 1}"#);
    }

    #[test]
    fn test_extract_json_with_fences_and_prose() {
        let fenced = "```json\n{\"a\": {\"b\": 2}}\n```";
        assert_eq!(extract_json(fenced).unwrap(), "{\"a\": {\"b\": 2}}");

        let chatty = "Вот результат: {\"a\": 1} — готово.";
        assert_eq!(extract_json(chatty).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_unbalanced_is_none() {
        assert!(extract_json("{\"a\": 1").is_none());
        assert!(extract_json("no json here").is_none());
    }

    #[tokio::test]
    async fn test_analyze_maps_labels_and_recomputes_priority() {
        let endpoint = ScriptedEndpoint::new(|_| Ok(GOOD_ANSWER.to_string()));
        let pool = NlpPool::new(endpoint, "gemma3:1b", 2);

        let outcome = pool.analyze("Спишите комиссию обратно", Segment::Mass, 0, 1).await;
        assert_eq!(outcome.request_type, RequestType::Complaint);
        assert_eq!(outcome.sentiment, Sentiment::Negative);
        assert_eq!(outcome.language, Language::Ru);
        // 6 (Жалоба) + 2 (Негативная) + 0 (Mass) = 8; the model said 2.
        assert_eq!(outcome.priority_score, 8);
        assert_eq!(outcome.summary, "Клиент недоволен комиссией.");
    }

    #[tokio::test]
    async fn test_analyze_falls_back_on_request_error() {
        let endpoint = ScriptedEndpoint::new(|_| Err("connection refused".to_string()));
        let pool = NlpPool::new(endpoint, "gemma3:1b", 2);

        let outcome = pool.analyze("anything", Segment::Vip, 0, 1).await;
        assert_eq!(outcome.request_type, RequestType::Consultation);
        assert_eq!(outcome.sentiment, Sentiment::Neutral);
        assert_eq!(outcome.language, Language::Ru);
        // Консультация 4 + 0 + VIP 2 = 6
        assert_eq!(outcome.priority_score, 6);
        assert_eq!(outcome.infer_time_ms, 0);
    }

    #[tokio::test]
    async fn test_analyze_falls_back_on_garbage_answer() {
        let endpoint = ScriptedEndpoint::new(|_| Ok("sorry, I can't help".to_string()));
        let pool = NlpPool::new(endpoint, "gemma3:1b", 2);

        let outcome = pool.analyze("anything", Segment::Mass, 0, 1).await;
        assert_eq!(outcome.request_type, RequestType::Consultation);
        assert_eq!(outcome.infer_time_ms, 0);
    }

    #[tokio::test]
    async fn test_semaphore_bounds_in_flight_requests() {
        let endpoint = ScriptedEndpoint::new(|_| Ok(GOOD_ANSWER.to_string()));
        let pool = Arc::new(NlpPool::new(endpoint.clone(), "gemma3:1b", 2));

        let mut tasks = Vec::new();
        for i in 0..8 {
            let pool = pool.clone();
            tasks.push(tokio::spawn(async move {
                pool.analyze("ticket", Segment::Mass, i, 8).await
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(
            endpoint.max_in_flight.load(Ordering::SeqCst) <= 2,
            "semaphore leaked: {} in flight",
            endpoint.max_in_flight.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn test_update_settings_validates_and_swaps() {
        let endpoint = ScriptedEndpoint::new(|_| Ok(GOOD_ANSWER.to_string()));
        let pool = NlpPool::new(endpoint, "gemma3:1b", 6);

        assert!(pool.update_settings("gemma3:9b", 6).is_err());
        assert!(pool.update_settings("gemma3:4b", 3).is_err());

        pool.update_settings("gemma3:4b", 8).unwrap();
        assert_eq!(pool.current_settings(), ("gemma3:4b".to_string(), 8));
    }
}
