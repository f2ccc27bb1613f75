//! Query expansion: turning a search phrase into related keywords.
//!
//! Cloud mode asks Gemini. Local mode asks Ollama, or an OpenAI-style chat
//! server for LM Studio and LocalAI, and falls back to a built-in synonym
//! table when no server is configured.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::config::{AiBackend, AiConfig};

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, thiserror::Error)]
pub enum ExpansionError {
    #[error("expansion request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no api key configured")]
    MissingApiKey,

    #[error("malformed expansion response: {0}")]
    Malformed(String),
}

pub trait QueryExpander: Send + Sync {
    fn expand(&self, query: &str) -> Result<Vec<String>, ExpansionError>;

    fn name(&self) -> &'static str;
}

/// Lowercase whitespace tokens, used when cloud expansion fails.
pub fn fallback_tokens(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|token| token.to_lowercase())
        .collect()
}

fn expansion_prompt(query: &str) -> String {
    format!(
        "You are a search assistant for a photo gallery. \
        The user search query is: \"{query}\". \
        Generate a list of 5-10 related keywords, synonyms, and visual descriptors \
        that might appear in tags or album names for this query. \
        Example: \"My dog on the beach\" -> [\"dog\", \"puppy\", \"beach\", \"ocean\", \"sand\", \"summer\", \"pet\", \"animal\", \"coast\"] \
        Return ONLY a JSON array of strings."
    )
}

/// Accepts `["a", "b"]` or `{"keywords": ["a", "b"]}`.
pub fn parse_keyword_list(text: &str) -> Result<Vec<String>, ExpansionError> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum KeywordList {
        Plain(Vec<String>),
        Wrapped { keywords: Vec<String> },
    }

    let list: KeywordList = serde_json::from_str(text.trim())
        .map_err(|err| ExpansionError::Malformed(format!("{err}: {text}")))?;

    let keywords = match list {
        KeywordList::Plain(keywords) | KeywordList::Wrapped { keywords } => keywords,
    };

    Ok(keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect())
}

fn http_client(timeout: Duration) -> Result<reqwest::blocking::Client, reqwest::Error> {
    reqwest::blocking::Client::builder().timeout(timeout).build()
}

pub struct GeminiExpander {
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiExpander {
    pub fn new(api_key: Option<String>, model: &str, timeout: Duration) -> Self {
        Self {
            api_key,
            model: model.to_string(),
            timeout,
        }
    }
}

impl QueryExpander for GeminiExpander {
    fn expand(&self, query: &str) -> Result<Vec<String>, ExpansionError> {
        let api_key = self.api_key.as_ref().ok_or(ExpansionError::MissingApiKey)?;

        let resp: GeminiResponse = http_client(self.timeout)?
            .post(format!("{GEMINI_ENDPOINT}/{}:generateContent", self.model))
            .header("x-goog-api-key", api_key)
            .json(&json!({
                "contents": [{ "parts": [{ "text": expansion_prompt(query) }] }],
                "generationConfig": {
                    "responseMimeType": "application/json",
                    "responseSchema": { "type": "ARRAY", "items": { "type": "STRING" } },
                },
            }))
            .send()?
            .error_for_status()?
            .json()?;

        let text = resp
            .candidates
            .into_iter()
            .flat_map(|c| c.content.parts)
            .find_map(|p| p.text)
            .ok_or_else(|| ExpansionError::Malformed("empty gemini response".to_string()))?;

        parse_keyword_list(&text)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// Local text model served over the Ollama `/api/generate` endpoint.
pub struct OllamaExpander {
    base_url: String,
    model: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaExpander {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.strip_suffix('/').unwrap_or(base_url).to_string(),
            model: model.to_string(),
            timeout,
        }
    }
}

impl QueryExpander for OllamaExpander {
    fn expand(&self, query: &str) -> Result<Vec<String>, ExpansionError> {
        log::debug!("ollama: expanding {query:?} with {}", self.model);

        let resp: OllamaResponse = http_client(self.timeout)?
            .post(format!("{}/api/generate", self.base_url))
            .json(&json!({
                "model": self.model,
                "prompt": expansion_prompt(query),
                "format": "json",
                "stream": false,
            }))
            .send()?
            .error_for_status()?
            .json()?;

        parse_keyword_list(&resp.response)
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

/// Local text model behind an OpenAI-style `/v1/chat/completions`
/// endpoint, as served by LM Studio and LocalAI.
pub struct ChatCompletionsExpander {
    base_url: String,
    model: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsExpander {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.strip_suffix('/').unwrap_or(base_url).to_string(),
            model: model.to_string(),
            timeout,
        }
    }
}

impl QueryExpander for ChatCompletionsExpander {
    fn expand(&self, query: &str) -> Result<Vec<String>, ExpansionError> {
        log::debug!("chat completions: expanding {query:?} with {}", self.model);

        let resp: ChatResponse = http_client(self.timeout)?
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": expansion_prompt(query) }],
                "temperature": 0,
                "stream": false,
            }))
            .send()?
            .error_for_status()?
            .json()?;

        let text = resp
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .ok_or_else(|| ExpansionError::Malformed("empty chat response".to_string()))?;

        parse_keyword_list(&text)
    }

    fn name(&self) -> &'static str {
        "chat_completions"
    }
}

/// Offline expansion through a fixed synonym table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SynonymExpander;

fn synonyms(word: &str) -> Option<&'static [&'static str]> {
    match word {
        "beach" => Some(&["ocean", "sand", "summer", "coast"]),
        "dog" => Some(&["puppy", "pet", "animal", "canine"]),
        "cat" => Some(&["kitten", "feline", "pet"]),
        "food" => Some(&["dinner", "lunch", "restaurant", "delicious"]),
        _ => None,
    }
}

impl QueryExpander for SynonymExpander {
    fn expand(&self, query: &str) -> Result<Vec<String>, ExpansionError> {
        let mut keywords: Vec<String> = Vec::new();

        for word in fallback_tokens(query) {
            let expanded = match synonyms(&word) {
                Some(list) => list.iter().map(|s| s.to_string()).collect(),
                None => vec![word],
            };

            for keyword in expanded {
                if !keywords.contains(&keyword) {
                    keywords.push(keyword);
                }
            }
        }

        Ok(keywords)
    }

    fn name(&self) -> &'static str {
        "synonyms"
    }
}

/// The two expanders a session searches with.
pub struct Expanders {
    /// Used in cloud mode; failures fall back to [`fallback_tokens`].
    pub cloud: Box<dyn QueryExpander>,
    /// Used in local mode for display tags; failures yield no tags.
    pub local: Box<dyn QueryExpander>,
}

impl Default for Expanders {
    fn default() -> Self {
        Self {
            cloud: Box::new(GeminiExpander::new(
                None,
                "gemini-2.0-flash",
                Duration::from_secs(10),
            )),
            local: Box::new(SynonymExpander),
        }
    }
}

impl Expanders {
    pub fn from_config(config: &AiConfig) -> Self {
        let timeout = Duration::from_secs(config.request_timeout_secs);

        let cloud = GeminiExpander::new(config.gemini_api_key(), &config.gemini_model, timeout);
        if cloud.api_key.is_none() {
            log::info!("no gemini api key, cloud search uses plain keywords");
        }

        let local: Box<dyn QueryExpander> = match config.vision_backend {
            AiBackend::Ollama => Box::new(OllamaExpander::new(
                &config.vision_url,
                config.vision_model.model_tag(),
                timeout,
            )),
            AiBackend::LmStudio | AiBackend::LocalAi => Box::new(ChatCompletionsExpander::new(
                &config.vision_url,
                config.vision_model.model_tag(),
                timeout,
            )),
            AiBackend::Offline | AiBackend::ComfyUi => Box::new(SynonymExpander),
        };

        Self {
            cloud: Box::new(cloud),
            local,
        }
    }

    /// Keywords for cloud mode. Never fails.
    pub fn expand_cloud(&self, query: &str) -> Vec<String> {
        match self.cloud.expand(query) {
            Ok(keywords) if !keywords.is_empty() => keywords,
            Ok(_) => fallback_tokens(query),
            Err(ExpansionError::MissingApiKey) => fallback_tokens(query),
            Err(err) => {
                log::warn!("{} expansion failed, using plain keywords: {err}", self.cloud.name());
                fallback_tokens(query)
            }
        }
    }

    /// Display tags for local mode. Never fails.
    pub fn expand_local(&self, query: &str) -> Vec<String> {
        match self.local.expand(query) {
            Ok(keywords) => keywords,
            Err(err) => {
                log::warn!("{} expansion failed, showing no tags: {err}", self.local.name());
                vec![]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl QueryExpander for Failing {
        fn expand(&self, _query: &str) -> Result<Vec<String>, ExpansionError> {
            Err(ExpansionError::Malformed("offline".to_string()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[test]
    fn test_fallback_tokens() {
        assert_eq!(fallback_tokens("My  Dog\tBeach"), vec!["my", "dog", "beach"]);
        assert!(fallback_tokens("   ").is_empty());
    }

    #[test]
    fn test_synonyms_expand_and_dedupe() {
        let keywords = SynonymExpander.expand("Dog cat sunset").unwrap();
        assert_eq!(
            keywords,
            vec!["puppy", "pet", "animal", "canine", "kitten", "feline", "sunset"]
        );
        assert_eq!(SynonymExpander.expand("beach").unwrap(), vec!["ocean", "sand", "summer", "coast"]);
    }

    #[test]
    fn test_parse_keyword_list() {
        assert_eq!(parse_keyword_list(r#"["dog", " puppy ", ""]"#).unwrap(), vec!["dog", "puppy"]);
        assert_eq!(parse_keyword_list(r#"{"keywords": ["sand"]}"#).unwrap(), vec!["sand"]);
        assert!(matches!(parse_keyword_list("not json"), Err(ExpansionError::Malformed(_))));
    }

    #[test]
    fn test_gemini_without_key() {
        let gemini = GeminiExpander::new(None, "gemini-2.0-flash", Duration::from_secs(1));
        assert!(matches!(gemini.expand("dog"), Err(ExpansionError::MissingApiKey)));
    }

    #[test]
    fn test_failures_degrade() {
        let expanders = Expanders {
            cloud: Box::new(Failing),
            local: Box::new(Failing),
        };

        assert_eq!(expanders.expand_cloud("Pizza Night"), vec!["pizza", "night"]);
        assert!(expanders.expand_local("pizza").is_empty());
    }

    fn fake_chat_server(content: &'static str) -> String {
        use axum::{routing::post, Json, Router};

        let router = Router::new().route(
            "/v1/chat/completions",
            post(move |Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["messages"][0]["role"], "user");
                assert!(body["messages"][0]["content"]
                    .as_str()
                    .is_some_and(|prompt| prompt.contains("\"dog at the park\"")));

                Json(json!({
                    "id": "chatcmpl-1",
                    "object": "chat.completion",
                    "choices": [{
                        "index": 0,
                        "message": { "role": "assistant", "content": content },
                        "finish_reason": "stop",
                    }],
                }))
            }),
        );

        crate::tests::serve_fake(router)
    }

    #[test]
    fn test_chat_completions_expand() {
        let url = fake_chat_server(r#"{"keywords": ["dog", "park", "grass"]}"#);
        let expander = ChatCompletionsExpander::new(&format!("{url}/"), "llava", Duration::from_secs(5));

        assert_eq!(expander.expand("dog at the park").unwrap(), vec!["dog", "park", "grass"]);
    }

    #[test]
    fn test_chat_completions_bad_reply_yields_no_tags() {
        let url = fake_chat_server("I can't help with that.");
        let expanders = Expanders {
            cloud: Box::new(Failing),
            local: Box::new(ChatCompletionsExpander::new(&url, "llava", Duration::from_secs(5))),
        };

        assert!(expanders.expand_local("dog at the park").is_empty());
    }

    #[test]
    fn test_local_backends_pick_their_protocol() {
        let mut config = AiConfig::default();

        config.vision_backend = AiBackend::Ollama;
        assert_eq!(Expanders::from_config(&config).local.name(), "ollama");

        for backend in [AiBackend::LmStudio, AiBackend::LocalAi] {
            config.vision_backend = backend;
            assert_eq!(Expanders::from_config(&config).local.name(), "chat_completions");
        }

        config.vision_backend = AiBackend::ComfyUi;
        assert_eq!(Expanders::from_config(&config).local.name(), "synonyms");
    }

    #[test]
    fn test_offline_config_uses_synonyms() {
        let expanders = Expanders::from_config(&AiConfig::default());
        assert_eq!(expanders.local.name(), "synonyms");
        assert_eq!(expanders.cloud.name(), "gemini");
    }
}
