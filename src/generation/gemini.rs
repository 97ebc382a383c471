//! Gemini REST client.
//!
//! Plans and scripts are requested in JSON response mode with a schema;
//! speech comes back as base64 PCM16 in an `inlineData` part.

use super::{GenerationClient, NarrativePlan, PromptTemplates, Segment};
use crate::config::GenerationConfig;
use crate::error::{Result, StorycastError};
use base64::{Engine, engine::general_purpose};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    text_model: String,
    speech_model: String,
    voice: String,
    research_search: bool,
    prompts: PromptTemplates,
}

impl GeminiClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalidValue` when no API key is configured.
    pub fn from_config(config: &GenerationConfig, prompts: PromptTemplates) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| StorycastError::ConfigInvalidValue {
                key: "generation.api_key".to_string(),
                message: "not set (use STORYCAST_API_KEY or GEMINI_API_KEY)".to_string(),
            })?;

        Ok(Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            text_model: config.text_model.clone(),
            speech_model: config.speech_model.clone(),
            voice: config.voice.clone(),
            research_search: config.research_search,
            prompts,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{model}:generateContent", self.base_url)
    }

    /// POST one `generateContent` request and parse the response body.
    async fn generate(&self, stage: &str, model: &str, body: &Value) -> Result<Value> {
        let response = self
            .http
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| StorycastError::generation(stage, format!("request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StorycastError::generation(stage, format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(StorycastError::generation(
                stage,
                format!("service returned status {status}: {}", error_message(&text)),
            ));
        }

        serde_json::from_str(&text)
            .map_err(|e| StorycastError::generation(stage, format!("malformed response: {e}")))
    }

    async fn generate_json<T: DeserializeOwned>(&self, stage: &str, body: &Value) -> Result<T> {
        let response = self.generate(stage, &self.text_model, body).await?;
        let text = response_text(&response)
            .ok_or_else(|| StorycastError::generation(stage, "response contained no text"))?;
        serde_json::from_str(&text)
            .map_err(|e| StorycastError::generation(stage, format!("unexpected JSON: {e}")))
    }
}

#[async_trait::async_trait]
impl GenerationClient for GeminiClient {
    async fn plan(&self, topic: &str) -> Result<NarrativePlan> {
        let body = json_request(&self.prompts.plan_prompt(topic), plan_schema());
        let plan: NarrativePlan = self.generate_json("plan", &body).await?;
        plan.validated()
    }

    async fn research(&self, chapter: &str, main_topic: &str) -> Result<String> {
        let mut body = text_request(&self.prompts.research_prompt(chapter, main_topic));
        if self.research_search {
            body["tools"] = json!([{ "googleSearch": {} }]);
        }
        let response = self.generate("research", &self.text_model, &body).await?;
        Ok(response_text(&response)
            .filter(|notes| !notes.trim().is_empty())
            .unwrap_or_else(|| self.prompts.research_fallback(chapter)))
    }

    async fn write(&self, chapter: &str, notes: &str, context: &str) -> Result<Segment> {
        let body = json_request(
            &self.prompts.write_prompt(chapter, notes, context),
            segment_schema(),
        );
        self.generate_json("write", &body).await
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let body = speech_request(text, &self.voice);
        let response = self.generate("synthesize", &self.speech_model, &body).await?;
        decode_audio(&response)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

fn text_request(prompt: &str) -> Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
    })
}

fn json_request(prompt: &str, schema: Value) -> Value {
    let mut body = text_request(prompt);
    body["generationConfig"] = json!({
        "responseMimeType": "application/json",
        "responseSchema": schema,
    });
    body
}

fn speech_request(text: &str, voice: &str) -> Value {
    json!({
        "contents": [{ "parts": [{ "text": text }] }],
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
            }
        }
    })
}

fn plan_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "mainTopic": { "type": "STRING" },
            "chapters": { "type": "ARRAY", "items": { "type": "STRING" } },
            "nextPivotTopic": { "type": "STRING" }
        },
        "required": ["mainTopic", "chapters", "nextPivotTopic"]
    })
}

fn segment_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "script": { "type": "STRING" },
            "displayTitle": { "type": "STRING" }
        },
        "required": ["script", "displayTitle"]
    })
}

fn first_candidate_parts(response: &Value) -> impl Iterator<Item = &Value> {
    response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// Concatenated text parts of the first candidate.
fn response_text(response: &Value) -> Option<String> {
    let text: String = first_candidate_parts(response)
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    (!text.is_empty()).then_some(text)
}

/// Base64 data of the first inline audio part.
fn inline_audio(response: &Value) -> Option<&str> {
    first_candidate_parts(response)
        .find_map(|part| part.pointer("/inlineData/data").and_then(Value::as_str))
}

/// Decode the base64 speech payload; a missing or empty payload is a synthesis failure.
fn decode_audio(response: &Value) -> Result<Vec<u8>> {
    let data = inline_audio(response).ok_or_else(|| StorycastError::Synthesis {
        message: "response contained no audio payload".to_string(),
    })?;
    let audio = general_purpose::STANDARD
        .decode(data)
        .map_err(|e| StorycastError::Synthesis {
            message: format!("invalid base64 audio: {e}"),
        })?;
    if audio.is_empty() {
        return Err(StorycastError::Synthesis {
            message: "response contained an empty audio payload".to_string(),
        });
    }
    Ok(audio)
}

/// Best-effort message from an error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| body.chars().take(200).collect())
}
