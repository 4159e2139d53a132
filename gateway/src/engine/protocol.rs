//! llama-server wire types.
//!
//! `/completion` speaks llama.cpp's native format; `/v1/chat/completions` is the
//! OpenAI-compatible one.

use aurora_common::{ChatMessage, InferenceOptions};
use serde::{Deserialize, Serialize};

// ============================================================================
// /completion
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub n_predict: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub stream: bool,
    pub echo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl CompletionRequest {
    pub fn new(prompt: String, options: &InferenceOptions, stream: bool) -> Self {
        Self {
            prompt,
            n_predict: options.max_tokens(),
            temperature: options.temperature(),
            top_p: options.top_p(),
            stream,
            echo: false,
            stop: options.stop.clone().filter(|s| !s.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub content: String,
}

/// One streamed `/completion` chunk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionChunk {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub stop: bool,
    #[serde(default)]
    pub stopped: bool,
}

impl CompletionChunk {
    /// The engine marks its last chunk with `stop` (or `stopped` on older builds).
    pub fn is_final(&self) -> bool {
        self.stop || self.stopped
    }
}

// ============================================================================
// /v1/chat/completions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionsRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl ChatCompletionsRequest {
    pub fn new(messages: Vec<ChatMessage>, options: &InferenceOptions, stream: bool) -> Self {
        Self {
            messages,
            temperature: options.temperature(),
            top_p: options.top_p(),
            max_tokens: options.max_tokens(),
            stream,
            stop: options.stop.clone().filter(|s| !s.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionsResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub message: serde_json::Value,
}

impl ChatCompletionsResponse {
    /// The first choice's message as returned by the engine, `{}` when absent.
    pub fn into_message(self) -> serde_json::Value {
        self.choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .filter(|m| !m.is_null())
            .unwrap_or_else(|| serde_json::json!({}))
    }
}

/// One streamed chat chunk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionsChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionsChunk {
    pub fn into_content(self) -> Option<String> {
        self.choices.into_iter().next().and_then(|c| c.delta.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_completion_request_defaults() {
        let req = CompletionRequest::new("Hi".to_string(), &InferenceOptions::default(), true);
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "prompt": "Hi",
                "n_predict": 512,
                "temperature": 0.7,
                "top_p": 0.95,
                "stream": true,
                "echo": false
            })
        );
    }

    #[test]
    fn test_completion_request_with_stop() {
        let options = InferenceOptions {
            max_tokens: Some(16),
            stop: Some(vec!["</s>".to_string()]),
            ..Default::default()
        };
        let req = CompletionRequest::new("Hi".to_string(), &options, false);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["n_predict"], 16);
        assert_eq!(value["stop"], json!(["</s>"]));
    }

    #[test]
    fn test_completion_chunk_final_flags() {
        let chunk: CompletionChunk = serde_json::from_str(r#"{"content": "Hel"}"#).unwrap();
        assert!(!chunk.is_final());
        let chunk: CompletionChunk =
            serde_json::from_str(r#"{"content": "", "stop": true}"#).unwrap();
        assert!(chunk.is_final());
        let chunk: CompletionChunk = serde_json::from_str(r#"{"stopped": true}"#).unwrap();
        assert!(chunk.is_final());
    }

    #[test]
    fn test_chat_response_message() {
        let res: ChatCompletionsResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "Hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3}
        }))
        .unwrap();
        assert_eq!(
            res.into_message(),
            json!({"role": "assistant", "content": "Hello"})
        );

        let res: ChatCompletionsResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(res.into_message(), json!({}));
    }

    #[test]
    fn test_chat_chunk_content() {
        let chunk: ChatCompletionsChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#).unwrap();
        assert_eq!(chunk.into_content().as_deref(), Some("Hi"));

        let chunk: ChatCompletionsChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap();
        assert_eq!(chunk.into_content(), None);
    }
}
