//! HTTP client for the gateway API.

use aurora_common::sse::{data_payload, LineDecoder};
use aurora_common::{
    ChatEvent, ChatRequest, ChatResponse, GenerateEvent, GenerateRequest, GenerateResponse,
    ModelList, PullRequest, PullResponse,
};
use futures_util::StreamExt;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::CliConfig;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid stream event: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

pub struct ApiClient {
    base_url: String,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    /// Client for the gateway described by `config`. A wildcard bind address is
    /// reached through loopback.
    pub fn from_config(config: &CliConfig) -> Self {
        Self::new(base_url(&config.host, config.port))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn models(&self) -> Result<ModelList> {
        let response = self
            .http
            .get(format!("{}/api/models", self.base_url))
            .send()
            .await?;
        json(response).await
    }

    pub async fn pull(&self, request: &PullRequest) -> Result<PullResponse> {
        self.post("/api/pull", request).await
    }

    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        self.post("/api/generate", request).await
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.post("/api/chat", request).await
    }

    /// Stream a completion, handing each text piece to `on_text` as it arrives.
    pub async fn generate_stream(
        &self,
        request: &GenerateRequest,
        mut on_text: impl FnMut(&str),
    ) -> Result<()> {
        self.stream("/api/generate", request, |payload| {
            let event: GenerateEvent = serde_json::from_str(payload)?;
            if let Some(text) = &event.response {
                on_text(text);
            }
            Ok(event.done)
        })
        .await
    }

    /// Stream a chat reply, handing each content delta to `on_text` as it arrives.
    pub async fn chat_stream(
        &self,
        request: &ChatRequest,
        mut on_text: impl FnMut(&str),
    ) -> Result<()> {
        self.stream("/api/chat", request, |payload| {
            let event: ChatEvent = serde_json::from_str(payload)?;
            if let Some(delta) = &event.message {
                on_text(&delta.content);
            }
            Ok(event.done)
        })
        .await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;
        json(response).await
    }

    /// Feed every `data:` payload to `handle` until it reports the terminal event.
    async fn stream<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        mut handle: impl FnMut(&str) -> Result<bool>,
    ) -> Result<()> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;
        let response = check(response).await?;

        let mut decoder = LineDecoder::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            for line in decoder.push(&chunk?) {
                if let Some(payload) = data_payload(&line).filter(|p| !p.is_empty()) {
                    if handle(payload)? {
                        return Ok(());
                    }
                }
            }
        }
        if let Some(line) = decoder.finish() {
            if let Some(payload) = data_payload(&line).filter(|p| !p.is_empty()) {
                handle(payload)?;
            }
        }
        Ok(())
    }
}

fn base_url(host: &str, port: u16) -> String {
    let host = match host {
        "0.0.0.0" | "" => "127.0.0.1",
        other => other,
    };
    format!("http://{}:{}", host, port)
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(text);
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn json<T: DeserializeOwned>(response: Response) -> Result<T> {
    Ok(check(response).await?.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aurora_common::ChatMessage;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_base_url_maps_wildcard_host() {
        assert_eq!(base_url("0.0.0.0", 11435), "http://127.0.0.1:11435");
        assert_eq!(base_url("10.0.0.5", 8080), "http://10.0.0.5:8080");

        let config = CliConfig::default();
        assert_eq!(
            ApiClient::from_config(&config).base_url(),
            "http://127.0.0.1:11435"
        );
    }

    #[tokio::test]
    async fn test_generate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({"prompt": "Hi", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "glm", "response": "Hello", "done": true
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri());
        let response = client
            .generate(&GenerateRequest {
                prompt: "Hi".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(response.response, "Hello");
    }

    #[tokio::test]
    async fn test_api_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"type": "model_unavailable", "message": "Model 'x' not found"}
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri());
        let request = ChatRequest {
            model: Some("x".to_string()),
            messages: vec![ChatMessage::user("Hi")],
            ..Default::default()
        };
        match client.chat(&request).await {
            Err(ClientError::Api { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "Model 'x' not found");
            }
            other => panic!("expected an API error, got {:?}", other.map(|r| r.done)),
        }
    }

    #[tokio::test]
    async fn test_chat_stream_collects_deltas() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"model\":\"glm\",\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n\n",
            ": keep-alive\n\n",
            "data: {\"model\":\"glm\",\"message\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":false}\n\n",
            "data: {\"model\":\"glm\",\"done\":true}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri());
        let request = ChatRequest {
            messages: vec![ChatMessage::user("Hi")],
            stream: true,
            ..Default::default()
        };
        let mut text = String::new();
        client
            .chat_stream(&request, |piece| text.push_str(piece))
            .await
            .unwrap();
        assert_eq!(text, "Hello");
    }

    #[tokio::test]
    async fn test_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [{"name": "glm", "path": "/m/glm.gguf", "source": "config"}]
            })))
            .mount(&server)
            .await;

        let models = ApiClient::new(server.uri()).models().await.unwrap();
        assert_eq!(models.models.len(), 1);
        assert_eq!(models.models[0].name, "glm");
    }
}
