//! Inference gateway: request validation, engine preparation, and proxying.

mod stream;

pub use stream::{chat_events, data_payloads, generate_events, EventStream};

use std::path::PathBuf;
use std::sync::Arc;

use aurora_common::{
    Attachment, ChatEvent, ChatMessage, ChatRequest, ChatResponse, ContentPart, GenerateEvent,
    GenerateRequest, GenerateResponse, ImageUrl, MessageContent,
};
use reqwest::Client;
use serde::Serialize;
use tracing::Level;

use crate::engine::{
    ChatCompletionsRequest, ChatCompletionsResponse, CompletionRequest, CompletionResponse,
    ReadinessPolicy, Supervisor,
};
use crate::error::{Error, Result};
use crate::logs::{self, LogSink};
use crate::models::ModelResolver;

/// Result of a proxied call: a complete body, or a stream of events.
pub enum Reply<T, E> {
    Complete(T),
    Stream(EventStream<E>),
}

/// Forwards generate and chat requests to llama-server, starting it with the right
/// model first.
pub struct InferenceGateway {
    http_client: Client,
    supervisor: Arc<dyn Supervisor>,
    resolver: ModelResolver,
    readiness: ReadinessPolicy,
    default_model: String,
    logs: Arc<dyn LogSink>,
}

impl InferenceGateway {
    pub fn new(
        http_client: Client,
        supervisor: Arc<dyn Supervisor>,
        resolver: ModelResolver,
        readiness: ReadinessPolicy,
        default_model: String,
        logs: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            http_client,
            supervisor,
            resolver,
            readiness,
            default_model,
            logs,
        }
    }

    pub async fn generate(
        &self,
        request: GenerateRequest,
    ) -> Result<Reply<GenerateResponse, GenerateEvent>> {
        if request.prompt.is_empty() {
            return Err(Error::BadRequest("prompt is required".to_string()));
        }
        let model = self.model_name(request.model);
        self.prepare(&model).await?;

        self.record(
            Level::INFO,
            format!("generate request model={} stream={}", model, request.stream),
        );
        let options = request.options.unwrap_or_default();
        let body = CompletionRequest::new(request.prompt, &options, request.stream);
        let response = self.post("/completion", &body).await?;

        if request.stream {
            return Ok(Reply::Stream(generate_events(&model, response.bytes_stream())));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("invalid completion response: {}", e)))?;
        Ok(Reply::Complete(GenerateResponse::new(model, completion.content)))
    }

    pub async fn chat(&self, request: ChatRequest) -> Result<Reply<ChatResponse, ChatEvent>> {
        if request.messages.is_empty() {
            return Err(Error::BadRequest("messages array is required".to_string()));
        }
        let model = self.model_name(request.model);
        self.prepare(&model).await?;

        self.record(
            Level::INFO,
            format!("chat request model={} stream={}", model, request.stream),
        );
        let mut messages = request.messages;
        if let Some(attachments) = request.attachments.as_deref() {
            attach_images(&mut messages, attachments);
        }
        let options = request.options.unwrap_or_default();
        let body = ChatCompletionsRequest::new(messages, &options, request.stream);
        let response = self.post("/v1/chat/completions", &body).await?;

        if request.stream {
            return Ok(Reply::Stream(chat_events(&model, response.bytes_stream())));
        }

        let completion: ChatCompletionsResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("invalid chat response: {}", e)))?;
        Ok(Reply::Complete(ChatResponse::new(model, completion.into_message())))
    }

    fn model_name(&self, requested: Option<String>) -> String {
        requested
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.default_model.clone())
    }

    /// Resolve the model, then make sure a healthy engine serves it.
    async fn prepare(&self, model: &str) -> Result<()> {
        let entry = self.resolver.resolve(model)?;
        let path = PathBuf::from(&entry.path);
        if !path.exists() {
            return Err(Error::ModelUnavailable(format!(
                "Model file missing at {}",
                path.display()
            )));
        }

        self.supervisor.ensure(&path, &entry.name).await?;
        self.supervisor.wait_healthy(self.readiness).await?;

        // A concurrent request may have switched the engine to another model while
        // this one was waiting.
        if !self.supervisor.is_serving(&path, &entry.name).await {
            return Err(Error::EngineNotReady(format!(
                "llama-server was switched away from {} before the request was sent",
                entry.name
            )));
        }
        Ok(())
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.supervisor.base_url(), path);
        tracing::debug!("Sending request to llama-server: {}", url);

        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!("{} returned {}: {}", url, status, text)));
        }
        Ok(response)
    }

    fn record(&self, level: Level, message: String) {
        logs::emit(self.logs.as_ref(), level, &message);
    }
}

/// Attach images to the final message when it is a plain-text user message.
///
/// The text becomes the first content part, followed by one `image_url` part per
/// attachment that carries a URL.
pub fn attach_images(messages: &mut [ChatMessage], attachments: &[Attachment]) {
    if attachments.is_empty() {
        return;
    }
    let Some(last) = messages.last_mut() else {
        return;
    };
    if last.role != "user" {
        return;
    }
    let MessageContent::Text(text) = &last.content else {
        return;
    };

    let mut parts = vec![ContentPart::Text { text: text.clone() }];
    parts.extend(
        attachments
            .iter()
            .filter_map(Attachment::image_url)
            .map(|url| ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: url.to_string(),
                },
            }),
    );
    last.content = MessageContent::Parts(parts);
}
