//! Aurora Common Types
//!
//! Shared types used by both the gateway and the command-line client, and the
//! on-disk registry of downloaded models that both of them read.

pub mod chat;
pub mod generate;
pub mod models;
pub mod options;
pub mod registry;
pub mod sse;

pub use chat::{
    Attachment, ChatDelta, ChatEvent, ChatMessage, ChatRequest, ChatResponse, ContentPart,
    ImageUrl, MessageContent,
};
pub use generate::{GenerateEvent, GenerateRequest, GenerateResponse};
pub use models::{
    ModelEntry, ModelList, ModelSource, PopularModel, PullRequest, PullResponse,
};
pub use options::InferenceOptions;
pub use registry::{ModelRegistry, RegistryEntry, RegistryError};
