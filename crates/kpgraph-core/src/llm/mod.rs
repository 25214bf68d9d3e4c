//! LLM integration over an OpenAI-compatible chat completion API
//!
//! Used only by the knowledge collaborator; the graph core never talks to it
//! directly.

mod client;
mod types;

pub use client::{LlmClient, LlmClientBuilder};
pub use types::{
    ChatRequest, ChatResponse, Choice, Completion, FinishReason, Message, MessageRole,
    ResponseFormat, Usage,
};
