//! Data models for the Chat Completions and Responses APIs.
//!
//! This module groups two submodules:
//! - `chat`: Types representing the upstream Chat Completions result and streaming-chunk documents.
//! - `responses`: Types representing the client-facing Responses API result document.
//!
//! The mapping logic that converts a Chat Completions result into a
//! Responses result is implemented in `crate::conversion`.

pub mod chat;
pub mod responses;

// Optional convenience re-exports for downstream users.
// These allow importing commonly-used types directly from `response2chat::models::*`.
pub use chat::{
    ChatChoice, ChatCompletionChunk, ChatCompletionResponse, ChatResponseMessage, ChatUsage,
    FunctionCall, ToolCall,
};
pub use responses::{OutputItem, OutputText, ResponsesResponse, ResponsesUsage, SummaryText};
