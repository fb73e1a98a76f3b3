//! LLM provider access: the chat-completions client and the fallback
//! classifier built on it.

pub mod classifier;
pub mod client;

pub use classifier::{parse_llm_answer, LlmSettings, OpenRouterClassifier};
pub use client::{ChatClient, ChatMessage, ChatRequest, ChatResponse};
