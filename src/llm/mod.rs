//! LLM Provider Clients
//!
//! - [`LLMClient`] - the trait all providers implement
//! - [`OllamaClient`] - local Ollama server over HTTP
//!
//! Only the LLM-backed reasoning stage talks to these clients; the default
//! rule-based analyst needs no model at all.

/// Core LLM client trait.
pub mod client;
/// Ollama chat client.
pub mod ollama;

pub use client::LLMClient;
pub use ollama::OllamaClient;
