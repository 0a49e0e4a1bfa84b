//! # topicdesk — local help-desk chatbot
//!
//! Answers questions against a small fixed set of topic sections. A question
//! is matched to a section by exact label or embedding similarity, turned
//! into a prompt, and completed by a local language model.
//!
//! ## Architecture
//!
//! - **[`matcher`]** — Best-section retrieval (exact label, lead-in phrase, cosine similarity)
//! - **[`topics`]** — Topic file loading (ordered label → content)
//! - **[`embedder`]** — Text embedding via ONNX Runtime, Ollama, or mocks
//! - **[`generation`]** — Completion backends (OpenAI-compatible, Ollama, mock)
//! - **[`context`]** — Active generation backend with runtime model switching
//! - **[`desk`]** — Help-desk turn: greeting, domain gate, match, prompt, answer
//! - **[`assistant`]** — Free-form chat with a bounded history window
//! - **[`console`]** / **[`server`]** — Terminal loops and the axum web front end
//! - **[`config`]** — JSON configuration with defaults and validation

pub mod app;
pub mod assistant;
pub mod config;
pub mod console;
pub mod context;
pub mod desk;
pub mod embedder;
pub mod generation;
pub mod matcher;
pub mod prompt;
pub mod server;
pub mod topics;
