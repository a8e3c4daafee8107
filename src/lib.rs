//! # ragchat — document question answering with sources
//!
//! Splits a fixed document collection into overlapping chunks, embeds them
//! into a vector index, and answers questions from the most similar chunks,
//! reporting which documents the answer drew on.
//!
//! ## Architecture
//!
//! - **[`config`]** — Configuration loading, validation, and pattern expansion
//! - **[`indexer`]** — Corpus loading (txt, md, pdf) and fixed-window chunking
//! - **[`embedder`]** — Embedding boundary: local ONNX model, feature hashing, or OpenAI-compatible API
//! - **[`index`]** — In-memory vector index with cosine/euclidean search and persistence
//! - **[`retriever`]** — Query embedding and ranked passage selection
//! - **[`llm`]** — Language model boundary: extractive fallback or chat completions API
//! - **[`answer`]** — Prompt assembly and source attribution
//! - **[`service`]** — Live index handle, rebuild-and-swap, retry
//! - **[`server`]** — HTTP API (`POST /api/chat`) via axum

pub mod answer;
pub mod config;
pub mod embedder;
pub mod error;
pub mod index;
pub mod indexer;
pub mod lang;
pub mod llm;
pub mod retriever;
pub mod retry;
pub mod server;
pub mod service;
