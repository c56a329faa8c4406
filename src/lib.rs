//! # Waypoint
//!
//! A multi-tenant retrieval-augmented answering pipeline for team knowledge
//! sources.
//!
//! Waypoint keeps per-tenant vector index namespaces in sync with workspace
//! docs and code-host activity (issues, pull requests, commits), and answers
//! natural-language questions by classifying them, retrieving supporting
//! chunks from the right namespace, and composing a grounded completion.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │  Connectors  │──▶│  Sync Engine   │──▶│ Vector Index │
//! │ Docs/CodeHost│   │ Chunk + Embed │   │ (namespaced) │
//! └──────────────┘   └───────┬───────┘   └──────┬───────┘
//!                            │                  │
//!                    SQLite checkpoints         ▼
//!                                        ┌──────────────┐
//!                    query ──▶ classify ─▶│  Retriever   │─▶ compose ──▶ answer
//!                                        └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and tenant resolution |
//! | [`models`] | Core data types |
//! | [`chunker`] | Deterministic overlapping text chunking |
//! | [`embedding`] | Embedding service seam + OpenAI-compatible client |
//! | [`completion`] | Completion service seam + OpenAI-compatible client |
//! | [`index`] | Vector index seam + Pinecone-style client |
//! | [`connector`] | Source connector seam |
//! | [`connector_workspace`] | Workspace-docs (Notion API) connector |
//! | [`connector_codehost`] | Code-host (GitHub API) connector |
//! | [`sync`] | Incremental embedding sync engine |
//! | [`retrieval`] | Namespace-scoped semantic retrieval |
//! | [`router`] | Query classification and routing |
//! | [`answer`] | Grounded answer composition |
//! | [`db`] | Checkpoint database connection |
//! | [`migrate`] | Checkpoint schema migrations |

pub mod answer;
pub mod chunker;
pub mod completion;
pub mod config;
pub mod connector;
pub mod connector_codehost;
pub mod connector_workspace;
pub mod db;
pub mod embedding;
pub mod error;
pub mod index;
pub mod migrate;
pub mod models;
pub mod retrieval;
pub mod router;
pub mod sync;
