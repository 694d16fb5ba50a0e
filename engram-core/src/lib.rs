#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

//! # Engram Core
//!
//! Capture–classify–retrieve core of the Engram memory layer for AI
//! coding assistants.
//!
//! Every assistant interaction (prompts, tool runs, responses) is turned
//! into a durable vector-store record, enriched asynchronously, and
//! surfaced back into the assistant's context under a strict token
//! budget.
//!
//! ## Module Organization
//!
//! ### Write path
//! - [`storage`]: the canonical write entrypoint (validate → scan →
//!   route → truncate → dedup → embed → upsert → enqueue classify)
//! - [`security`]: three-layer secret/PII scanning
//! - [`tokens`]: `cl100k_base` accounting and boundary-aware truncation
//! - [`extraction`]: language/framework/importance enrichment for code
//!   captures
//! - [`queue`]: the retry queue and the classification queue
//!
//! ### Read path
//! - [`search`]: semantic search, recency lookups, collection routing
//! - [`injection`]: Tier-1 bootstrap and Tier-2 per-turn injection
//! - [`triggers`]: pure detectors feeding the read-side hooks
//!
//! ### Collaborator seams
//! - [`vector`]: the [`vector::VectorStore`] trait and Qdrant adapter
//! - [`embedding`]: the [`embedding::Embedder`] trait and HTTP client
//! - [`classifier`]: the LLM classification contract and worker logic
//!
//! ### Ambient
//! - [`config`]: env-driven, memoized, resettable configuration
//! - [`error`]: the error taxonomy with recoverability
//! - [`hooks`]: hook wire protocol and detached-worker plumbing
//! - [`observability`]: metrics registry, trace buffer, activity log
//!
//! ## Latency contract
//!
//! Read-side hooks budget 500 ms wall-clock; write-side hooks only fork
//! a detached worker and return. Nothing in this crate may block the
//! assistant past those budgets, and no failure may propagate to it.

pub mod classifier;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extraction;
pub mod hooks;
pub mod injection;
pub mod observability;
pub mod project;
pub mod queue;
pub mod search;
pub mod security;
pub mod storage;
pub mod tokens;
pub mod triggers;
pub mod types;
pub mod vector;

pub use config::{get_config, reset_config, Config};
pub use error::{Error, Result};
pub use search::{route_collections, MemorySearch, RouteTarget, SearchHit, SearchQuery};
pub use storage::{MemoryStorage, StoreRequest};
pub use types::{
    Collection, EmbeddingStatus, MemoryRecord, MemoryType, StoreOutcome, StoreStatus,
};
pub use vector::{PointFilter, VectorStore};
