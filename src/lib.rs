//! Taleforge core library
//!
//! Concurrency-safe resource layer for an interactive-fiction generation
//! service that turns free-text model replies into structured data.
//!
//! # Features
//!
//! - **Scene locks**: one shared/exclusive lock per scene key, created lazily,
//!   with a capacity-triggered idle sweep ([`locks::SceneLockRegistry`])
//! - **Response cache**: TTL-based lazy expiry and batch eviction of the
//!   oldest entries ([`cache::ResponseCache`])
//! - **Cache keys**: deterministic SHA-256 fingerprints of a request
//!   ([`key::derive_cache_key`])
//! - **JSON repair**: idempotent extraction of the JSON payload from noisy
//!   model output ([`sanitize::sanitize`])
//! - **Orchestration**: cache-aware provider calls ([`orchestrator::Orchestrator`])
//!
//! All state is in memory and resets on restart.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod key;
pub mod locks;
pub mod orchestrator;
pub mod provider;
pub mod sanitize;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => subscriber.with(fmt::layer().with_writer(std::io::stderr)).try_init(),
    };
    installed.map_err(|e| Error::Internal(format!("tracing already initialized: {e}")))
}
