//! Request orchestration
//!
//! Wires the pieces together for one generation request:
//!
//! ```text
//! derive key -> cache lookup -> [miss] provider call -> sanitize -> cache store
//! ```
//!
//! Scene mutations go through [`Orchestrator::with_scene_mut`] and reads
//! through [`Orchestrator::with_scene`]; both hold only the scene's own lock.
//! The provider call never runs under a scene lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::ResponseCache;
use crate::config::{Config, ProviderConfig};
use crate::key::derive_cache_key;
use crate::locks::SceneLockRegistry;
use crate::provider::{CompletionRequest, FinishReason, TextProvider};
use crate::sanitize::sanitize;
use crate::{Error, Result};

/// A generation request; unset parameters fall back to configuration
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// User prompt
    pub prompt: String,
    /// System prompt
    pub system_prompt: String,
    /// Model override
    pub model: Option<String>,
    /// Temperature override
    pub temperature: Option<f32>,
    /// Token limit override
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    /// Request with default model and parameters
    pub fn new(prompt: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: system_prompt.into(),
            ..Self::default()
        }
    }

    /// Use a specific model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Use a specific temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Use a specific token limit
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn resolve(self, defaults: &ProviderConfig) -> CompletionRequest {
        CompletionRequest {
            prompt: self.prompt,
            system_prompt: self.system_prompt,
            model: self.model.unwrap_or_else(|| defaults.default_model.clone()),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
        }
    }
}

/// A sanitized generation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// Sanitized reply text
    pub text: String,
    /// Model that produced it
    pub model: String,
    /// Tokens billed by the provider
    pub tokens_used: u64,
    /// Why generation stopped
    pub finish_reason: FinishReason,
    /// Served from the response cache
    #[serde(skip)]
    pub cached: bool,
}

#[derive(Debug, Default)]
struct Usage {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    provider_calls: AtomicU64,
    tokens_used: AtomicU64,
}

/// In-memory usage counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    /// Generation requests received
    pub requests: u64,
    /// Requests answered from cache
    pub cache_hits: u64,
    /// Calls made to the provider
    pub provider_calls: u64,
    /// Tokens billed across provider calls
    pub tokens_used: u64,
}

/// Coordinates provider calls, caching, sanitizing and scene locking
pub struct Orchestrator {
    provider: Arc<dyn TextProvider>,
    cache: Arc<ResponseCache>,
    locks: Arc<SceneLockRegistry>,
    settings: ProviderConfig,
    cache_enabled: bool,
    usage: Usage,
}

impl Orchestrator {
    /// Build an orchestrator with its own cache and lock registry
    #[must_use]
    pub fn new(provider: Arc<dyn TextProvider>, config: &Config) -> Self {
        Self::with_parts(
            provider,
            config,
            Arc::new(ResponseCache::from_config(&config.cache)),
            Arc::new(SceneLockRegistry::new(&config.locks)),
        )
    }

    /// Build an orchestrator around an existing cache and lock registry
    #[must_use]
    pub fn with_parts(
        provider: Arc<dyn TextProvider>,
        config: &Config,
        cache: Arc<ResponseCache>,
        locks: Arc<SceneLockRegistry>,
    ) -> Self {
        Self {
            provider,
            cache,
            locks,
            settings: config.provider.clone(),
            cache_enabled: config.cache.enabled,
            usage: Usage::default(),
        }
    }

    /// Generate a sanitized reply, serving repeats from the cache
    #[tracing::instrument(skip_all, fields(provider = %self.provider.name()))]
    pub async fn generate(&self, request: GenerationRequest) -> Result<Generation> {
        self.usage.requests.fetch_add(1, Ordering::Relaxed);

        let request = request.resolve(&self.settings);
        let key = derive_cache_key(
            &request.prompt,
            &request.system_prompt,
            &request.model,
            &self.settings.name,
        );

        if self.cache_enabled {
            if let Some(mut hit) = self.cache.get_json::<Generation>(&key) {
                self.usage.cache_hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Serving generation from cache");
                hit.cached = true;
                return Ok(hit);
            }
        }

        let completion = self.provider.complete_text(&request).await?;
        self.usage.provider_calls.fetch_add(1, Ordering::Relaxed);
        self.usage
            .tokens_used
            .fetch_add(completion.tokens_used, Ordering::Relaxed);

        if completion.finish_reason == FinishReason::Length {
            warn!(model = %request.model, "Reply hit the token limit and may be truncated");
        }

        let generation = Generation {
            text: sanitize(&completion.text),
            model: request.model,
            tokens_used: completion.tokens_used,
            finish_reason: completion.finish_reason,
            cached: false,
        };

        if self.cache_enabled {
            self.cache.put_json(&key, &generation)?;
        }
        Ok(generation)
    }

    /// Generate and deserialize the sanitized reply as `T`
    pub async fn generate_json<T: DeserializeOwned>(&self, request: GenerationRequest) -> Result<T> {
        let generation = self.generate(request).await?;
        serde_json::from_str(&generation.text).map_err(Error::parse)
    }

    /// Run `f` with shared access to `scene`
    pub fn with_scene<F, R>(&self, scene: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.locks.execute_shared(scene, f)
    }

    /// Run `f` with exclusive access to `scene`
    pub fn with_scene_mut<F, R>(&self, scene: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.locks.execute_exclusive(scene, f)
    }

    /// Shared response cache
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Shared scene lock registry
    pub fn locks(&self) -> &Arc<SceneLockRegistry> {
        &self.locks
    }

    /// Usage counters since construction
    pub fn usage(&self) -> UsageSnapshot {
        UsageSnapshot {
            requests: self.usage.requests.load(Ordering::Relaxed),
            cache_hits: self.usage.cache_hits.load(Ordering::Relaxed),
            provider_calls: self.usage.provider_calls.load(Ordering::Relaxed),
            tokens_used: self.usage.tokens_used.load(Ordering::Relaxed),
        }
    }
}
