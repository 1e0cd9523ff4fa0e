//! The resilient fetch engine.
//!
//! [`FetchEngine`] owns one instance of every component and wires them into
//! the request path: cache lookup, then a scheduled task which retries the
//! fetch across endpoints under the rate limiter, then a cache write. A
//! background maintenance task sweeps expired cache entries and runs endpoint
//! health checks when they are due.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::Method;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reelfetch_common::{Error, Priority, Result, TaskId};

use crate::cache::{CacheStats, TtlLruCache};
use crate::config::{Config, RetryPolicy};
use crate::fetch::{FetchRequest, FetchResponse, Fetcher, HttpFetcher};
use crate::rate_limit::{AdaptiveRateLimiter, RateLimiterStats};
use crate::retry::RetryExecutor;
use crate::scheduler::{AdaptiveScheduler, SchedulerStats, TaskContext, TaskHandle};
use crate::sources::{EndpointHealth, HealthCheckSummary, SourceRegistry};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A fetched resource as stored in the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub body: Bytes,
    pub content_type: Option<String>,
    pub status: u16,
    /// Endpoint that served the bytes.
    pub endpoint: String,
}

impl From<FetchResponse> for Resource {
    fn from(resp: FetchResponse) -> Self {
        Self {
            body: resp.body,
            content_type: resp.content_type,
            status: resp.status,
            endpoint: resp.endpoint,
        }
    }
}

/// Where a [`Fetched`] value came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Origin {
    Cache,
    Network { endpoint: String, attempts: u32 },
    /// The fetch failed and an expired cached value was returned instead.
    Stale { error: String },
}

#[derive(Debug, Clone)]
pub struct Fetched {
    pub resource: Resource,
    pub origin: Origin,
}

impl Fetched {
    pub fn is_stale(&self) -> bool {
        matches!(self.origin, Origin::Stale { .. })
    }
}

/// Per-call options for [`FetchEngine::fetch`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Path relative to the endpoint; defaults to the cache key.
    pub path: Option<String>,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub priority: Priority,
    /// Cache TTL for the result; defaults to the cache-level TTL.
    pub ttl: Option<Duration>,
    /// Return an expired cached value if the fetch fails.
    pub stale_read: bool,
    /// Skip the cache lookup (the result is still stored).
    pub bypass_cache: bool,
    /// Override the configured retry policy.
    pub retry: Option<RetryPolicy>,
    pub prefer_regional: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            path: None,
            method: Method::GET,
            headers: Vec::new(),
            query: Vec::new(),
            priority: Priority::Normal,
            ttl: None,
            stale_read: false,
            bypass_cache: false,
            retry: None,
            prefer_regional: false,
        }
    }
}

/// Aggregated statistics of every component.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub cache: CacheStats,
    pub scheduler: SchedulerStats,
    pub endpoints: Vec<EndpointHealth>,
    pub rate_limiter: RateLimiterStats,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct FetchEngine {
    config: Arc<Config>,
    cache: Arc<TtlLruCache<String, Resource>>,
    scheduler: AdaptiveScheduler,
    registry: Arc<SourceRegistry>,
    limiter: Arc<AdaptiveRateLimiter>,
    fetcher: Arc<dyn Fetcher>,
    shutdown: CancellationToken,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl FetchEngine {
    /// Build an engine talking HTTP.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let fetcher = Arc::new(HttpFetcher::from_config(&config)?);
        Self::with_fetcher(config, fetcher)
    }

    /// Build an engine over any [`Fetcher`].
    ///
    /// When called inside a tokio runtime the maintenance task is started.
    pub fn with_fetcher(config: Config, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(TtlLruCache::new(
            config.cache.max_cache_size,
            config.cache.default_ttl(),
        ));
        let registry = Arc::new(SourceRegistry::from_config(
            config.health.clone(),
            &config.endpoints,
        ));
        let limiter = Arc::new(AdaptiveRateLimiter::new(config.rate_limit.clone()));
        let scheduler = AdaptiveScheduler::new(config.scheduler.clone());

        let engine = Self {
            config: Arc::new(config),
            cache,
            scheduler,
            registry,
            limiter,
            fetcher,
            shutdown: CancellationToken::new(),
            maintenance: Mutex::new(None),
        };

        if tokio::runtime::Handle::try_current().is_ok() {
            let handle = engine.spawn_maintenance();
            *engine.maintenance.lock() = Some(handle);
        } else {
            warn!("No tokio runtime; cache cleanup and health checks will not run in the background");
        }

        info!(
            fetcher = engine.fetcher.name(),
            endpoints = engine.registry.len(),
            max_cache_size = engine.config.cache.max_cache_size,
            workers = engine.scheduler.worker_limit(),
            "Fetch engine started"
        );
        Ok(engine)
    }

    fn spawn_maintenance(&self) -> JoinHandle<()> {
        let cache = self.cache.clone();
        let registry = self.registry.clone();
        let fetcher = self.fetcher.clone();
        let shutdown = self.shutdown.clone();
        let period = self.config.cache.cleanup_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = cache.cleanup_expired();
                        debug!(removed, "Cache maintenance pass");
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = registry.check_health_if_due(fetcher.as_ref()) => {}
                        }
                    }
                }
            }
            debug!("Maintenance task stopped");
        })
    }

    /// Fetch `key`, from the cache when fresh, otherwise through the
    /// scheduler and retry executor.
    ///
    /// `candidates` lists endpoint base URLs to try; an empty slice uses the
    /// configured primary and fallback endpoints.
    pub async fn fetch(
        &self,
        key: &str,
        candidates: &[String],
        options: FetchOptions,
    ) -> Result<Fetched> {
        // Peek first: a plain get would evict the expired entry.
        let stale = if options.stale_read {
            self.cache.peek_stale(key)
        } else {
            None
        };

        if !options.bypass_cache {
            if let Some(resource) = self.cache.get(key) {
                debug!(key, "Cache hit");
                return Ok(Fetched {
                    resource,
                    origin: Origin::Cache,
                });
            }
        }

        match self.fetch_from_network(key, candidates, &options).await {
            Ok(fetched) => Ok(fetched),
            Err(err) => match stale {
                Some(resource) => {
                    warn!(key, error = %err, "Fetch failed, serving stale value");
                    Ok(Fetched {
                        resource,
                        origin: Origin::Stale {
                            error: err.to_string(),
                        },
                    })
                }
                None => Err(err),
            },
        }
    }

    async fn fetch_from_network(
        &self,
        key: &str,
        candidates: &[String],
        options: &FetchOptions,
    ) -> Result<Fetched> {
        let candidates = if candidates.is_empty() {
            let endpoints = &self.config.endpoints;
            let mut configured = endpoints.candidates();
            // Regional mirrors join the pool on request, or when they are all there is.
            if options.prefer_regional || configured.is_empty() {
                configured.extend(endpoints.regional.iter().cloned());
            }
            configured
        } else {
            candidates.to_vec()
        };
        if candidates.is_empty() {
            return Err(Error::NoEndpoints);
        }

        let request = FetchRequest {
            path: options.path.clone().unwrap_or_else(|| key.to_string()),
            method: options.method.clone(),
            headers: options.headers.clone(),
            query: options.query.clone(),
        };
        let policy = options
            .retry
            .clone()
            .unwrap_or_else(|| self.config.retry.clone());
        let executor = RetryExecutor::new(self.registry.clone(), self.limiter.clone())
            .prefer_regional(options.prefer_regional);
        let fetcher = self.fetcher.clone();

        let handle = self.scheduler.submit(options.priority, None, move |ctx| async move {
            let outcome = executor
                .execute(&candidates, &policy, ctx.cancellation(), |attempt| {
                    let fetcher = fetcher.clone();
                    let request = request.clone();
                    async move { fetcher.fetch(&attempt.endpoint, &request).await }
                })
                .await?;
            ctx.record_retries(outcome.retries());
            Ok::<_, Error>(outcome)
        })?;

        let task_id = handle.id().clone();
        let result = handle.join().await;
        let outcome = result.outcome?;

        debug!(
            key,
            task_id = %task_id,
            endpoint = %outcome.endpoint,
            attempts = outcome.attempts,
            "Fetched from network"
        );

        let resource = Resource::from(outcome.value);
        self.cache
            .set(key.to_string(), resource.clone(), options.ttl);

        Ok(Fetched {
            resource,
            origin: Origin::Network {
                endpoint: outcome.endpoint,
                attempts: outcome.attempts,
            },
        })
    }

    /// Schedule an arbitrary operation on the engine's scheduler.
    pub fn submit<T, F, Fut>(&self, priority: Priority, op: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.scheduler.submit(priority, Some(TaskId::new()), op)
    }

    /// Drop a cached key. Returns whether it was cached.
    pub fn invalidate(&self, key: &str) -> bool {
        self.cache.delete(key)
    }

    /// Probe every endpoint now.
    pub async fn check_endpoints(&self) -> HealthCheckSummary {
        self.registry.force_health_check(self.fetcher.as_ref()).await
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            cache: self.cache.stats(),
            scheduler: self.scheduler.stats(),
            endpoints: self.registry.report(),
            rate_limiter: self.limiter.stats(),
        }
    }

    /// Stop intake, then drain (graceful) or cancel outstanding work.
    ///
    /// Returns `true` when no work was left behind. A graceful shutdown that
    /// does not drain within the configured timeout cancels what remains.
    pub async fn shutdown(&self, graceful: bool) -> bool {
        info!(graceful, "Shutting down fetch engine");
        self.scheduler.close();

        let drained = if graceful {
            let timeout = self.config.scheduler.shutdown_timeout();
            let drained = self.scheduler.wait_for_completion(timeout).await;
            if !drained {
                let cancelled = self.scheduler.cancel_all();
                warn!(cancelled, "Graceful shutdown timed out, cancelling remaining tasks");
            }
            drained
        } else {
            let cancelled = self.scheduler.cancel_all();
            cancelled == 0 && self.scheduler.stats().active == 0
        };

        self.shutdown.cancel();
        let maintenance = self.maintenance.lock().take();
        if let Some(handle) = maintenance {
            let _ = handle.await;
        }

        info!(drained, "Fetch engine stopped");
        drained
    }

    pub fn cache(&self) -> &TtlLruCache<String, Resource> {
        &self.cache
    }

    pub fn scheduler(&self) -> &AdaptiveScheduler {
        &self.scheduler
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for FetchEngine {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
