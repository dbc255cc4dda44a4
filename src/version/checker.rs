//! Per-package update detection
//!
//! Each check walks the stages in order and stops at the first success:
//! cache, primary source, fallback source, text generation. A successful
//! extraction is cached and compared with the overlay's current version;
//! a newer upstream version is queued as a pending update.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use reqwest::Url;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{GENERATION_TIMEOUT, MAX_CONCURRENT_CHECKS};
use crate::parser::{ParserKind, ParserSpec, parse_version};
use crate::transport::{HttpClient, RateLimiter, TransportError};
use crate::version::cache::Cache;
use crate::version::error::{CheckError, StageError};
use crate::version::generator::{GenerationError, VersionGenerator};
use crate::version::gentoo::is_newer;
use crate::version::overlay::{OverlaySource, resolve_current_version};
use crate::version::pending::{PendingQueue, PendingUpdate};
use crate::version::sources::candidate_sources;
use crate::version::types::{CheckResult, PackageUpdateSpec, Stage};

/// Fallback parser with the primary JSON path filled in when the fallback
/// is also a JSON parser without its own path
pub fn fallback_parser_spec(primary: &ParserSpec, fallback: &ParserSpec) -> ParserSpec {
    let mut spec = fallback.clone();
    if spec.kind == Some(ParserKind::Json)
        && spec.path.is_none()
        && primary.kind == Some(ParserKind::Json)
    {
        spec.path = primary.path.clone();
    }
    spec
}

fn host_of(url: &str) -> Result<String, TransportError> {
    let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;
    parsed
        .host_str()
        .map(str::to_string)
        .ok_or_else(|| TransportError::InvalidUrl(format!("{url}: missing host")))
}

/// A version and the URL it was extracted from
struct Extracted {
    version: String,
    source: String,
}

pub struct Checker {
    overlay: Arc<dyn OverlaySource>,
    cache: Arc<Cache>,
    pending: Arc<PendingQueue>,
    client: Arc<HttpClient>,
    limiter: Arc<RateLimiter>,
    generator: Option<Arc<dyn VersionGenerator>>,
    generation_timeout: Duration,
    max_concurrency: usize,
}

impl Checker {
    pub fn new(
        overlay: Arc<dyn OverlaySource>,
        cache: Arc<Cache>,
        pending: Arc<PendingQueue>,
        client: Arc<HttpClient>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            overlay,
            cache,
            pending,
            client,
            limiter,
            generator: None,
            generation_timeout: GENERATION_TIMEOUT,
            max_concurrency: MAX_CONCURRENT_CHECKS,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn VersionGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn pending(&self) -> &PendingQueue {
        &self.pending
    }

    /// Check one package; failures are reported in the result
    pub async fn check_package(
        &self,
        cancel: &CancellationToken,
        spec: &PackageUpdateSpec,
        force: bool,
    ) -> CheckResult {
        let package = spec.package.as_str();
        if cancel.is_cancelled() {
            return CheckResult::failed(package, None, CheckError::Cancelled);
        }

        let current = match self.current_version(package) {
            Ok(current) => current,
            Err(e) => return CheckResult::failed(package, None, e),
        };

        match self.check_with_current(cancel, spec, &current, force).await {
            Ok(result) => result,
            Err(e) => CheckResult::failed(package, Some(current), e),
        }
    }

    /// Check every package with bounded concurrency.
    ///
    /// Results are in the order of `specs`.
    pub async fn check_all(
        &self,
        cancel: &CancellationToken,
        specs: &[PackageUpdateSpec],
        force: bool,
    ) -> Vec<CheckResult> {
        let semaphore = Semaphore::new(self.max_concurrency);
        let results: Mutex<Vec<Option<CheckResult>>> =
            Mutex::new(specs.iter().map(|_| None).collect());

        info!(
            "Checking {} packages ({} at a time)",
            specs.len(),
            self.max_concurrency
        );

        let tasks = specs.iter().enumerate().map(|(index, spec)| {
            let semaphore = &semaphore;
            let results = &results;
            async move {
                let result = match semaphore.acquire().await {
                    Ok(_permit) => self.check_package(cancel, spec, force).await,
                    Err(_) => CheckResult::failed(&spec.package, None, CheckError::Cancelled),
                };
                if let Some(e) = &result.error {
                    error!("Check failed for {}: {}", spec.package, e);
                }
                results.lock().await[index] = Some(result);
            }
        });
        join_all(tasks).await;

        results
            .into_inner()
            .into_iter()
            .zip(specs)
            .map(|(result, spec)| {
                result.unwrap_or_else(|| {
                    CheckResult::failed(&spec.package, None, CheckError::Cancelled)
                })
            })
            .collect()
    }

    /// Load the overlay's package list and check all of it
    pub async fn check_overlay(
        &self,
        cancel: &CancellationToken,
        force: bool,
    ) -> Result<Vec<CheckResult>, CheckError> {
        let specs = self.overlay.load_packages()?;
        Ok(self.check_all(cancel, &specs, force).await)
    }

    fn current_version(&self, package: &str) -> Result<String, CheckError> {
        let versions = self.overlay.recipe_versions(package)?;
        resolve_current_version(&versions)
            .ok_or_else(|| CheckError::NoCurrentVersion(package.to_string()))
    }

    async fn check_with_current(
        &self,
        cancel: &CancellationToken,
        spec: &PackageUpdateSpec,
        current: &str,
        force: bool,
    ) -> Result<CheckResult, CheckError> {
        if let Some(version) = self.cache.get_bypassing(&spec.package, force)? {
            debug!("Cache hit for {}: {}", spec.package, version);
            return self.record(spec, current, version, true);
        }

        let extracted = self.extract(cancel, spec).await?;
        self.cache
            .set(&spec.package, &extracted.version, &extracted.source)?;
        self.record(spec, current, extracted.version, false)
    }

    /// Compare with the current version and queue newer versions
    fn record(
        &self,
        spec: &PackageUpdateSpec,
        current: &str,
        upstream: String,
        from_cache: bool,
    ) -> Result<CheckResult, CheckError> {
        let has_update = is_newer(&upstream, current);
        if has_update {
            let unchanged = self
                .pending
                .get(&spec.package)?
                .is_some_and(|existing| {
                    existing.current_version == current && existing.new_version == upstream
                });
            if !unchanged {
                info!("Update found for {}: {} -> {}", spec.package, current, upstream);
                self.pending
                    .add(PendingUpdate::new(&spec.package, current, &upstream))?;
            }
        }

        Ok(CheckResult {
            package: spec.package.clone(),
            current_version: Some(current.to_string()),
            upstream_version: Some(upstream),
            has_update,
            from_cache,
            error: None,
        })
    }

    fn primary_url(&self, spec: &PackageUpdateSpec) -> Result<String, CheckError> {
        candidate_sources(Some(&spec.url), spec.homepage.as_deref())
            .into_iter()
            .next()
            .map(|source| source.url)
            .ok_or_else(|| CheckError::NoSource(spec.package.clone()))
    }

    async fn extract(
        &self,
        cancel: &CancellationToken,
        spec: &PackageUpdateSpec,
    ) -> Result<Extracted, CheckError> {
        let primary_url = self.primary_url(spec)?;
        let fallback_parser = spec
            .fallback_parser
            .as_ref()
            .map(|fallback| fallback_parser_spec(&spec.parser, fallback));

        let primary_error = match self
            .fetch_and_parse(cancel, &primary_url, spec, &spec.parser, fallback_parser.as_ref())
            .await
        {
            Ok(version) => {
                return Ok(Extracted {
                    version,
                    source: primary_url,
                });
            }
            Err(e) if e.is_cancelled() => return Err(CheckError::Cancelled),
            Err(e) => {
                warn!("Primary source failed for {}: {}", spec.package, e);
                e
            }
        };
        let mut last_stage = Stage::Primary;

        if let (Some(url), Some(parser)) = (&spec.fallback_url, &fallback_parser) {
            last_stage = Stage::Fallback;
            match self.fetch_and_parse(cancel, url, spec, parser, None).await {
                Ok(version) => {
                    return Ok(Extracted {
                        version,
                        source: url.clone(),
                    });
                }
                Err(e) if e.is_cancelled() => return Err(CheckError::Cancelled),
                Err(e) => warn!("Fallback source failed for {}: {}", spec.package, e),
            }
        }

        if let (Some(prompt), Some(generator)) = (&spec.llm_prompt, &self.generator) {
            last_stage = Stage::Generation;
            match self
                .generate(cancel, &primary_url, spec, prompt, generator.as_ref())
                .await
            {
                Ok(version) => {
                    return Ok(Extracted {
                        version,
                        source: primary_url,
                    });
                }
                Err(e) if e.is_cancelled() => return Err(CheckError::Cancelled),
                Err(e) => warn!("Text generation failed for {}: {}", spec.package, e),
            }
        }

        Err(CheckError::AllStagesFailed {
            package: spec.package.clone(),
            last_stage,
            primary: primary_error,
        })
    }

    async fn fetch(
        &self,
        cancel: &CancellationToken,
        url: &str,
        spec: &PackageUpdateSpec,
    ) -> Result<Vec<u8>, StageError> {
        let host = host_of(url)?;
        self.limiter.wait_for_host(cancel, &host).await?;
        debug!("Fetching {} for {}", url, spec.package);
        Ok(self.client.fetch_bytes(cancel, url, &spec.headers).await?)
    }

    async fn fetch_and_parse(
        &self,
        cancel: &CancellationToken,
        url: &str,
        spec: &PackageUpdateSpec,
        parser: &ParserSpec,
        fallback: Option<&ParserSpec>,
    ) -> Result<String, StageError> {
        let content = self.fetch(cancel, url, spec).await?;
        Ok(parse_version(&content, parser, fallback)?)
    }

    async fn generate(
        &self,
        cancel: &CancellationToken,
        url: &str,
        spec: &PackageUpdateSpec,
        prompt: &str,
        generator: &dyn VersionGenerator,
    ) -> Result<String, StageError> {
        self.limiter.wait_for_generation(cancel).await?;
        let content = self.fetch(cancel, url, spec).await?;
        let content = String::from_utf8_lossy(&content);

        let generated = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled.into()),
            result = tokio::time::timeout(
                self.generation_timeout,
                generator.generate_version(&content, prompt),
            ) => result,
        };
        let version = generated
            .map_err(|_| GenerationError::Timeout(self.generation_timeout))??;

        let version = version.trim();
        if version.is_empty() {
            return Err(GenerationError::EmptyVersion.into());
        }
        Ok(version.to_string())
    }
}
