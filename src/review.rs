//! Review orchestration: every chunk through the gateway, failures contained.
//!
//! ## Concurrency
//!
//! Chunks are independent, so they are reviewed through
//! `buffer_unordered(concurrency)`. The aggregate is a set (de-duplicated and
//! sorted), so the result does not depend on completion order or on the
//! concurrency degree.
//!
//! ## Failure policy
//!
//! Each attempt runs under a per-call timeout. Transient failures (timeout,
//! transport, 429, 5xx) are retried with exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`); anything else, including an
//! unparseable answer, is final on the first occurrence. A chunk that ends in
//! failure contributes nothing and is recorded as a [`SkippedChunk`]; the run
//! carries on.
//!
//! ## Cancellation
//!
//! The [`CancelToken`] is checked before every attempt. Chunks not yet
//! started when it fires are abandoned, in-flight calls finish or time out,
//! and the run returns [`ReviewError::Cancelled`].

use crate::config::ReviewConfig;
use crate::error::{ChunkError, ReviewError};
use crate::model::{Chunk, Finding};
use crate::output::SkippedChunk;
use crate::profile::ToleranceProfile;
use crate::progress::ProgressCallback;
use crate::provider::ProviderGateway;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Upper bound on a server-requested `Retry-After` wait.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Shared flag to abort a run between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Orchestrator knobs, usually derived from [`ReviewConfig`].
#[derive(Clone)]
pub struct ReviewOptions {
    pub concurrency: usize,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub progress: Option<ProgressCallback>,
    pub cancel: CancelToken,
}

impl ReviewOptions {
    pub fn from_config(config: &ReviewConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            timeout: config.api_timeout(),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            progress: config.progress_callback.clone(),
            cancel: config.cancel.clone(),
        }
    }

    fn backoff(&self, retry: u32, error: &ChunkError) -> Duration {
        let exponential = self.retry_backoff * 2u32.saturating_pow(retry.saturating_sub(1));
        match error {
            ChunkError::RateLimited {
                retry_after_secs: Some(secs),
                ..
            } => exponential.max(Duration::from_secs(*secs).min(MAX_RETRY_AFTER)),
            _ => exponential,
        }
    }
}

/// What the orchestrator hands back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewSummary {
    /// De-duplicated, sorted.
    pub findings: Vec<Finding>,
    /// Sorted by chunk number.
    pub skipped_chunks: Vec<SkippedChunk>,
    pub total_chunks: usize,
}

impl ReviewSummary {
    pub fn reviewed(&self) -> usize {
        self.total_chunks - self.skipped_chunks.len()
    }
}

enum ChunkOutcome {
    Reviewed(Vec<Finding>),
    Skipped(SkippedChunk),
    Abandoned,
}

/// Review every chunk and aggregate the findings.
///
/// Only cancellation is an `Err`; provider failures end up in
/// [`ReviewSummary::skipped_chunks`].
pub async fn review_all(
    chunks: Vec<Chunk>,
    gateway: Arc<dyn ProviderGateway>,
    profile: &ToleranceProfile,
    options: &ReviewOptions,
) -> Result<ReviewSummary, ReviewError> {
    let total = chunks.len();
    info!(
        "Reviewing {} chunks with {} ({}), concurrency {}",
        total,
        gateway.model(),
        gateway.provider(),
        options.concurrency
    );
    if let Some(ref cb) = options.progress {
        cb.on_review_start(total);
    }

    let outcomes: Vec<ChunkOutcome> = stream::iter(chunks.into_iter().map(|chunk| {
        let gateway = Arc::clone(&gateway);
        async move { review_chunk(gateway.as_ref(), &chunk, profile, options, total).await }
    }))
    .buffer_unordered(options.concurrency.max(1))
    .collect()
    .await;

    let mut findings = BTreeSet::new();
    let mut skipped = Vec::new();
    let mut abandoned = 0usize;
    for outcome in outcomes {
        match outcome {
            ChunkOutcome::Reviewed(f) => findings.extend(f),
            ChunkOutcome::Skipped(s) => skipped.push(s),
            ChunkOutcome::Abandoned => abandoned += 1,
        }
    }
    skipped.sort_by_key(|s| s.chunk);

    let reviewed = total - skipped.len() - abandoned;
    if let Some(ref cb) = options.progress {
        cb.on_review_complete(total, reviewed);
    }

    if abandoned > 0 {
        warn!("Review cancelled: {} of {} chunks never sent", abandoned, total);
        return Err(ReviewError::Cancelled { reviewed, total });
    }

    let summary = ReviewSummary {
        findings: findings.into_iter().collect(),
        skipped_chunks: skipped,
        total_chunks: total,
    };
    info!(
        "Review complete: {}/{} chunks reviewed, {} skipped, {} findings",
        summary.reviewed(),
        total,
        summary.skipped_chunks.len(),
        summary.findings.len()
    );
    Ok(summary)
}

async fn review_chunk(
    gateway: &dyn ProviderGateway,
    chunk: &Chunk,
    profile: &ToleranceProfile,
    options: &ReviewOptions,
    total: usize,
) -> ChunkOutcome {
    let number = chunk.index + 1;
    if options.cancel.is_cancelled() {
        return ChunkOutcome::Abandoned;
    }
    if let Some(ref cb) = options.progress {
        cb.on_chunk_start(number, total);
    }

    let mut attempt = 0u32;
    let error = loop {
        if attempt > 0 && options.cancel.is_cancelled() {
            return ChunkOutcome::Abandoned;
        }
        attempt += 1;
        debug!(
            "Chunk {}/{}: attempt {} ({} items, {} tokens)",
            number,
            total,
            attempt,
            chunk.len(),
            chunk.token_count
        );

        let result = match tokio::time::timeout(options.timeout, gateway.review(chunk, profile)).await
        {
            Ok(r) => r,
            Err(_) => Err(ChunkError::Timeout {
                ms: options.timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(findings) => {
                debug!("Chunk {}: {} findings", number, findings.len());
                if let Some(ref cb) = options.progress {
                    cb.on_chunk_complete(number, total, findings.len());
                }
                return ChunkOutcome::Reviewed(findings);
            }
            Err(e) if e.is_transient() && attempt <= options.max_retries => {
                let wait = options.backoff(attempt, &e);
                warn!(
                    "Chunk {}: attempt {} failed ({}), retrying in {}ms",
                    number,
                    attempt,
                    e,
                    wait.as_millis()
                );
                sleep(wait).await;
            }
            Err(e) => break e,
        }
    };

    warn!(
        "Chunk {} skipped after {} attempt(s) [{}]: {}",
        number,
        attempt,
        gateway.provider(),
        error
    );
    if let Some(ref cb) = options.progress {
        cb.on_chunk_error(number, total, &error.to_string());
    }
    ChunkOutcome::Skipped(SkippedChunk {
        chunk: number,
        provider: gateway.provider().to_string(),
        attempts: attempt,
        error,
    })
}
