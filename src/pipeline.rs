//! End-to-end review of one report file.
//!
//! ```text
//! report.pdf / report.xlsx
//!  │
//!  ├─ 1. Detect   extension → SourceKind (unsupported formats stop here)
//!  ├─ 2. Gateway  configured gateway, or built from model + catalog
//!  ├─ 3. Extract  ordered ContentItems (spawn_blocking)
//!  ├─ 4. Chunk    greedy packing under floor(context × ratio)
//!  ├─ 5. Review   bounded-concurrency provider calls, retry, aggregate
//!  ├─ 6. Annotate <stem>_review.pdf (PDF only, failures absorbed)
//!  └─ 7. Output   ReviewOutput + RunStats
//! ```

use crate::annotate::{self, review_output_path};
use crate::catalog::ProviderKind;
use crate::chunk::{chunk_items, chunk_max_size};
use crate::config::ReviewConfig;
use crate::error::ReviewError;
use crate::extract::{self, SourceKind};
use crate::output::{ReviewOutput, RunStats};
use crate::profile::{ProfileStore, ToleranceProfile};
use crate::provider::{build_gateway, ProviderGateway};
use crate::review::{review_all, ReviewOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Review `path` against `profile`.
///
/// # Returns
/// `Ok(ReviewOutput)` whenever the pipeline completed, even if some chunks
/// were skipped or the annotated copy could not be written (see
/// `skipped_chunks` and `annotation_error`).
///
/// # Errors
/// Returns `Err(ReviewError)` only for fatal errors:
/// - unsupported extension, missing or unreadable file
/// - provider not configured
/// - cancellation
pub async fn review_file(
    path: impl AsRef<Path>,
    profile: &ToleranceProfile,
    config: &ReviewConfig,
) -> Result<ReviewOutput, ReviewError> {
    let total_start = Instant::now();
    let path = path.as_ref();
    info!("Starting review: {}", path.display());

    // ── Step 1: Detect format ────────────────────────────────────────────
    let kind = SourceKind::detect(path)?;

    // ── Step 2: Resolve model and gateway ────────────────────────────────
    let spec = config.model_spec();
    let gateway = resolve_gateway(config, &spec.provider)?;

    // ── Step 3: Extract ──────────────────────────────────────────────────
    let extract_start = Instant::now();
    let (_, items) = extract::extract(path).await?;
    let extract_ms = extract_start.elapsed().as_millis() as u64;
    let item_count = items.len();

    // ── Step 4: Chunk ────────────────────────────────────────────────────
    let budget = chunk_max_size(spec.context_window, config.chunk_ratio);
    let chunks = chunk_items(items, budget, config.token_counter.as_ref());
    let chunk_count = chunks.len();

    // ── Step 5: Review ───────────────────────────────────────────────────
    let review_start = Instant::now();
    let options = ReviewOptions::from_config(config);
    let summary = review_all(chunks, Arc::clone(&gateway), profile, &options).await?;
    let review_ms = review_start.elapsed().as_millis() as u64;

    if config.cancel.is_cancelled() {
        return Err(ReviewError::Cancelled {
            reviewed: summary.reviewed(),
            total: summary.total_chunks,
        });
    }

    let mut output = ReviewOutput {
        findings: summary.findings,
        skipped_chunks: summary.skipped_chunks,
        ..Default::default()
    };

    // ── Step 6: Annotate ─────────────────────────────────────────────────
    let annotate_start = Instant::now();
    let mut annotations = 0usize;
    if kind.is_annotatable() && config.annotate {
        let target = review_output_path(path);
        match annotate::annotate(path, &output.findings, &target).await {
            Ok(report) => {
                annotations = report.annotations;
                output.unplaced_findings = report.unplaced;
                output.annotated_file = Some(report.output);
            }
            Err(e) => {
                warn!("Annotation failed, findings are still reported: {}", e);
                output.annotation_error = Some(e);
            }
        }
    }
    let annotate_ms = annotate_start.elapsed().as_millis() as u64;

    // ── Step 7: Stats ────────────────────────────────────────────────────
    output.stats = RunStats {
        model: gateway.model().to_string(),
        provider: gateway.provider().to_string(),
        context_window: spec.context_window,
        chunk_budget: budget,
        items: item_count,
        chunks: chunk_count,
        chunks_reviewed: chunk_count - output.skipped_chunks.len(),
        chunks_skipped: output.skipped_chunks.len(),
        findings: output.findings.len(),
        annotations,
        extract_ms,
        review_ms,
        annotate_ms,
        total_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Review finished: {} findings, {}/{} chunks reviewed, {}ms total",
        output.stats.findings,
        output.stats.chunks_reviewed,
        chunk_count,
        output.stats.total_ms
    );
    Ok(output)
}

/// Fetch profile `profile_id` from `store`, then [`review_file`].
///
/// The profile is fetched on every call so edits made elsewhere are picked
/// up by the next run.
pub async fn review_file_with_store(
    path: impl AsRef<Path>,
    store: &dyn ProfileStore,
    profile_id: &str,
    config: &ReviewConfig,
) -> Result<ReviewOutput, ReviewError> {
    let versioned = store.fetch(profile_id)?;
    info!(
        "Using profile '{}' ({} v{})",
        versioned.profile.name, versioned.id, versioned.version
    );
    review_file(path, &versioned.profile, config).await
}

/// Synchronous wrapper around [`review_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn review_file_sync(
    path: impl AsRef<Path>,
    profile: &ToleranceProfile,
    config: &ReviewConfig,
) -> Result<ReviewOutput, ReviewError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ReviewError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(review_file(path, profile, config))
}

fn resolve_gateway(
    config: &ReviewConfig,
    provider: &ProviderKind,
) -> Result<Arc<dyn ProviderGateway>, ReviewError> {
    match config.gateway {
        Some(ref gateway) => Ok(Arc::clone(gateway)),
        None => build_gateway(provider, config.gateway_settings()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChunkError;
    use crate::prompts::ReviewPrompt;
    use async_trait::async_trait;

    struct Silent;

    #[async_trait]
    impl ProviderGateway for Silent {
        fn provider(&self) -> &str {
            "silent"
        }
        fn model(&self) -> &str {
            "silent-1"
        }
        async fn complete(&self, _prompt: &ReviewPrompt) -> Result<String, ChunkError> {
            Ok(r#"{"findings": []}"#.into())
        }
    }

    #[tokio::test]
    async fn unsupported_format_fails_before_provider_setup() {
        // No key anywhere: reaching the gateway step would be a different error.
        let config = ReviewConfig::builder()
            .provider(ProviderKind::Other("definitely-not-a-provider".into()))
            .build()
            .unwrap();
        let err = review_file("notes.docx", &ToleranceProfile::manager_default(), &config)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "unsupported format");
    }

    #[tokio::test]
    async fn missing_file_is_extraction_failure() {
        let config = ReviewConfig::builder()
            .gateway(Arc::new(Silent))
            .build()
            .unwrap();
        let err = review_file("/nonexistent/report.xlsx", &ToleranceProfile::manager_default(), &config)
            .await
            .unwrap_err();
        assert!(err.is_extraction());
    }
}
