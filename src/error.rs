//! Error types for the tabreview library.
//!
//! Three error types reflect the three failure scopes of a review run:
//!
//! * [`ReviewError`]: **fatal**, the run cannot proceed at all (unsupported
//!   file type, unreadable document, provider not configured, cancelled).
//!   Returned as `Err(ReviewError)` from [`crate::pipeline::review_file`].
//!
//! * [`ChunkError`]: **per chunk**, one provider call failed (transport,
//!   timeout, rejected credential, malformed JSON). The chunk contributes no
//!   findings and is listed in [`crate::output::ReviewOutput::skipped_chunks`];
//!   every other chunk is still reviewed.
//!
//! * [`AnnotationError`]: **per document**, the annotated copy could not be
//!   produced. Already-computed findings are still returned.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the tabreview library.
#[derive(Debug, Error)]
pub enum ReviewError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The file extension is not one of the supported report formats.
    #[error("unsupported format: '{extension}' (expected .pdf, .xlsx, .xlsm, .xlsb, .xls or .ods)")]
    UnsupportedFormat { extension: String },

    /// Input file was not found at the given path.
    #[error("report file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The file has a `.pdf` extension but does not start with `%PDF`.
    #[error("file is not a valid PDF: '{path}' (first bytes: {magic:?})")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The document was opened but could not be read (corrupt, encrypted,
    /// truncated workbook, …).
    #[error("extraction failed for '{path}': {detail}")]
    Extraction { path: PathBuf, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or place the library next to the binary."
    )]
    PdfiumBindingFailed(String),

    // ── Provider errors ───────────────────────────────────────────────────
    /// The requested provider cannot be constructed (missing key, unknown name).
    #[error("provider '{provider}' is not configured: {hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Profile errors ────────────────────────────────────────────────────
    /// A tolerance profile could not be loaded.
    #[error("tolerance profile '{id}' unavailable: {detail}")]
    Profile { id: String, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Control flow ──────────────────────────────────────────────────────
    /// The run was cancelled before all chunks were reviewed.
    #[error("review cancelled after {reviewed}/{total} chunks")]
    Cancelled { reviewed: usize, total: usize },

    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ReviewError {
    /// Short, stable reason string for the structured result.
    pub fn reason(&self) -> &'static str {
        match self {
            ReviewError::UnsupportedFormat { .. } => "unsupported format",
            ReviewError::FileNotFound { .. }
            | ReviewError::PermissionDenied { .. }
            | ReviewError::NotAPdf { .. }
            | ReviewError::Extraction { .. }
            | ReviewError::PdfiumBindingFailed(_) => "extraction failed",
            ReviewError::ProviderNotConfigured { .. } => "provider not configured",
            ReviewError::Profile { .. } => "profile unavailable",
            ReviewError::InvalidConfig(_) => "invalid configuration",
            ReviewError::Cancelled { .. } => "cancelled",
            ReviewError::Internal(_) => "internal error",
        }
    }

    /// True for every error raised while turning the source file into items.
    pub fn is_extraction(&self) -> bool {
        self.reason() == "extraction failed"
    }
}

/// A recoverable failure of one provider call.
///
/// Stored in [`crate::output::SkippedChunk`]; the run continues.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkError {
    /// Connection refused, DNS failure, reset stream, …
    #[error("transport failure: {detail}")]
    Transport { detail: String },

    /// The call exceeded the per-call timeout.
    #[error("call timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// HTTP 429.
    #[error("rate limited by {provider}")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// Any other non-success HTTP status.
    #[error("{provider} returned HTTP {status}: {detail}")]
    Status {
        provider: String,
        status: u16,
        detail: String,
    },

    /// HTTP 401/403: the credential was rejected.
    #[error("authentication rejected by {provider}: {detail}")]
    Auth { provider: String, detail: String },

    /// The response arrived but is not the expected JSON.
    #[error("malformed response: {detail}")]
    MalformedResponse { detail: String },
}

impl ChunkError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// A parse failure on a well-formed response is never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            ChunkError::Transport { .. }
            | ChunkError::Timeout { .. }
            | ChunkError::RateLimited { .. } => true,
            ChunkError::Status { status, .. } => *status >= 500,
            ChunkError::Auth { .. } | ChunkError::MalformedResponse { .. } => false,
        }
    }

    /// Map an HTTP status and body into the matching variant.
    pub fn from_status(provider: &str, status: u16, body: &str, retry_after: Option<u64>) -> Self {
        let detail = truncate(body, 300);
        match status {
            401 | 403 => ChunkError::Auth {
                provider: provider.to_string(),
                detail,
            },
            429 => ChunkError::RateLimited {
                provider: provider.to_string(),
                retry_after_secs: retry_after,
            },
            _ => ChunkError::Status {
                provider: provider.to_string(),
                status,
                detail,
            },
        }
    }
}

impl From<reqwest::Error> for ChunkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ChunkError::Timeout { ms: 0 }
        } else if e.is_decode() {
            ChunkError::MalformedResponse {
                detail: e.to_string(),
            }
        } else {
            ChunkError::Transport {
                detail: e.to_string(),
            }
        }
    }
}

/// A per-document failure while producing the annotated copy.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnnotationError {
    /// The source PDF could not be opened for annotation.
    #[error("cannot open '{path}' for annotation: {detail}")]
    Open { path: PathBuf, detail: String },

    /// Page geometry could not be read.
    #[error("cannot read page layout of '{path}': {detail}")]
    Layout { path: PathBuf, detail: String },

    /// The annotated copy could not be written.
    #[error("cannot save annotated PDF to '{path}': {detail}")]
    Save { path: PathBuf, detail: String },
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}\u{2026}")
    }
}
