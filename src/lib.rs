//! # tabreview
//!
//! Review HVAC Test-and-Balance (TAB) reports against a tolerance profile
//! with a large language model, and mark the findings on the source PDF.
//!
//! ## Why this crate?
//!
//! A TAB report is dozens of pages of airflow and coil readings. Checking
//! every reading against the job's tolerances by hand is slow and easy to
//! get wrong. This crate extracts the report's text and tables, packs them
//! into context-window-sized chunks, asks a model to flag out-of-tolerance
//! readings, and writes a highlighted `<stem>_review.pdf` next to the
//! original.
//!
//! ## Pipeline Overview
//!
//! ```text
//! report.pdf / report.xlsx
//!  │
//!  ├─ 1. Extract   pdfium glyphs → text + tables / calamine sheets
//!  ├─ 2. Chunk     greedy packing under floor(context × ratio) tokens
//!  ├─ 3. Review    concurrent calls to gpt-4o / claude / gemini / grok / …
//!  ├─ 4. Annotate  highlight + note per match, via lopdf
//!  └─ 5. Output    {"status": "success", "findings": [...]}
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tabreview::{review_file, ReviewConfig, RunResult, ToleranceProfile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Key read from OPENAI_API_KEY unless set on the builder
//!     let config = ReviewConfig::builder().model("gpt-4o").build()?;
//!     let profile = ToleranceProfile::manager_default();
//!     let result = RunResult::from(review_file("tab_report.pdf", &profile, &config).await);
//!     result.emit(std::io::stdout())?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `tabreview` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod annotate;
pub mod catalog;
pub mod chunk;
pub mod config;
pub mod error;
pub mod extract;
pub mod layout;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod profile;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod review;
pub mod tokens;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use catalog::{ModelCatalog, ModelSpec, ProviderKind};
pub use config::{ReviewConfig, ReviewConfigBuilder};
pub use error::{AnnotationError, ChunkError, ReviewError};
pub use model::{Chunk, ContentItem, Finding, Severity};
pub use output::{ReviewOutput, RunResult, RunStats, RunStatus, SkippedChunk, UnplacedFinding};
pub use pipeline::{review_file, review_file_sync, review_file_with_store};
pub use profile::{DirectoryProfileStore, ProfileStore, Tolerance, ToleranceProfile, VersionedProfile};
pub use progress::{NoopProgressCallback, ProgressCallback, ReviewProgressCallback};
pub use provider::ProviderGateway;
pub use review::CancelToken;
