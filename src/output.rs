//! Output types and the structured result written to stdout.
//!
//! [`ReviewOutput`] is what the library returns for a completed run.
//! [`RunResult`] is the single JSON object handed to the invoking caller:
//!
//! ```json
//! {"status":"success","findings":[{"page":2,"issue":"CFM too low"}], ...}
//! {"status":"error","reason":"unsupported format","detail":"...","findings":[]}
//! ```
//!
//! `status` and `findings` are always present. The remaining fields are
//! omitted when empty.

use crate::error::{AnnotationError, ChunkError, ReviewError};
use crate::model::Finding;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;

/// A chunk whose review was abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedChunk {
    /// 1-indexed chunk number.
    pub chunk: usize,
    pub provider: String,
    /// Attempts made, including the first.
    pub attempts: u32,
    pub error: ChunkError,
}

/// Why a finding has no annotation in the output PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnplacedReason {
    PageOutOfRange,
    TextNotFound,
}

/// A finding the annotator could not draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnplacedFinding {
    #[serde(flatten)]
    pub finding: Finding,
    pub reason: UnplacedReason,
}

/// Counters and timings for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub model: String,
    pub provider: String,
    pub context_window: usize,
    pub chunk_budget: usize,
    pub items: usize,
    pub chunks: usize,
    pub chunks_reviewed: usize,
    pub chunks_skipped: usize,
    pub findings: usize,
    pub annotations: usize,
    pub extract_ms: u64,
    pub review_ms: u64,
    pub annotate_ms: u64,
    pub total_ms: u64,
}

/// Everything a completed run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewOutput {
    /// De-duplicated, sorted by (page, issue, severity).
    pub findings: Vec<Finding>,
    /// Subset of `findings` with no annotation in the output PDF.
    pub unplaced_findings: Vec<UnplacedFinding>,
    pub skipped_chunks: Vec<SkippedChunk>,
    /// Path of the annotated copy, when one was written.
    pub annotated_file: Option<PathBuf>,
    pub annotation_error: Option<AnnotationError>,
    pub stats: RunStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

/// The structured result for the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub findings: Vec<Finding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unplaced_findings: Vec<UnplacedFinding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_chunks: Vec<SkippedChunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation_error: Option<AnnotationError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<RunStats>,
}

impl RunResult {
    pub fn success(output: ReviewOutput) -> Self {
        Self {
            status: RunStatus::Success,
            reason: None,
            detail: None,
            findings: output.findings,
            unplaced_findings: output.unplaced_findings,
            skipped_chunks: output.skipped_chunks,
            annotated_file: output.annotated_file,
            annotation_error: output.annotation_error,
            stats: Some(output.stats),
        }
    }

    pub fn failure(error: &ReviewError) -> Self {
        Self {
            status: RunStatus::Error,
            reason: Some(error.reason().to_string()),
            detail: Some(error.to_string()),
            findings: Vec::new(),
            unplaced_findings: Vec::new(),
            skipped_chunks: Vec::new(),
            annotated_file: None,
            annotation_error: None,
            stats: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Compact JSON, no trailing newline.
    pub fn to_json(&self) -> String {
        // Only strings, numbers, paths and plain enums; cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Write the result as one line and flush.
    pub fn emit<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        writeln!(out, "{}", self.to_json())?;
        out.flush()
    }
}

impl From<Result<ReviewOutput, ReviewError>> for RunResult {
    fn from(outcome: Result<ReviewOutput, ReviewError>) -> Self {
        match outcome {
            Ok(output) => RunResult::success(output),
            Err(e) => RunResult::failure(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn minimal_success_shape() {
        let output = ReviewOutput {
            findings: vec![Finding::new(2, "CFM too low")],
            ..Default::default()
        };
        let v: Value = serde_json::from_str(&RunResult::success(output).to_json()).unwrap();
        assert_eq!(v["status"], "success");
        assert_eq!(v["findings"], json!([{"page": 2, "issue": "CFM too low"}]));
        assert!(v.get("skipped_chunks").is_none());
        assert!(v.get("reason").is_none());
    }

    #[test]
    fn failure_carries_reason() {
        let err = ReviewError::UnsupportedFormat {
            extension: ".docx".into(),
        };
        let r = RunResult::failure(&err);
        assert!(!r.is_success());
        let v: Value = serde_json::from_str(&r.to_json()).unwrap();
        assert_eq!(v["status"], "error");
        assert_eq!(v["reason"], "unsupported format");
        assert_eq!(v["findings"], json!([]));
        assert!(v.get("annotated_file").is_none());
    }

    #[test]
    fn skipped_and_unplaced_are_listed() {
        let output = ReviewOutput {
            findings: vec![Finding::new(99, "x")],
            unplaced_findings: vec![UnplacedFinding {
                finding: Finding::new(99, "x"),
                reason: UnplacedReason::PageOutOfRange,
            }],
            skipped_chunks: vec![SkippedChunk {
                chunk: 2,
                provider: "openai".into(),
                attempts: 3,
                error: ChunkError::Timeout { ms: 60_000 },
            }],
            ..Default::default()
        };
        let v: Value = serde_json::from_str(&RunResult::from(Ok(output)).to_json()).unwrap();
        assert_eq!(
            v["unplaced_findings"],
            json!([{"page": 99, "issue": "x", "reason": "page_out_of_range"}])
        );
        assert_eq!(v["skipped_chunks"][0]["chunk"], 2);
        assert_eq!(v["skipped_chunks"][0]["error"]["kind"], "timeout");
    }

    #[test]
    fn emit_writes_one_line() {
        let mut buf = Vec::new();
        RunResult::success(ReviewOutput::default()).emit(&mut buf).unwrap();
        let s = String::from_utf8(buf).unwrap();
        assert_eq!(s.lines().count(), 1);
        assert!(s.ends_with('\n'));
    }
}
