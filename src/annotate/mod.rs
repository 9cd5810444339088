//! Drawing findings back onto the source PDF.
//!
//! ```text
//! source.pdf ──▶ pdf::load_layouts ──▶ placement::plan ──▶ writer::write_annotations ──▶ source_review.pdf
//! ```
//!
//! The source file is never modified. Layout reading goes through pdfium
//! (blocking) and writing through lopdf (blocking), so the whole step runs
//! under `spawn_blocking`.

pub mod placement;
pub mod writer;

use crate::error::AnnotationError;
use crate::extract::pdf::load_layouts;
use crate::layout::PageLayout;
use crate::model::Finding;
use crate::output::UnplacedFinding;
use std::path::{Path, PathBuf};
use tracing::info;

/// Result of annotating one document.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationReport {
    pub output: PathBuf,
    /// Highlight/note pairs written.
    pub annotations: usize,
    pub unplaced: Vec<UnplacedFinding>,
}

/// `<dir>/<stem>_review.<ext>` next to `source`.
pub fn review_output_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "report".to_string());
    let name = match source.extension() {
        Some(ext) => format!("{stem}_review.{}", ext.to_string_lossy()),
        None => format!("{stem}_review.pdf"),
    };
    source.with_file_name(name)
}

/// Annotate `source` with `findings`, writing the copy to `output`.
pub async fn annotate(
    source: &Path,
    findings: &[Finding],
    output: &Path,
) -> Result<AnnotationReport, AnnotationError> {
    let source = source.to_path_buf();
    let output = output.to_path_buf();
    let findings = findings.to_vec();
    let task_output = output.clone();

    tokio::task::spawn_blocking(move || {
        let layouts = load_layouts(&source).map_err(|e| AnnotationError::Layout {
            path: source.clone(),
            detail: e.to_string(),
        })?;
        annotate_with_layouts(&source, &findings, &layouts, &output)
    })
    .await
    .map_err(|e| AnnotationError::Save {
        path: task_output,
        detail: format!("annotation task panicked: {e}"),
    })?
}

/// Annotate with already-read page layouts.
pub fn annotate_with_layouts(
    source: &Path,
    findings: &[Finding],
    layouts: &[PageLayout],
    output: &Path,
) -> Result<AnnotationReport, AnnotationError> {
    let plan = placement::plan(findings, layouts);
    let annotations = writer::write_annotations(source, output, &plan.placements)?;
    info!(
        "Annotated {} of {} findings ({} unplaced)",
        findings.len() - plan.unplaced.len(),
        findings.len(),
        plan.unplaced.len()
    );
    Ok(AnnotationReport {
        output: output.to_path_buf(),
        annotations,
        unplaced: plan.unplaced,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::tests::glyph_run;
    use crate::output::UnplacedReason;

    #[test]
    fn output_path_sits_next_to_source() {
        assert_eq!(
            review_output_path(Path::new("/reports/TAB Report.pdf")),
            PathBuf::from("/reports/TAB Report_review.pdf")
        );
        assert_eq!(
            review_output_path(Path::new("job.PDF")),
            PathBuf::from("job_review.PDF")
        );
    }

    #[test]
    fn annotates_with_given_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("r.pdf");
        writer::tests::blank_pdf(&src, 2);
        let out = review_output_path(&src);

        let layouts = vec![
            PageLayout::new(612.0, 792.0, glyph_run("AHU-1 Supply 1200 CFM", 72.0, 700.0)),
            PageLayout::new(612.0, 792.0, glyph_run("VAV-2 CFM too low", 72.0, 700.0)),
        ];
        let findings = vec![
            Finding::new(2, "CFM too low"),
            Finding::new(5, "phantom"),
            Finding::new(1, "not on the page"),
        ];

        let report = annotate_with_layouts(&src, &findings, &layouts, &out).unwrap();
        assert_eq!(report.annotations, 1);
        assert_eq!(report.output, out);
        assert!(out.exists());
        let reasons: Vec<_> = report.unplaced.iter().map(|u| u.reason).collect();
        assert_eq!(
            reasons,
            vec![UnplacedReason::PageOutOfRange, UnplacedReason::TextNotFound]
        );
    }
}
