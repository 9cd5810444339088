//! Extraction: turn a report file into an ordered list of [`ContentItem`]s.
//!
//! ```text
//! .pdf              ──▶ pdf::extract_pdf     per page: tables…, text
//! .xlsx/.xlsm/.xls  ──▶ sheet::extract_sheets per sheet: one row-group
//! anything else     ──▶ ReviewError::UnsupportedFormat
//! ```
//!
//! The format is decided from the extension alone, before the file is
//! touched. Both readers are blocking (pdfium is not async-safe, calamine
//! reads synchronously) and run under `spawn_blocking`.

pub mod pdf;
pub mod sheet;

use crate::error::ReviewError;
use crate::model::ContentItem;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Report formats the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Spreadsheet,
}

impl SourceKind {
    /// Classify a path by its (case-insensitive) extension.
    pub fn detect(path: &Path) -> Result<Self, ReviewError> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "pdf" => Ok(SourceKind::Pdf),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(SourceKind::Spreadsheet),
            _ => Err(ReviewError::UnsupportedFormat {
                extension: if extension.is_empty() {
                    "<none>".to_string()
                } else {
                    format!(".{extension}")
                },
            }),
        }
    }

    /// Whether findings can be drawn back onto the source.
    pub fn is_annotatable(&self) -> bool {
        matches!(self, SourceKind::Pdf)
    }
}

/// Extract all items from `path`, in document order.
pub async fn extract(path: &Path) -> Result<(SourceKind, Vec<ContentItem>), ReviewError> {
    let kind = SourceKind::detect(path)?;
    let path = check_readable(path)?;
    if kind == SourceKind::Pdf {
        check_pdf_magic(&path)?;
    }
    debug!("Extracting {:?} from {}", kind, path.display());

    let items = tokio::task::spawn_blocking(move || match kind {
        SourceKind::Pdf => pdf::extract_pdf(&path),
        SourceKind::Spreadsheet => sheet::extract_sheets(&path),
    })
    .await
    .map_err(|e| ReviewError::Internal(format!("Extraction task panicked: {e}")))??;

    info!("Extracted {} items", items.len());
    Ok((kind, items))
}

/// Validate existence and read permission.
fn check_readable(path: &Path) -> Result<PathBuf, ReviewError> {
    let path = path.to_path_buf();
    if !path.exists() {
        return Err(ReviewError::FileNotFound { path });
    }
    match std::fs::File::open(&path) {
        Ok(_) => Ok(path),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(ReviewError::PermissionDenied { path })
        }
        Err(e) => Err(ReviewError::Extraction {
            path,
            detail: e.to_string(),
        }),
    }
}

/// Reject files that are obviously not PDFs before handing them to pdfium.
fn check_pdf_magic(path: &Path) -> Result<(), ReviewError> {
    use std::io::Read;
    let mut f = std::fs::File::open(path).map_err(|e| ReviewError::Extraction {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let mut magic = [0u8; 4];
    match f.read_exact(&mut magic) {
        Ok(()) if &magic == b"%PDF" => Ok(()),
        Ok(()) => Err(ReviewError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        }),
        Err(_) => Err(ReviewError::Extraction {
            path: path.to_path_buf(),
            detail: "file is shorter than a PDF header".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_by_extension() {
        assert_eq!(SourceKind::detect(Path::new("a/b/Report.PDF")).unwrap(), SourceKind::Pdf);
        assert_eq!(
            SourceKind::detect(Path::new("balance.xlsx")).unwrap(),
            SourceKind::Spreadsheet
        );
        assert_eq!(SourceKind::detect(Path::new("old.xls")).unwrap(), SourceKind::Spreadsheet);
    }

    #[test]
    fn unsupported_extension_is_fatal() {
        match SourceKind::detect(Path::new("notes.docx")) {
            Err(ReviewError::UnsupportedFormat { extension }) => assert_eq!(extension, ".docx"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            SourceKind::detect(Path::new("README")),
            Err(ReviewError::UnsupportedFormat { .. })
        ));
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected_before_reading() {
        // The file does not exist; the format check must fire first.
        let err = extract(Path::new("/nonexistent/report.docx")).await.unwrap_err();
        assert_eq!(err.reason(), "unsupported format");
    }

    #[tokio::test]
    async fn missing_file_is_extraction_error() {
        let err = extract(Path::new("/nonexistent/report.pdf")).await.unwrap_err();
        assert!(matches!(err, ReviewError::FileNotFound { .. }));
        assert!(err.is_extraction());
    }

    #[tokio::test]
    async fn non_pdf_bytes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"PK\x03\x04 not a pdf").unwrap();
        let err = extract(&path).await.unwrap_err();
        assert!(matches!(err, ReviewError::NotAPdf { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn truncated_pdf_is_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.pdf");
        std::fs::write(&path, b"%P").unwrap();
        let err = extract(&path).await.unwrap_err();
        assert!(matches!(err, ReviewError::Extraction { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn corrupt_workbook_is_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"this is not a zip archive").unwrap();
        let err = extract(&path).await.unwrap_err();
        assert!(matches!(err, ReviewError::Extraction { .. }), "got {err:?}");
    }
}
