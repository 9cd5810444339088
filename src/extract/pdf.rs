//! PDF reading via pdfium: page text plus glyph geometry.
//!
//! Each page yields zero or more `table` items (detected from glyph
//! alignment, see [`crate::layout::PageLayout::tables`]) followed by exactly
//! one `text` item holding the page's full plain text. Pages are numbered
//! from 1 here and everywhere downstream.
//!
//! All functions in this module block; call them from `spawn_blocking`.

use crate::error::ReviewError;
use crate::layout::{Glyph, PageLayout, Rect};
use crate::model::ContentItem;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Bind to the pdfium shared library.
///
/// `PDFIUM_LIB_PATH` wins when set; otherwise the library is looked up next
/// to the working directory and then on the system library path.
pub fn bind_pdfium() -> Result<Pdfium, ReviewError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(lib) if !lib.is_empty() => Pdfium::bind_to_library(&lib),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| ReviewError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

/// Extract table and text items from every page.
pub fn extract_pdf(path: &Path) -> Result<Vec<ContentItem>, ReviewError> {
    let pdfium = bind_pdfium()?;
    let document = open(&pdfium, path)?;

    let mut items = Vec::new();
    for (index, page) in document.pages().iter().enumerate() {
        let page_num = index as u32 + 1;
        let (text, layout) = read_page(&page).map_err(|detail| ReviewError::Extraction {
            path: path.to_path_buf(),
            detail: format!("page {page_num}: {detail}"),
        })?;

        let tables = layout.tables();
        debug!(
            "Page {}: {} chars, {} tables",
            page_num,
            text.chars().count(),
            tables.len()
        );
        items.extend(tables.into_iter().map(|t| ContentItem::table(page_num, t)));
        items.push(ContentItem::text(page_num, text));
    }

    info!(
        "Extracted {} items from {} pages of {}",
        items.len(),
        document.pages().len(),
        path.display()
    );
    Ok(items)
}

/// Read the glyph layout of every page (0-indexed vector).
pub fn load_layouts(path: &Path) -> Result<Vec<PageLayout>, ReviewError> {
    let pdfium = bind_pdfium()?;
    let document = open(&pdfium, path)?;

    document
        .pages()
        .iter()
        .enumerate()
        .map(|(index, page)| {
            read_page(&page)
                .map(|(_, layout)| layout)
                .map_err(|detail| ReviewError::Extraction {
                    path: path.to_path_buf(),
                    detail: format!("page {}: {detail}", index + 1),
                })
        })
        .collect()
}

fn open<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, ReviewError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| ReviewError::Extraction {
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        })
}

fn read_page(page: &PdfPage) -> Result<(String, PageLayout), String> {
    let text = page.text().map_err(|e| format!("{e:?}"))?;
    let all = text.all();

    let glyphs: Vec<Glyph> = text
        .chars()
        .iter()
        .filter_map(|c| {
            let ch = c.unicode_char()?;
            let bounds = c
                .loose_bounds()
                .map(|b| Rect::new(b.left().value, b.bottom().value, b.right().value, b.top().value))
                .unwrap_or(Rect::new(0.0, 0.0, 0.0, 0.0));
            Some(Glyph::new(ch, bounds))
        })
        .collect();

    let layout = PageLayout::new(page.width().value, page.height().value, glyphs);
    Ok((all, layout))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a one-page PDF with two text lines using lopdf.
    fn write_sample_pdf(path: &Path) {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal("Supply CFM too low")]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    fn pdfium_available() -> bool {
        if std::env::var("PDFIUM_LIB_PATH").is_err() {
            println!("SKIP: set PDFIUM_LIB_PATH to run pdfium tests");
            return false;
        }
        true
    }

    #[test]
    fn extracts_text_item_per_page() {
        if !pdfium_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.pdf");
        write_sample_pdf(&path);

        let items = extract_pdf(&path).expect("extraction should succeed");
        let texts: Vec<&ContentItem> = items
            .iter()
            .filter(|i| i.kind == crate::model::ItemKind::Text)
            .collect();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].payload.as_str().unwrap().contains("CFM too low"));
    }

    #[test]
    fn layouts_locate_text() {
        if !pdfium_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.pdf");
        write_sample_pdf(&path);

        let layouts = load_layouts(&path).expect("layout should load");
        assert_eq!(layouts.len(), 1);
        let hits = layouts[0].search("cfm too low");
        assert_eq!(hits.len(), 1);
        assert!(hits[0][0].bottom > 690.0 && hits[0][0].bottom < 710.0);
    }
}
