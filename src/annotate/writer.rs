//! Writing highlight and comment annotations with lopdf.
//!
//! Each [`Placement`] becomes two annotation objects on its page:
//!
//! * `/Highlight` with one quadrilateral per matched line, yellow
//! * `/Text` (sticky note, `Comment` icon), red, just above the match
//!
//! Both carry the finding as `Contents` and the fixed title [`NOTE_TITLE`].
//! The document is written to a temp file in the destination directory and
//! renamed into place, so a failed save never leaves a partial file.

use super::placement::Placement;
use crate::error::AnnotationError;
use crate::layout::Rect;
use lopdf::{dictionary, Document, Object, ObjectId, StringFormat};
use std::path::Path;
use tracing::{debug, info};

/// `/T` of every annotation we add.
pub const NOTE_TITLE: &str = "AI Finding";

const HIGHLIGHT_COLOR: [f32; 3] = [1.0, 1.0, 0.0];
const NOTE_COLOR: [f32; 3] = [1.0, 0.0, 0.0];

/// `/F 4`: print the annotation.
const FLAG_PRINT: i64 = 4;

/// Add every placement to a copy of `source` and save it to `output`.
///
/// Returns the number of highlight/note pairs written.
pub fn write_annotations(
    source: &Path,
    output: &Path,
    placements: &[Placement],
) -> Result<usize, AnnotationError> {
    let mut doc = Document::load(source).map_err(|e| AnnotationError::Open {
        path: source.to_path_buf(),
        detail: e.to_string(),
    })?;
    let pages = doc.get_pages();

    let mut written = 0usize;
    for placement in placements {
        // Planning already bounds-checked against the same file.
        let Some(&page_id) = pages.get(&placement.page) else {
            continue;
        };
        let highlight = doc.add_object(highlight_annotation(page_id, placement));
        let note = doc.add_object(note_annotation(page_id, placement));
        add_annotation_to_page(&mut doc, page_id, highlight).map_err(|detail| {
            AnnotationError::Save {
                path: output.to_path_buf(),
                detail,
            }
        })?;
        add_annotation_to_page(&mut doc, page_id, note).map_err(|detail| AnnotationError::Save {
            path: output.to_path_buf(),
            detail,
        })?;
        written += 1;
    }
    debug!("Added {} annotation pairs", written);

    save_atomic(&mut doc, output)?;
    info!("Saved annotated PDF to {}", output.display());
    Ok(written)
}

fn highlight_annotation(page_id: ObjectId, p: &Placement) -> Object {
    let bounds = p.highlight_bounds();
    let mut quad_points = Vec::with_capacity(p.quads.len() * 8);
    for q in &p.quads {
        // Upper-left, upper-right, lower-left, lower-right.
        quad_points.extend(
            [q.left, q.top, q.right, q.top, q.left, q.bottom, q.right, q.bottom]
                .into_iter()
                .map(Object::Real),
        );
    }

    Object::Dictionary(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Highlight",
        "Rect" => rect_array(&bounds),
        "QuadPoints" => quad_points,
        "C" => color(HIGHLIGHT_COLOR),
        "CA" => Object::Real(1.0),
        "T" => text_string(NOTE_TITLE),
        "Contents" => text_string(&format!("Issue Found: {}", p.issue)),
        "F" => FLAG_PRINT,
        "P" => page_id,
    })
}

fn note_annotation(page_id: ObjectId, p: &Placement) -> Object {
    Object::Dictionary(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Text",
        "Name" => "Comment",
        "Rect" => rect_array(&p.note),
        "C" => color(NOTE_COLOR),
        "T" => text_string(NOTE_TITLE),
        "Contents" => text_string(&format!("Issue Found: {}", p.issue)),
        "Open" => false,
        "F" => FLAG_PRINT,
        "P" => page_id,
    })
}

fn rect_array(r: &Rect) -> Object {
    Object::Array(vec![
        Object::Real(r.left),
        Object::Real(r.bottom),
        Object::Real(r.right),
        Object::Real(r.top),
    ])
}

fn color(rgb: [f32; 3]) -> Object {
    Object::Array(rgb.into_iter().map(Object::Real).collect())
}

/// PDF text string: PDFDocEncoding-compatible ASCII as is, anything else as
/// UTF-16BE with a byte-order mark.
fn text_string(s: &str) -> Object {
    if s.is_ascii() {
        Object::String(s.as_bytes().to_vec(), StringFormat::Literal)
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in s.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

fn add_annotation_to_page(
    doc: &mut Document,
    page_id: ObjectId,
    annot_id: ObjectId,
) -> Result<(), String> {
    // `/Annots` may be an indirect reference to an array.
    let annots_ref = doc
        .get_dictionary(page_id)
        .map_err(|e| e.to_string())?
        .get(b"Annots")
        .ok()
        .and_then(|o| o.as_reference().ok());

    if let Some(array_id) = annots_ref {
        if let Ok(Object::Array(arr)) = doc.get_object_mut(array_id) {
            arr.push(Object::Reference(annot_id));
            return Ok(());
        }
    }

    let page = doc
        .get_object_mut(page_id)
        .map_err(|e| e.to_string())?
        .as_dict_mut()
        .map_err(|e| e.to_string())?;
    match page.get_mut(b"Annots") {
        Ok(Object::Array(arr)) => arr.push(Object::Reference(annot_id)),
        _ => page.set("Annots", Object::Array(vec![Object::Reference(annot_id)])),
    }
    Ok(())
}

fn save_atomic(doc: &mut Document, output: &Path) -> Result<(), AnnotationError> {
    let save_err = |detail: String| AnnotationError::Save {
        path: output.to_path_buf(),
        detail,
    };
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| save_err(e.to_string()))?;
    doc.save_to(&mut tmp).map_err(|e| save_err(e.to_string()))?;
    tmp.persist(output).map_err(|e| save_err(e.error.to_string()))?;
    Ok(())
}
