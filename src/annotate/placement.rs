//! Where each finding goes on the page.
//!
//! Pure planning over [`PageLayout`]s: no PDF is touched here. A finding
//! whose issue text appears `k` times on its page yields `k` placements; a
//! finding with no page or no match becomes an [`UnplacedFinding`].

use crate::layout::{PageLayout, Rect};
use crate::model::Finding;
use crate::output::{UnplacedFinding, UnplacedReason};
use tracing::{debug, warn};

/// Side of the square comment icon, in points.
pub const NOTE_SIZE: f32 = 18.0;

/// Gap between the matched text and the note above it.
const NOTE_GAP: f32 = 2.0;

/// One highlight + note pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// 1-indexed.
    pub page: u32,
    /// One rectangle per line the match spans, top line first.
    pub quads: Vec<Rect>,
    pub note: Rect,
    pub issue: String,
}

impl Placement {
    /// Bounding box of all quads.
    pub fn highlight_bounds(&self) -> Rect {
        self.quads
            .iter()
            .skip(1)
            .fold(self.quads.first().copied().unwrap_or(self.note), |acc, r| acc.union(r))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationPlan {
    pub placements: Vec<Placement>,
    pub unplaced: Vec<UnplacedFinding>,
}

/// Plan annotations for `findings` over `layouts` (index 0 is page 1).
pub fn plan(findings: &[Finding], layouts: &[PageLayout]) -> AnnotationPlan {
    let mut out = AnnotationPlan::default();

    for finding in findings {
        let layout = match (finding.page as usize)
            .checked_sub(1)
            .and_then(|i| layouts.get(i))
        {
            Some(l) => l,
            None => {
                warn!(
                    "Finding on page {} is outside the document ({} pages): {}",
                    finding.page,
                    layouts.len(),
                    finding.issue
                );
                out.unplaced.push(UnplacedFinding {
                    finding: finding.clone(),
                    reason: UnplacedReason::PageOutOfRange,
                });
                continue;
            }
        };

        let hits = layout.search(&finding.issue);
        if hits.is_empty() {
            warn!(
                "No match for finding text on page {}: {}",
                finding.page, finding.issue
            );
            out.unplaced.push(UnplacedFinding {
                finding: finding.clone(),
                reason: UnplacedReason::TextNotFound,
            });
            continue;
        }

        debug!("Page {}: {} matches for '{}'", finding.page, hits.len(), finding.issue);
        for quads in hits {
            let note = note_rect(&quads[0], layout.height);
            out.placements.push(Placement {
                page: finding.page,
                quads,
                note,
                issue: finding.issue.clone(),
            });
        }
    }
    out
}

/// Square icon just above the first matched line, kept on the page.
fn note_rect(anchor: &Rect, page_height: f32) -> Rect {
    let mut bottom = anchor.top + NOTE_GAP;
    if page_height > 0.0 && bottom + NOTE_SIZE > page_height {
        bottom = (page_height - NOTE_SIZE).max(0.0);
    }
    Rect::new(anchor.left, bottom, anchor.left + NOTE_SIZE, bottom + NOTE_SIZE)
}
