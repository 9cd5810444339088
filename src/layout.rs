//! Page geometry: positioned glyphs, line grouping, table detection and text
//! search with bounding boxes.
//!
//! Everything here is pure and works in PDF user space (origin bottom-left,
//! y grows upwards, units are points). The pdfium reader in
//! [`crate::extract::pdf`] fills a [`PageLayout`] per page; the table detector
//! and the annotator's text search both consume it.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl Rect {
    pub fn new(left: f32, bottom: f32, right: f32, top: f32) -> Self {
        Self {
            left: left.min(right),
            bottom: bottom.min(top),
            right: right.max(left),
            top: top.max(bottom),
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }

    pub fn center_y(&self) -> f32 {
        (self.top + self.bottom) / 2.0
    }

    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            left: self.left.min(other.left),
            bottom: self.bottom.min(other.bottom),
            right: self.right.max(other.right),
            top: self.top.max(other.top),
        }
    }

    /// Vertical overlap as a share of the smaller height.
    fn vertical_overlap(&self, other: &Rect) -> f32 {
        let overlap = self.top.min(other.top) - self.bottom.max(other.bottom);
        let smaller = self.height().min(other.height());
        if smaller <= 0.0 {
            0.0
        } else {
            (overlap / smaller).max(0.0)
        }
    }
}

/// One character with its bounding box, in content-stream order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Glyph {
    pub ch: char,
    pub bounds: Rect,
}

impl Glyph {
    pub fn new(ch: char, bounds: Rect) -> Self {
        Self { ch, bounds }
    }

    fn is_visible(&self) -> bool {
        !self.ch.is_whitespace() && !self.bounds.is_degenerate()
    }
}

/// Geometry of one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    pub width: f32,
    pub height: f32,
    pub glyphs: Vec<Glyph>,
}

/// Minimum consecutive rows for a run of aligned lines to count as a table.
const MIN_TABLE_ROWS: usize = 2;

/// Minimum cells per row for a line to be a table row.
const MIN_TABLE_COLUMNS: usize = 2;

/// A horizontal gap wider than this many glyph heights separates cells.
const CELL_GAP_EMS: f32 = 1.2;

/// Two glyphs belong to the same line when they overlap vertically by at
/// least this share of the smaller glyph.
const SAME_LINE_OVERLAP: f32 = 0.5;

impl PageLayout {
    pub fn new(width: f32, height: f32, glyphs: Vec<Glyph>) -> Self {
        Self {
            width,
            height,
            glyphs,
        }
    }

    /// Visible glyphs grouped into lines, top to bottom, each sorted left to right.
    pub fn lines(&self) -> Vec<Vec<Glyph>> {
        let mut visible: Vec<Glyph> = self.glyphs.iter().copied().filter(Glyph::is_visible).collect();
        visible.sort_by(|a, b| {
            b.bounds
                .center_y()
                .total_cmp(&a.bounds.center_y())
                .then(a.bounds.left.total_cmp(&b.bounds.left))
        });

        let mut lines: Vec<(Rect, Vec<Glyph>)> = Vec::new();
        for glyph in visible {
            match lines
                .iter_mut()
                .rev()
                .find(|(band, _)| band.vertical_overlap(&glyph.bounds) >= SAME_LINE_OVERLAP)
            {
                Some((band, members)) => {
                    *band = band.union(&glyph.bounds);
                    members.push(glyph);
                }
                None => lines.push((glyph.bounds, vec![glyph])),
            }
        }

        lines.sort_by(|a, b| b.0.center_y().total_cmp(&a.0.center_y()));
        lines
            .into_iter()
            .map(|(_, mut members)| {
                members.sort_by(|a, b| a.bounds.left.total_cmp(&b.bounds.left));
                members
            })
            .collect()
    }

    /// Detect tables as runs of consecutive lines that split into the same
    /// number of cells (at least two cells, at least two rows).
    pub fn tables(&self) -> Vec<Vec<Vec<String>>> {
        let rows: Vec<Vec<String>> = self.lines().iter().map(|l| split_cells(l)).collect();

        let mut tables = Vec::new();
        let mut run: Vec<Vec<String>> = Vec::new();
        for row in rows {
            let continues = row.len() >= MIN_TABLE_COLUMNS
                && run.first().map_or(true, |first| first.len() == row.len());
            if continues {
                run.push(row);
                continue;
            }
            flush_table(&mut run, &mut tables);
            if row.len() >= MIN_TABLE_COLUMNS {
                run.push(row);
            }
        }
        flush_table(&mut run, &mut tables);
        tables
    }

    /// Find every non-overlapping occurrence of `needle` on the page.
    ///
    /// Matching ignores case and treats any whitespace run (including line
    /// breaks) as a single space. Each match yields one rectangle per line it
    /// spans, top line first.
    pub fn search(&self, needle: &str) -> Vec<Vec<Rect>> {
        let pattern: Vec<char> = normalise(needle.chars().map(|c| (c, None))).into_iter().map(|(c, _)| c).collect();
        let pattern = trim_spaces(&pattern);
        if pattern.is_empty() {
            return Vec::new();
        }

        let haystack = normalise(self.glyphs.iter().enumerate().map(|(i, g)| (g.ch, Some(i))));
        let chars: Vec<char> = haystack.iter().map(|(c, _)| *c).collect();

        let mut matches = Vec::new();
        let mut start = 0;
        while start + pattern.len() <= chars.len() {
            if chars[start..start + pattern.len()] == *pattern {
                let glyphs: Vec<usize> = haystack[start..start + pattern.len()]
                    .iter()
                    .filter_map(|(_, idx)| *idx)
                    .collect();
                let rects = self.line_rects(&glyphs);
                if !rects.is_empty() {
                    matches.push(rects);
                }
                start += pattern.len();
            } else {
                start += 1;
            }
        }
        matches
    }

    /// Merge the boxes of the given glyphs into one rectangle per line.
    fn line_rects(&self, glyph_indices: &[usize]) -> Vec<Rect> {
        let mut rects: Vec<Rect> = Vec::new();
        for &i in glyph_indices {
            let Some(glyph) = self.glyphs.get(i) else {
                continue;
            };
            if !glyph.is_visible() {
                continue;
            }
            match rects.last_mut() {
                Some(last) if last.vertical_overlap(&glyph.bounds) >= SAME_LINE_OVERLAP => {
                    *last = last.union(&glyph.bounds);
                }
                _ => rects.push(glyph.bounds),
            }
        }
        rects
    }
}

fn flush_table(run: &mut Vec<Vec<String>>, tables: &mut Vec<Vec<Vec<String>>>) {
    if run.len() >= MIN_TABLE_ROWS {
        tables.push(std::mem::take(run));
    } else {
        run.clear();
    }
}

/// Split a sorted line into cell strings on wide horizontal gaps.
fn split_cells(line: &[Glyph]) -> Vec<String> {
    let Some(first) = line.first() else {
        return Vec::new();
    };
    let em = median_height(line).max(1.0);
    let word_gap = em * 0.15;

    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut prev = first.bounds;
    cell.push(first.ch);

    for glyph in &line[1..] {
        let gap = glyph.bounds.left - prev.right;
        if gap > em * CELL_GAP_EMS {
            cells.push(std::mem::take(&mut cell));
        } else if gap > word_gap {
            cell.push(' ');
        }
        cell.push(glyph.ch);
        prev = glyph.bounds;
    }
    cells.push(cell);
    cells
}

fn median_height(line: &[Glyph]) -> f32 {
    let mut heights: Vec<f32> = line.iter().map(|g| g.bounds.height()).collect();
    heights.sort_by(f32::total_cmp);
    heights.get(heights.len() / 2).copied().unwrap_or(0.0)
}

/// Lowercase and collapse whitespace, keeping the glyph index of every
/// produced character (collapsed spaces carry `None`).
fn normalise<I>(chars: I) -> Vec<(char, Option<usize>)>
where
    I: IntoIterator<Item = (char, Option<usize>)>,
{
    let mut out: Vec<(char, Option<usize>)> = Vec::new();
    for (ch, idx) in chars {
        if ch.is_whitespace() || ch == '\u{0}' {
            if out.last().is_some_and(|(c, _)| *c != ' ') {
                out.push((' ', None));
            }
            continue;
        }
        for lower in ch.to_lowercase() {
            out.push((lower, idx));
        }
    }
    out
}

fn trim_spaces(chars: &[char]) -> &[char] {
    let start = chars.iter().position(|c| *c != ' ').unwrap_or(chars.len());
    let end = chars.iter().rposition(|c| *c != ' ').map_or(start, |e| e + 1);
    &chars[start..end]
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Lay out `text` starting at (x, y) with fixed-width 6pt × 10pt glyphs.
    pub(crate) fn glyph_run(text: &str, x: f32, y: f32) -> Vec<Glyph> {
        text.chars()
            .enumerate()
            .map(|(i, ch)| {
                let left = x + i as f32 * 6.0;
                Glyph::new(ch, Rect::new(left, y, left + 6.0, y + 10.0))
            })
            .collect()
    }

    fn page(lines: &[(&str, f32, f32)]) -> PageLayout {
        let mut glyphs = Vec::new();
        for (i, (text, x, y)) in lines.iter().enumerate() {
            if i > 0 {
                glyphs.push(Glyph::new('\n', Rect::new(0.0, 0.0, 0.0, 0.0)));
            }
            glyphs.extend(glyph_run(text, *x, *y));
        }
        PageLayout::new(612.0, 792.0, glyphs)
    }

    #[test]
    fn rect_normalises_corners() {
        let r = Rect::new(10.0, 20.0, 5.0, 8.0);
        assert_eq!(r, Rect::new(5.0, 8.0, 10.0, 20.0));
        assert_eq!(r.width(), 5.0);
        assert_eq!(r.height(), 12.0);
    }

    #[test]
    fn search_finds_every_occurrence() {
        let layout = page(&[
            ("AHU-1 CFM too low", 72.0, 700.0),
            ("Fan speed ok", 72.0, 680.0),
            ("RTU-2 cfm TOO low", 72.0, 660.0),
        ]);
        let hits = layout.search("CFM too low");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].len(), 1);
        let first = hits[0][0];
        assert_eq!(first.left, 72.0 + 6.0 * 6.0);
        assert_eq!(first.bottom, 700.0);
        assert_eq!(hits[1][0].bottom, 660.0);
    }

    #[test]
    fn search_spanning_lines_gives_one_rect_per_line() {
        let layout = page(&[("Supply air", 72.0, 700.0), ("below design", 72.0, 686.0)]);
        let hits = layout.search("air below");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].len(), 2);
        assert!(hits[0][0].bottom > hits[0][1].bottom);
    }

    #[test]
    fn search_without_match_or_with_blank_needle() {
        let layout = page(&[("Nothing to see", 72.0, 700.0)]);
        assert!(layout.search("CFM").is_empty());
        assert!(layout.search("   ").is_empty());
    }

    #[test]
    fn search_is_non_overlapping() {
        let layout = page(&[("aaaa", 0.0, 100.0)]);
        assert_eq!(layout.search("aa").len(), 2);
    }

    #[test]
    fn lines_group_by_baseline() {
        let layout = page(&[("second", 72.0, 600.0), ("first", 72.0, 700.0)]);
        let lines = layout.lines();
        assert_eq!(lines.len(), 2);
        let top: String = lines[0].iter().map(|g| g.ch).collect();
        assert_eq!(top, "first");
    }

    #[test]
    fn detects_aligned_rows_as_table() {
        let mut glyphs = Vec::new();
        for (row, y) in [("Tag", 700.0), ("AHU-1", 685.0), ("AHU-2", 670.0)] {
            glyphs.extend(glyph_run(row, 72.0, y));
            let design = if row == "Tag" { "Design" } else { "1200" };
            let actual = if row == "Tag" { "Actual" } else { "1105" };
            glyphs.extend(glyph_run(design, 200.0, y));
            glyphs.extend(glyph_run(actual, 320.0, y));
        }
        glyphs.extend(glyph_run("Notes: all readings at high speed", 72.0, 600.0));
        let layout = PageLayout::new(612.0, 792.0, glyphs);

        let tables = layout.tables();
        assert_eq!(tables.len(), 1);
        assert_eq!(
            tables[0],
            vec![
                vec!["Tag", "Design", "Actual"],
                vec!["AHU-1", "1200", "1105"],
                vec!["AHU-2", "1200", "1105"],
            ]
        );
    }

    #[test]
    fn single_aligned_row_is_not_a_table() {
        let mut glyphs = glyph_run("Tag", 72.0, 700.0);
        glyphs.extend(glyph_run("Value", 300.0, 700.0));
        assert!(PageLayout::new(612.0, 792.0, glyphs).tables().is_empty());
    }

    #[test]
    fn prose_is_not_a_table() {
        let layout = page(&[
            ("The supply fan was running", 72.0, 700.0),
            ("at design speed during test", 72.0, 686.0),
        ]);
        assert!(layout.tables().is_empty());
    }
}
