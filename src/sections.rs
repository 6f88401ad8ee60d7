//! Heading-delimited section discovery and per-section capture

use crate::backend::{CaptureSettings, LivePage};
use crate::request::{ImageFormat, SectionRange, ViewportSpec};
use crate::viewport::{css_px, pause, Settle};
use crate::{Error, Result};
use log::debug;
use serde::Deserialize;

/// Extra viewport height below each section
pub const SECTION_PADDING: u32 = 100;

/// A matched heading and its offset from the top of the document
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HeadingMark {
    pub title: String,
    pub top: f64,
}

/// Result of a heading query against a live page
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadingScan {
    pub marks: Vec<HeadingMark>,
    pub document_height: f64,
}

/// Script returning a [`HeadingScan`] for `selector`
pub(crate) fn heading_scan_script(selector: &str) -> String {
    // A JSON string literal is also a valid JS string literal
    let literal = serde_json::to_string(selector).unwrap_or_else(|_| "\"h1\"".to_string());
    format!(
        r#"(function (selector) {{
  var marks = Array.prototype.map.call(document.querySelectorAll(selector), function (el) {{
    var rect = el.getBoundingClientRect();
    return {{ title: (el.textContent || '').trim(), top: rect.top + window.scrollY }};
  }});
  var d = document.documentElement, b = document.body || d;
  var height = Math.max(b.scrollHeight, d.scrollHeight, b.offsetHeight, d.offsetHeight, b.clientHeight, d.clientHeight);
  return {{ marks: marks, documentHeight: height }};
}})({})"#,
        literal
    )
}

/// Turn heading offsets into contiguous ranges over `[0, document_height)`
///
/// One range per mark. The first range starts at 0 so content above the
/// first heading stays with it; each range ends where the next begins and
/// the last ends at the document height. Offsets that do not strictly
/// increase are nudged forward so no range is empty.
///
/// # Examples
///
/// ```
/// use docshot::sections::{build_ranges, HeadingMark};
/// let marks = vec![
///     HeadingMark { title: "Intro".into(), top: 20.0 },
///     HeadingMark { title: "Usage".into(), top: 400.0 },
/// ];
/// let ranges = build_ranges(&marks, 900);
/// assert_eq!((ranges[0].start, ranges[0].end), (0, 400));
/// assert_eq!((ranges[1].start, ranges[1].end), (400, 900));
/// ```
pub fn build_ranges(marks: &[HeadingMark], document_height: u32) -> Vec<SectionRange> {
    let mut starts: Vec<u32> = Vec::with_capacity(marks.len());
    for (i, mark) in marks.iter().enumerate() {
        let start = match (i, starts.last()) {
            (0, _) => 0,
            (_, Some(&prev)) => css_px(mark.top.floor()).max(prev.saturating_add(1)),
            (_, None) => 0,
        };
        starts.push(start);
    }

    let total = match starts.last() {
        Some(&last) => document_height.max(last.saturating_add(1)),
        None => return Vec::new(),
    };

    marks
        .iter()
        .zip(starts.iter())
        .enumerate()
        .map(|(i, (mark, &start))| SectionRange {
            title: mark.title.clone(),
            start,
            end: starts.get(i + 1).copied().unwrap_or(total),
        })
        .collect()
}

/// Split ranges taller than `max_height` into consecutive slices
///
/// Slices keep the section title with a `(k/n)` suffix. A `max_height` of
/// zero disables tiling.
pub fn tile_ranges(ranges: Vec<SectionRange>, max_height: u32) -> Vec<SectionRange> {
    if max_height == 0 {
        return ranges;
    }
    let mut out = Vec::with_capacity(ranges.len());
    for range in ranges {
        let height = range.height();
        if height <= max_height {
            out.push(range);
            continue;
        }
        let parts = height.div_ceil(max_height);
        debug!("section '{}' ({}px) tiled into {} slices", range.title, height, parts);
        for k in 0..parts {
            let start = range.start + k * max_height;
            out.push(SectionRange {
                title: format!("{} ({}/{})", range.title, k + 1, parts),
                start,
                end: start.saturating_add(max_height).min(range.end),
            });
        }
    }
    out
}

/// Query the page for section ranges
///
/// An empty result means nothing matched `selector`; callers fall back to a
/// whole-document capture.
pub async fn partition(page: &mut dyn LivePage, selector: &str) -> Result<Vec<SectionRange>> {
    let scan = page
        .heading_marks(selector)
        .await
        .map_err(|e| Error::Partition(format!("'{}': {}", selector, e)))?;
    let ranges = build_ranges(&scan.marks, css_px(scan.document_height));
    debug!("selector '{}' matched {} sections", selector, ranges.len());
    Ok(ranges)
}

/// Viewport framing one section: the section height plus padding
pub fn section_viewport(range: &SectionRange, base: ViewportSpec) -> ViewportSpec {
    ViewportSpec {
        width: base.width,
        height: range.height().saturating_add(SECTION_PADDING),
        device_scale_factor: base.device_scale_factor,
    }
}

/// Frame one section in the viewport and capture only what is visible
///
/// Resizes to `settings.viewport`, scrolls to the section start and waits
/// `settle.scroll` before capturing. The page is left framed on the section
/// so further formats can be captured without re-framing.
pub async fn capture_section(
    page: &mut dyn LivePage,
    range: &SectionRange,
    format: ImageFormat,
    settings: &CaptureSettings,
    settle: &Settle,
) -> Result<Vec<u8>> {
    page.set_viewport(settings.viewport).await?;
    page.scroll_to(range.start).await?;
    pause(settle.scroll).await;
    page.capture(format, settings).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mark(title: &str, top: f64) -> HeadingMark {
        HeadingMark { title: title.into(), top }
    }

    fn assert_contiguous(ranges: &[SectionRange], height: u32) {
        assert_eq!(ranges.first().map(|r| r.start), Some(0));
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        for r in ranges {
            assert!(r.end > r.start);
        }
        assert_eq!(ranges.last().map(|r| r.end), Some(height));
    }

    #[test]
    fn one_range_per_heading() {
        let marks = vec![mark("A", 16.0), mark("B", 420.5), mark("C", 900.0)];
        let ranges = build_ranges(&marks, 1500);
        assert_eq!(ranges.len(), 3);
        assert_contiguous(&ranges, 1500);
        assert_eq!(ranges[1].start, 420);
        assert_eq!(ranges[2].title, "C");
    }

    #[test]
    fn no_marks_no_ranges() {
        assert!(build_ranges(&[], 1000).is_empty());
    }

    #[test]
    fn coincident_headings_stay_non_empty() {
        let marks = vec![mark("A", 0.0), mark("B", 300.0), mark("C", 300.0), mark("D", 100.0)];
        let ranges = build_ranges(&marks, 1000);
        assert_eq!(ranges.len(), 4);
        assert_contiguous(&ranges, 1000);
    }

    #[test]
    fn short_document_is_extended_to_last_heading() {
        let ranges = build_ranges(&[mark("A", 0.0), mark("B", 800.0)], 500);
        assert_contiguous(&ranges, 801);
    }

    #[test]
    fn offsets_at_the_pixel_limit_do_not_overflow() {
        let marks = vec![mark("A", 0.0), mark("B", f64::MAX), mark("C", 1e12)];
        let ranges = build_ranges(&marks, 1000);
        assert_eq!(ranges.len(), 3);
        assert_eq!((ranges[0].start, ranges[0].end), (0, u32::MAX));
        assert_eq!(ranges[2].end, u32::MAX);

        let tiled = tile_ranges(vec![ranges[0].clone()], u32::MAX / 2 + 1);
        assert_eq!(tiled.len(), 2);
        assert_eq!(tiled[1].end, u32::MAX);

        let vp = section_viewport(&ranges[0], ViewportSpec::default());
        assert_eq!(vp.height, u32::MAX);
    }

    #[test]
    fn tiling_respects_max_height() {
        let ranges = vec![
            SectionRange { title: "Big".into(), start: 0, end: 2500 },
            SectionRange { title: "Small".into(), start: 2500, end: 2600 },
        ];
        let tiled = tile_ranges(ranges, 1000);
        assert_eq!(tiled.len(), 4);
        assert_eq!(tiled[0].title, "Big (1/3)");
        assert_eq!((tiled[2].start, tiled[2].end), (2000, 2500));
        assert_eq!(tiled[3].title, "Small");
        assert_contiguous(&tiled, 2600);
        assert!(tiled.iter().all(|r| r.height() <= 1000));
    }

    #[test]
    fn zero_max_height_disables_tiling() {
        let ranges = vec![SectionRange { title: "A".into(), start: 0, end: 50000 }];
        assert_eq!(tile_ranges(ranges.clone(), 0), ranges);
    }

    #[test]
    fn section_viewport_adds_padding() {
        let base = ViewportSpec { width: 900, height: 10, device_scale_factor: 3.0 };
        let range = SectionRange { title: "A".into(), start: 200, end: 700 };
        let vp = section_viewport(&range, base);
        assert_eq!((vp.width, vp.height, vp.device_scale_factor), (900, 600, 3.0));
    }

    #[test]
    fn scan_script_quotes_selector() {
        let script = heading_scan_script("h1, h2[data-x=\"y\"]");
        assert!(script.contains(r#"("h1, h2[data-x=\"y\"]")"#));
        let scan: HeadingScan = serde_json::from_value(serde_json::json!({
            "marks": [{"title": "Intro", "top": 12.5}],
            "documentHeight": 640
        }))
        .unwrap();
        assert_eq!(scan.marks[0].title, "Intro");
        assert_eq!(scan.document_height, 640.0);
    }
}
