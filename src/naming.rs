//! Artifact file naming
//!
//! `{prefix}_{template}_{sectionN_}{stamp}.{ext}`, where the stamp is a
//! millisecond epoch time taken once per capture batch so sibling formats
//! of one capture differ only in extension.

use crate::request::{ImageFormat, RenderRequest};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST_STAMP: AtomicU64 = AtomicU64::new(0);

/// Milliseconds since the epoch, strictly increasing within this process
///
/// Two calls in the same millisecond get consecutive values, so concurrent
/// conversions in one process never share a stamp.
pub fn next_stamp() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let mut prev = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(prev + 1);
        match LAST_STAMP.compare_exchange_weak(prev, candidate, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return candidate,
            Err(actual) => prev = actual,
        }
    }
}

/// `{fileNamePrefix}_{templateId}` or just `templateId`
///
/// Path separators are replaced so a prefix can never escape the output
/// directory; everything else (including CJK text) is kept as given.
pub fn effective_prefix(file_name_prefix: Option<&str>, template_id: &str) -> String {
    let raw = match file_name_prefix.map(str::trim).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{}_{}", prefix, template_id),
        None => template_id.to_string(),
    };
    raw.replace(['/', '\\'], "_")
}

/// `section{index+1}_`, or empty outside section mode
pub fn section_label(section: Option<usize>) -> String {
    section
        .map(|i| format!("section{}_", i + 1))
        .unwrap_or_default()
}

/// Build an artifact file name
///
/// # Examples
///
/// ```
/// use docshot::naming::artifact_file_name;
/// assert_eq!(artifact_file_name(Some("notes"), "wechat", Some(0), 42, "png"), "notes_wechat_section1_42.png");
/// assert_eq!(artifact_file_name(None, "default", None, 42, "pdf"), "default_42.pdf");
/// ```
pub fn artifact_file_name(
    file_name_prefix: Option<&str>,
    template_id: &str,
    section: Option<usize>,
    stamp: u64,
    extension: &str,
) -> String {
    format!(
        "{}_{}{}.{}",
        effective_prefix(file_name_prefix, template_id),
        section_label(section),
        stamp,
        extension
    )
}

/// Names artifacts for one request inside one output directory
#[derive(Debug, Clone)]
pub struct ArtifactNamer {
    dir: PathBuf,
    prefix: String,
}

impl ArtifactNamer {
    pub fn new(dir: impl Into<PathBuf>, request: &RenderRequest) -> Self {
        Self {
            dir: dir.into(),
            prefix: effective_prefix(request.file_name_prefix.as_deref(), &request.template_id),
        }
    }

    /// Start a capture batch; all formats of the batch share its stamp
    pub fn batch(&self, section: Option<usize>) -> NameBatch<'_> {
        NameBatch {
            namer: self,
            section,
            stamp: next_stamp(),
        }
    }

    /// `{prefix}_preview_{stamp}.html`
    pub fn preview_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}_preview_{}.html", self.prefix, next_stamp()))
    }
}

/// One stamp, any number of formats
#[derive(Debug, Clone, Copy)]
pub struct NameBatch<'a> {
    namer: &'a ArtifactNamer,
    section: Option<usize>,
    stamp: u64,
}

impl NameBatch<'_> {
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    pub fn section(&self) -> Option<usize> {
        self.section
    }

    pub fn file_name(&self, format: ImageFormat) -> String {
        format!(
            "{}_{}{}.{}",
            self.namer.prefix,
            section_label(self.section),
            self.stamp,
            format.extension()
        )
    }

    pub fn path(&self, format: ImageFormat) -> PathBuf {
        self.namer.dir.join(self.file_name(format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn prefix_composition() {
        assert_eq!(effective_prefix(Some("周报"), "xiaohongshu"), "周报_xiaohongshu");
        assert_eq!(effective_prefix(None, "default"), "default");
        assert_eq!(effective_prefix(Some("  "), "default"), "default");
        assert_eq!(effective_prefix(Some("a/b"), "t"), "a_b_t");
    }

    #[test]
    fn stamps_strictly_increase() {
        let mut last = next_stamp();
        for _ in 0..1000 {
            let s = next_stamp();
            assert!(s > last);
            last = s;
        }
    }

    #[test]
    fn batch_formats_share_stamp() {
        let req = RenderRequest {
            file_name_prefix: Some("notes".into()),
            template_id: "wechat".into(),
            ..Default::default()
        };
        let namer = ArtifactNamer::new("/out", &req);
        let batch = namer.batch(Some(1));
        let png = batch.file_name(ImageFormat::Png);
        let jpeg = batch.file_name(ImageFormat::Jpeg);
        assert_eq!(png.trim_end_matches(".png"), jpeg.trim_end_matches(".jpeg"));
        assert_eq!(png, format!("notes_wechat_section2_{}.png", batch.stamp()));
        assert_eq!(batch.path(ImageFormat::Pdf).parent(), Some(Path::new("/out")));
    }

    #[test]
    fn separate_batches_never_collide() {
        let namer = ArtifactNamer::new("/out", &RenderRequest::default());
        let a = namer.batch(None).file_name(ImageFormat::Png);
        let b = namer.batch(None).file_name(ImageFormat::Png);
        assert_ne!(a, b);
    }

    #[test]
    fn preview_name_shape() {
        let namer = ArtifactNamer::new("/out", &RenderRequest::default());
        let name = namer.preview_path();
        let name = name.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("default_preview_"));
        assert!(name.ends_with(".html"));
    }
}
