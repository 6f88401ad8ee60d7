//! Request configuration and the values derived from it during a render

use crate::probe::BackendKind;
use crate::{Error, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default capture width when the caller does not fix one
pub const DEFAULT_WIDTH: u32 = 1200;
/// Default capture height when the caller does not fix one
pub const DEFAULT_HEIGHT: u32 = 800;
/// Default device pixel ratio
pub const DEFAULT_SCALE: f64 = 2.0;

/// Output type of a rendered artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
    Webp,
    Pdf,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 4] = [
        ImageFormat::Png,
        ImageFormat::Jpeg,
        ImageFormat::Webp,
        ImageFormat::Pdf,
    ];

    /// File extension (without the dot)
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Webp => "webp",
            ImageFormat::Pdf => "pdf",
        }
    }

    /// Whether the encoder honours a quality setting
    pub fn is_lossy(self) -> bool {
        matches!(self, ImageFormat::Jpeg | ImageFormat::Webp)
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ImageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            "webp" => Ok(ImageFormat::Webp),
            "pdf" => Ok(ImageFormat::Pdf),
            other => Err(Error::ConfigError(format!(
                "unknown output format '{}' (expected png, jpeg, webp or pdf)",
                other
            ))),
        }
    }
}

/// Everything one conversion call needs
///
/// Built once per call and never mutated while the pipeline runs. Loading from
/// JSON accepts partial documents; absent keys take the defaults below.
///
/// # Examples
///
/// ```
/// let req = docshot::RenderRequest::default();
/// assert_eq!(req.primary_format, docshot::ImageFormat::Png);
/// assert_eq!(req.section_selector, "h1, h2, h3");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderRequest {
    /// Finished HTML to render
    pub source_document: String,
    /// Directory receiving the artifacts
    pub output_directory: PathBuf,
    pub primary_format: ImageFormat,
    /// Additional output types, captured after the primary one
    pub extra_formats: Vec<ImageFormat>,
    /// Encoder quality, 0-100
    pub quality: u8,
    /// Device pixel ratio
    pub scale: f64,
    pub fixed_width: Option<u32>,
    pub fixed_height: Option<u32>,
    /// Size the viewport from the measured content
    pub auto_size: bool,
    pub transparent_background: bool,
    /// Capture one image per heading-delimited section
    pub split_into_sections: bool,
    pub section_selector: String,
    /// Tallest section slice captured as a single image, in CSS pixels
    pub max_height: u32,
    /// Settle delay after the page reports it has loaded
    pub wait_millis: u64,
    /// Bound on every individual backend round-trip
    pub timeout_millis: u64,
    pub file_name_prefix: Option<String>,
    pub template_id: String,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self {
            source_document: String::new(),
            output_directory: PathBuf::from("images"),
            primary_format: ImageFormat::Png,
            extra_formats: Vec::new(),
            quality: 90,
            scale: DEFAULT_SCALE,
            fixed_width: None,
            fixed_height: None,
            auto_size: true,
            transparent_background: false,
            split_into_sections: false,
            section_selector: "h1, h2, h3".to_string(),
            max_height: 15000,
            wait_millis: 2000,
            timeout_millis: 60000,
            file_name_prefix: None,
            template_id: "default".to_string(),
        }
    }
}

impl RenderRequest {
    /// Create a request for `html` with default settings
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            source_document: html.into(),
            ..Default::default()
        }
    }

    /// Parse a (possibly partial) JSON request
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::ConfigError(format!("invalid request JSON: {}", e)))
    }

    /// Load a (possibly partial) JSON request from disk
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    /// Content-measured sizing applies unless both dimensions are fixed
    pub fn uses_auto_size(&self) -> bool {
        self.auto_size && (self.fixed_width.is_none() || self.fixed_height.is_none())
    }

    /// A copy with out-of-range values replaced by usable ones
    ///
    /// Never fails: bad values are logged and defaulted so a request always
    /// reaches a backend.
    pub fn normalized(&self) -> Self {
        let mut req = self.clone();

        if req.quality > 100 {
            warn!("quality {} clamped to 100", req.quality);
            req.quality = 100;
        }
        if !req.scale.is_finite() || req.scale <= 0.0 {
            warn!("scale {} is not a positive number; using {}", req.scale, DEFAULT_SCALE);
            req.scale = DEFAULT_SCALE;
        }
        if req.fixed_width == Some(0) {
            warn!("ignoring zero fixed width");
            req.fixed_width = None;
        }
        if req.fixed_height == Some(0) {
            warn!("ignoring zero fixed height");
            req.fixed_height = None;
        }
        if req.timeout_millis == 0 {
            warn!("timeout of 0ms replaced with the 60000ms default");
            req.timeout_millis = 60000;
        }
        if req.section_selector.trim().is_empty() {
            req.section_selector = "h1, h2, h3".to_string();
        }
        if req.template_id.trim().is_empty() {
            req.template_id = "default".to_string();
        }

        let primary = req.primary_format;
        let mut extras: Vec<ImageFormat> = Vec::with_capacity(req.extra_formats.len());
        for format in req.extra_formats.iter().copied() {
            if format != primary && !extras.contains(&format) {
                extras.push(format);
            }
        }
        req.extra_formats = extras;
        req
    }
}

/// Concrete capture dimensions handed to a backend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportSpec {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
}

impl Default for ViewportSpec {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            device_scale_factor: DEFAULT_SCALE,
        }
    }
}

/// A vertical slice of the rendered document, `[start, end)` in CSS pixels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRange {
    pub title: String,
    pub start: u32,
    pub end: u32,
}

impl SectionRange {
    pub fn height(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }
}

/// What kind of file an artifact is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArtifactKind {
    Rendered(ImageFormat),
    /// Static HTML with print controls, written when no backend could render
    Preview,
}

/// One produced output file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    /// Absolute path of the written file
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub section_index: Option<usize>,
    pub range: Option<SectionRange>,
    /// Backend that produced the file
    pub backend: BackendKind,
}

impl Artifact {
    pub fn format(&self) -> Option<ImageFormat> {
        match self.kind {
            ArtifactKind::Rendered(format) => Some(format),
            ArtifactKind::Preview => None,
        }
    }

    pub fn is_preview(&self) -> bool {
        self.kind == ArtifactKind::Preview
    }
}
