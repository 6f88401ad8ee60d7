//! docshot – command-line HTML → image/PDF converter.
//!
//! Usage:
//!   docshot <input.html> [--format png] [--extra-formats jpeg,pdf] [--split-sections] ...
//!
//! Output goes to `<input dir>/images` unless `--output` is given. Each
//! produced path is printed on its own line.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use docshot::{ImageFormat, RenderRequest, Renderer};

#[derive(Debug, Parser)]
#[command(name = "docshot", version, about = "Render an HTML document to images or PDF")]
struct Cli {
    /// HTML file to convert
    input: PathBuf,

    /// JSON file with base request settings; flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory (default: `images` next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Primary format: png, jpeg, webp or pdf
    #[arg(short, long)]
    format: Option<ImageFormat>,

    /// Additional formats captured from the same render
    #[arg(long, value_delimiter = ',')]
    extra_formats: Vec<ImageFormat>,

    /// Encoder quality for lossy formats (0-100)
    #[arg(short, long)]
    quality: Option<u8>,

    /// Device scale factor
    #[arg(long)]
    scale: Option<f64>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Keep the fixed viewport instead of measuring the content
    #[arg(long)]
    no_auto_size: bool,

    #[arg(long)]
    transparent: bool,

    /// One image per heading-delimited section
    #[arg(long)]
    split_sections: bool,

    /// Selector for section headings
    #[arg(long)]
    section_selector: Option<String>,

    /// Maximum image height in CSS pixels; taller sections are tiled
    #[arg(long)]
    max_height: Option<u32>,

    /// Milliseconds to wait for scripts (diagrams) before capturing
    #[arg(long)]
    wait: Option<u64>,

    /// Per-operation timeout in milliseconds
    #[arg(long)]
    timeout: Option<u64>,

    /// File name prefix (default: input file stem)
    #[arg(long)]
    prefix: Option<String>,

    /// Template id placed after the prefix in file names
    #[arg(long)]
    template: Option<String>,
}

impl Cli {
    fn into_request(self, html: String) -> Result<RenderRequest> {
        let mut request = match &self.config {
            Some(path) => RenderRequest::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => RenderRequest::default(),
        };
        request.source_document = html;

        if let Some(dir) = self.output {
            request.output_directory = dir;
        } else if self.config.is_none() {
            request.output_directory = default_output_dir(&self.input);
        }
        if let Some(format) = self.format {
            request.primary_format = format;
        }
        if !self.extra_formats.is_empty() {
            request.extra_formats = self.extra_formats;
        }
        if let Some(quality) = self.quality {
            request.quality = quality;
        }
        if let Some(scale) = self.scale {
            request.scale = scale;
        }
        if self.width.is_some() {
            request.fixed_width = self.width;
        }
        if self.height.is_some() {
            request.fixed_height = self.height;
        }
        if self.no_auto_size {
            request.auto_size = false;
        }
        if self.transparent {
            request.transparent_background = true;
        }
        if self.split_sections {
            request.split_into_sections = true;
        }
        if let Some(selector) = self.section_selector {
            request.section_selector = selector;
        }
        if let Some(max_height) = self.max_height {
            request.max_height = max_height;
        }
        if let Some(wait) = self.wait {
            request.wait_millis = wait;
        }
        if let Some(timeout) = self.timeout {
            request.timeout_millis = timeout;
        }
        if let Some(template) = self.template {
            request.template_id = template;
        }
        let prefix = self
            .prefix
            .or_else(|| request.file_name_prefix.take())
            .or_else(|| input_stem(&self.input));
        request.file_name_prefix = prefix;
        Ok(request)
    }
}

fn default_output_dir(input: &Path) -> PathBuf {
    input
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join("images")
}

fn input_stem(input: &Path) -> Option<String> {
    input
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
}

async fn run(cli: Cli) -> Result<()> {
    let html = tokio::fs::read_to_string(&cli.input)
        .await
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let request = cli.into_request(html)?;

    let artifacts = Renderer::new()
        .render(&request)
        .await
        .context("rendering failed")?;

    for artifact in &artifacts {
        if artifact.is_preview() {
            log::warn!("No renderer available; open the preview in a browser to print it");
        }
        println!("{}", artifact.path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_fill_the_request() {
        let cli = Cli::parse_from([
            "docshot",
            "notes/weekly.html",
            "--format",
            "jpg",
            "--extra-formats",
            "png,pdf",
            "--split-sections",
            "--width",
            "900",
        ]);
        let req = cli.into_request("<p>x</p>".into()).unwrap();
        assert_eq!(req.primary_format, ImageFormat::Jpeg);
        assert_eq!(req.extra_formats, vec![ImageFormat::Png, ImageFormat::Pdf]);
        assert!(req.split_into_sections);
        assert_eq!(req.fixed_width, Some(900));
        assert_eq!(req.output_directory, PathBuf::from("notes/images"));
        assert_eq!(req.file_name_prefix.as_deref(), Some("weekly"));
    }

    #[test]
    fn bare_input_uses_defaults() {
        let cli = Cli::parse_from(["docshot", "doc.html"]);
        let req = cli.into_request(String::new()).unwrap();
        assert_eq!(req.output_directory, PathBuf::from("./images"));
        assert!(req.auto_size);
        assert_eq!(req.quality, 90);
    }
}
