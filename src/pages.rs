//! Turn uploaded documents into page images.
//!
//! PDFs are rasterized with Poppler's `pdftocairo`. PNG and JPEG uploads are
//! decoded and re-encoded as RGB PNGs, so that the OCR model always sees the
//! same kind of input.

use std::{io::Cursor, sync::LazyLock};

use image::ImageFormat;
use regex::Regex;
use tempfile::{NamedTempFile, TempDir};
use tokio::process::Command;

use crate::{
    async_utils::{check_for_command_failure, spawn_blocking_propagating_panics},
    cpu_limit::with_cpu_semaphore,
    data_url::data_url,
    prelude::*,
};

/// A default error regex for checking command output.
static ERROR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error").expect("failed to compile regex"));

static DOWNGRADE_TO_WARNING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error: xref num").expect("failed to compile regex")
});

/// Does this line contain an error?
fn is_error_line(line: &str) -> bool {
    ERROR_REGEX.is_match(line) && !DOWNGRADE_TO_WARNING_REGEX.is_match(line)
}

/// File type tags we know how to turn into pages.
pub const SUPPORTED_FILE_TYPES: &[&str] = &["PDF", "PNG", "JPG", "JPEG"];

/// A page of a document, ready to send to a vision model.
#[derive(Debug, Clone)]
pub struct Page {
    /// The MIME type of our data. Always `image/png` today.
    pub mime_type: String,
    /// The encoded image.
    pub data: Vec<u8>,
}

impl Page {
    /// Convert to a data URL.
    pub fn to_data_url(&self) -> String {
        data_url(&self.mime_type, &self.data)
    }
}

/// Which pages of a document do we want?
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageSelection {
    /// Only the first page.
    First,
    /// Every page, in order.
    All,
}

/// Options for loading pages.
#[derive(Clone, Debug)]
pub struct PageOptions {
    /// The DPI to use for rasterization.
    pub rasterize_dpi: u32,

    /// Where to put temporary files. Defaults to the system temporary
    /// directory.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            rasterize_dpi: 300,
            scratch_dir: None,
        }
    }
}

impl PageOptions {
    fn temp_file(&self) -> std::io::Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("upload").suffix(".pdf");
        match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
    }

    fn temp_dir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pages");
        match &self.scratch_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
    }
}

/// Errors which can occur while loading pages.
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    /// We don't handle this file type.
    #[error("Unsupported file type: {0}.")]
    Unsupported(String),

    /// The data could not be turned into an image.
    #[error("Could not process file into an image: {0:#}")]
    Decode(anyhow::Error),

    /// Something went wrong on our side.
    #[error(transparent)]
    Internal(anyhow::Error),
}

/// Load the pages of a document, given its uppercase file type tag.
#[instrument(level = "debug", skip_all, fields(%file_type, ?selection))]
pub async fn load_pages(
    file_type: &str,
    data: &[u8],
    selection: PageSelection,
    options: &PageOptions,
) -> Result<Vec<Page>, PageError> {
    match file_type {
        "PDF" => rasterize_pdf(data, selection, options).await,
        "PNG" | "JPG" | "JPEG" => {
            let data = data.to_owned();
            let page = spawn_blocking_propagating_panics(move || normalize_image(&data))
                .await
                .map_err(PageError::Decode)?;
            Ok(vec![page])
        }
        other => Err(PageError::Unsupported(other.to_owned())),
    }
}

/// Decode an image and re-encode it as an RGB PNG.
fn normalize_image(data: &[u8]) -> Result<Page> {
    let image = image::load_from_memory(data).context("failed to decode image")?;
    let rgb = image.to_rgb8();
    let mut png = Cursor::new(Vec::new());
    rgb.write_to(&mut png, ImageFormat::Png)
        .context("failed to encode PNG")?;
    Ok(Page {
        mime_type: "image/png".to_owned(),
        data: png.into_inner(),
    })
}

/// Rasterize a PDF using `pdftocairo`.
#[instrument(level = "debug", skip_all, fields(dpi = options.rasterize_dpi))]
async fn rasterize_pdf(
    data: &[u8],
    selection: PageSelection,
    options: &PageOptions,
) -> Result<Vec<Page>, PageError> {
    // Both of these are removed when they go out of scope, on every path.
    let mut pdf = options
        .temp_file()
        .context("failed to create temporary PDF file")
        .map_err(PageError::Internal)?;
    std::io::Write::write_all(&mut pdf, data)
        .context("failed to write temporary PDF file")
        .map_err(PageError::Internal)?;
    let tmpdir = options
        .temp_dir()
        .context("failed to create temporary page directory")
        .map_err(PageError::Internal)?;

    let mut cmd = Command::new("pdftocairo");
    cmd.arg("-png")
        .arg("-r")
        .arg(options.rasterize_dpi.to_string());
    if selection == PageSelection::First {
        cmd.arg("-f").arg("1").arg("-l").arg("1");
    }
    cmd.arg(pdf.path()).arg(tmpdir.path().join("page"));

    // We use `with_cpu_semaphore` because `pdftocairo` will use _at least_
    // 100% of a CPU.
    let output = with_cpu_semaphore(|| async {
        cmd.output().await.context("failed to run pdftocairo")
    })
    .await
    .map_err(PageError::Internal)?;
    check_for_command_failure("pdftocairo", &output, Some(&is_error_line))
        .map_err(PageError::Decode)?;

    let pages = read_page_dir(tmpdir.path())
        .await
        .map_err(PageError::Internal)?;
    if pages.is_empty() {
        return Err(PageError::Decode(anyhow!("PDF contains no pages")));
    }
    Ok(pages)
}

/// Read all the PNG files in `dir`, in lexical order.
///
/// `pdftocairo` zero-pads page numbers, so lexical order is page order.
async fn read_page_dir(dir: &Path) -> Result<Vec<Page>> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to read directory {:?}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "png") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut pages = Vec::with_capacity(paths.len());
    for path in paths {
        let data = tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read page {:?}", path.display()))?;
        pages.push(Page {
            mime_type: "image/png".to_owned(),
            data,
        });
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{jpeg_bytes, minimal_pdf, png_bytes};

    #[test]
    fn is_error_line_works() {
        assert!(is_error_line("Syntax Error: Couldn't read xref table"));
        assert!(!is_error_line("Syntax Error: xref num 12 not found"));
        assert!(!is_error_line("Everything is fine"));
    }

    #[tokio::test]
    async fn jpeg_is_normalized_to_png() {
        let pages = load_pages("JPG", &jpeg_bytes(), PageSelection::First, &PageOptions::default())
            .await
            .unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].mime_type, "image/png");
        assert_eq!(
            image::guess_format(&pages[0].data).unwrap(),
            ImageFormat::Png
        );
    }

    #[tokio::test]
    async fn png_data_url() {
        let pages = load_pages("PNG", &png_bytes(), PageSelection::All, &PageOptions::default())
            .await
            .unwrap();
        assert!(pages[0].to_data_url().starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn garbage_is_a_decode_error() {
        let err = load_pages("PNG", b"not an image", PageSelection::First, &PageOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PageError::Decode(_)));
    }

    #[tokio::test]
    async fn unknown_types_are_unsupported() {
        let err = load_pages("DOCX", b"PK", PageSelection::First, &PageOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PageError::Unsupported(ref t) if t == "DOCX"));
        assert_eq!(err.to_string(), "Unsupported file type: DOCX.");
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn pdf_pages_are_rasterized() {
        let scratch = tempfile::tempdir().unwrap();
        let options = PageOptions {
            rasterize_dpi: 72,
            scratch_dir: Some(scratch.path().to_owned()),
        };
        let pages = load_pages("PDF", &minimal_pdf(2), PageSelection::All, &options)
            .await
            .unwrap();
        assert_eq!(pages.len(), 2);
        let first = load_pages("PDF", &minimal_pdf(2), PageSelection::First, &options)
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn broken_pdf_is_a_decode_error() {
        let err = load_pages("PDF", b"%PDF-1.4 nope", PageSelection::First, &PageOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PageError::Decode(_)));
    }
}
