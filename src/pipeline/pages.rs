//! PDF page counting for throughput statistics.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto a dedicated thread pool
//! thread designed for blocking operations.
//!
//! Page counts are metadata, not output. Any failure here (library missing,
//! corrupt PDF) is logged and reported as `None`; it never fails the item.

use pdfium_render::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Set once binding has failed, so the warning is not repeated per file.
static BINDING_FAILED: AtomicBool = AtomicBool::new(false);

/// True when `path` has a `.pdf` extension (any case).
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Count the pages of a PDF, or `None` if it is not a PDF or cannot be read.
pub async fn count_pages(path: &Path) -> Option<usize> {
    if !is_pdf(path) || BINDING_FAILED.load(Ordering::Relaxed) {
        return None;
    }
    let path = path.to_path_buf();
    match tokio::task::spawn_blocking(move || count_pages_blocking(&path)).await {
        Ok(pages) => pages,
        Err(e) => {
            warn!("Page count task panicked: {}", e);
            None
        }
    }
}

/// Blocking implementation of page counting.
fn count_pages_blocking(pdf_path: &Path) -> Option<usize> {
    let pdfium = match bind_pdfium() {
        Ok(p) => p,
        Err(e) => {
            if !BINDING_FAILED.swap(true, Ordering::Relaxed) {
                warn!(
                    "pdfium unavailable, page counts disabled: {:?} \
                     (set PDFIUM_LIB_PATH to the directory holding libpdfium)",
                    e
                );
            }
            return None;
        }
    };

    // The document borrows `pdfium`; it must be gone before `pdfium` is.
    let pages = match pdfium.load_pdf_from_file(pdf_path, None) {
        Ok(document) => {
            let pages = document.pages().len() as usize;
            debug!("{}: {} pages", pdf_path.display(), pages);
            Some(pages)
        }
        Err(e) => {
            warn!("Cannot count pages of {}: {:?}", pdf_path.display(), e);
            None
        }
    };
    pages
}

/// Bind to the pdfium library in the `PDFIUM_LIB_PATH` directory, else the
/// system library.
fn bind_pdfium() -> Result<Pdfium, PdfiumError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(dir) if !dir.is_empty() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))?
        }
        _ => Pdfium::bind_to_system_library()?,
    };
    Ok(Pdfium::new(bindings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_extension_detection() {
        assert!(is_pdf(Path::new("paper.pdf")));
        assert!(is_pdf(Path::new("in/SCAN.PDF")));
        assert!(!is_pdf(Path::new("notes.txt")));
        assert!(!is_pdf(Path::new("pdf")));
    }

    #[tokio::test]
    async fn non_pdf_has_no_page_count() {
        assert_eq!(count_pages(Path::new("notes.txt")).await, None);
    }

    #[test]
    fn corrupt_pdf_has_no_page_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();
        // None whether or not a pdfium library is installed.
        assert_eq!(count_pages_blocking(&path), None);
    }
}
