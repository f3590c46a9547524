use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::warn;

/// Extract the text of a PDF, page by page, on the blocking pool.
///
/// Returns `None` when the file can't be parsed (including parser panics on
/// malformed input) or when no page yields any text.
pub async fn extract_pdf_text(bytes: Vec<u8>) -> Option<String> {
    match tokio::task::spawn_blocking(move || extract_blocking(&bytes)).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "PDF extraction task failed");
            None
        }
    }
}

fn extract_blocking(bytes: &[u8]) -> Option<String> {
    let raw = match catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes))) {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            warn!(error = %e, "PDF parse failed");
            return None;
        }
        Err(_) => {
            warn!("PDF parser panicked");
            return None;
        }
    };
    join_pages(&raw)
}

/// pdf-extract separates pages with form feeds. Keep the non-empty ones.
pub fn join_pages(raw: &str) -> Option<String> {
    let text = raw
        .split('\x0c')
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
