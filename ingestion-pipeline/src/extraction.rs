use bytes::Bytes;
use common::error::AppError;
use tracing::debug;

/// Extract plain text from an uploaded payload, dispatching on the file
/// extension. Text-like files are decoded as UTF-8; PDFs go through
/// `pdf-extract`. Anything else is rejected.
pub async fn extract_text(bytes: &Bytes, file_name: &str) -> Result<String, AppError> {
    let mime = mime_guess::from_path(file_name).first_or_octet_stream();
    debug!(file_name, %mime, "extracting text");

    let text = if mime == mime::APPLICATION_PDF {
        extract_pdf_text(bytes.clone()).await?
    } else if is_text_like(&mime) {
        std::str::from_utf8(bytes)
            .map_err(|e| AppError::Extraction(format!("{file_name} is not valid UTF-8: {e}")))?
            .to_owned()
    } else {
        return Err(AppError::Extraction(format!(
            "unsupported file type {mime} for {file_name}"
        )));
    };

    if text.trim().is_empty() {
        return Err(AppError::Extraction(format!(
            "no text content found in {file_name}"
        )));
    }

    Ok(text)
}

/// Treat declared text types and unknown binaries as UTF-8 candidates; the
/// decode step rejects actual binary data.
fn is_text_like(mime: &mime::Mime) -> bool {
    mime.type_() == mime::TEXT
        || *mime == mime::APPLICATION_OCTET_STREAM
        || (mime.type_() == mime::APPLICATION
            && matches!(mime.subtype().as_str(), "json" | "xml" | "markdown"))
}

async fn extract_pdf_text(bytes: Bytes) -> Result<String, AppError> {
    // pdf-extract is CPU-bound and synchronous.
    let extracted = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem(&bytes).map(|s| s.trim().to_owned())
    })
    .await?;

    extracted.map_err(|e| AppError::Extraction(format!("PDF extraction failed: {e}")))
}
