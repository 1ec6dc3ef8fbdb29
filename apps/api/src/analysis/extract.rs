//! Turns an uploaded resume into plain text.
//!
//! PDFs go through `pdf-extract`; anything else must already be UTF-8 text.

use tracing::warn;

use crate::errors::AppError;

const PDF_MAGIC: &[u8] = b"%PDF";
const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeFormat {
    Pdf,
    PlainText,
}

/// Sniffs the format from the bytes first and the declared content type second.
pub fn detect_format(bytes: &[u8], content_type: Option<&str>) -> ResumeFormat {
    if bytes.starts_with(PDF_MAGIC) || content_type == Some("application/pdf") {
        ResumeFormat::Pdf
    } else {
        ResumeFormat::PlainText
    }
}

pub async fn extract_resume_text(
    bytes: Vec<u8>,
    content_type: Option<&str>,
) -> Result<String, AppError> {
    if bytes.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".to_string()));
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::Validation(format!(
            "Uploaded file exceeds {} MB",
            MAX_UPLOAD_BYTES / (1024 * 1024)
        )));
    }

    let text = match detect_format(&bytes, content_type) {
        ResumeFormat::Pdf => extract_pdf(bytes).await?,
        ResumeFormat::PlainText => String::from_utf8(bytes).map_err(|_| {
            AppError::Validation("Unsupported file type: upload a PDF or plain text".to_string())
        })?,
    };

    let text = normalize_whitespace(&text);
    if text.is_empty() {
        return Err(AppError::Validation(
            "No readable text found in the uploaded resume".to_string(),
        ));
    }
    Ok(text)
}

async fn extract_pdf(bytes: Vec<u8>) -> Result<String, AppError> {
    // pdf-extract is CPU-bound and panics on some malformed files; a panic surfaces as a JoinError.
    let joined = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes)).await;

    match joined {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => {
            warn!("PDF extraction failed: {e:?}");
            Err(AppError::Validation("Could not read the uploaded PDF".to_string()))
        }
        Err(e) => {
            warn!("PDF extraction aborted: {e}");
            Err(AppError::Validation("Could not read the uploaded PDF".to_string()))
        }
    }
}

/// Collapses runs of blank lines and trims trailing spaces.
fn normalize_whitespace(text: &str) -> String {
    let mut out = Vec::new();
    let mut blank_run = 0;
    for line in text.lines().map(str::trim_end) {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push(line);
    }
    out.join("\n").trim().to_string()
}
