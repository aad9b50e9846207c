//! PDF text extraction.
//!
//! Adapted from the teacher's `crates/ingestion/src/pdf.rs`. The one
//! semantic change required by spec §4.1 step 2 / §9's Open Question
//! resolution: a PDF whose extracted text is empty or whitespace-only is
//! not an error — the caller drops the document and continues the run.

use crate::errors::{AppError, Result};
use std::path::Path;
use tracing::{debug, warn};

/// Extract text from a PDF file. Returns `Ok(None)` if the PDF loads but no
/// non-whitespace text content is found (the document is dropped, not
/// failed). Returns `Err` only if the file itself cannot be parsed as a PDF.
pub fn extract_text(path: &Path) -> Result<Option<String>> {
    let doc = lopdf::Document::load(path)
        .map_err(|e| AppError::internal(format!("failed to load PDF {}: {e}", path.display())))?;

    let mut text = String::new();
    let pages = doc.get_pages();
    debug!(path = %path.display(), page_count = pages.len(), "extracting text from PDF");

    for (page_num, _) in pages.iter() {
        match extract_page_text(&doc, *page_num) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => {
                warn!(path = %path.display(), page = page_num, error = %e, "failed to extract page text, skipping");
            }
        }
    }

    let cleaned = clean_text(&text);
    if cleaned.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(cleaned))
}

fn extract_page_text(doc: &lopdf::Document, page_num: u32) -> std::result::Result<String, String> {
    let page_id = doc
        .page_iter()
        .nth((page_num - 1) as usize)
        .ok_or_else(|| format!("page {page_num} not found"))?;

    let content = doc.get_page_content(page_id).map_err(|e| e.to_string())?;
    Ok(extract_text_from_content(&content))
}

fn extract_text_from_content(content: &[u8]) -> String {
    let content_str = String::from_utf8_lossy(content);
    let mut text = String::new();
    let mut in_text_block = false;
    let mut current_text = String::new();

    for line in content_str.lines() {
        let trimmed = line.trim();

        if trimmed == "BT" {
            in_text_block = true;
            continue;
        }

        if trimmed == "ET" {
            in_text_block = false;
            if !current_text.is_empty() {
                text.push_str(&current_text);
                text.push(' ');
                current_text.clear();
            }
            continue;
        }

        if in_text_block {
            if let Some(text_content) = extract_text_from_operator(trimmed) {
                current_text.push_str(&text_content);
            }
        }
    }

    text
}

fn extract_text_from_operator(line: &str) -> Option<String> {
    if line.ends_with("Tj") || line.ends_with('\'') || line.ends_with('"') {
        if let Some(start) = line.find('(') {
            if let Some(end) = line.rfind(')') {
                let text = &line[start + 1..end];
                return Some(decode_pdf_string(text));
            }
        }
    }

    if line.ends_with("TJ") {
        let mut result = String::new();
        let mut in_paren = false;
        let mut current = String::new();

        for ch in line.chars() {
            match ch {
                '(' => in_paren = true,
                ')' => {
                    in_paren = false;
                    result.push_str(&decode_pdf_string(&current));
                    current.clear();
                }
                _ if in_paren => current.push(ch),
                _ => {}
            }
        }

        if !result.is_empty() {
            return Some(result);
        }
    }

    None
}

fn decode_pdf_string(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some('\\') => result.push('\\'),
                Some('(') => result.push('('),
                Some(')') => result.push(')'),
                Some(c) => result.push(c),
                None => {}
            }
        } else {
            result.push(ch);
        }
    }

    result
}

fn clean_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{FEFF}', "")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
}
