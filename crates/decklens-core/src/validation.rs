//! Upload and form validation.
//!
//! Files are accepted by extension only; magic bytes are sniffed for the
//! multipart content type and to warn about mislabeled files, never to reject.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::models::{FileSlot, RelevanceBand, SelectedFile};

static NON_ALPHANUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9]").expect("static regex is valid"));

/// Replace every non-alphanumeric character with `_`.
///
/// The result is safe to embed in generated tag strings. Each character is
/// replaced individually, so `"My Tag!"` becomes `"My_Tag_"`.
pub fn sanitize_tag_prefix(input: &str) -> String {
    NON_ALPHANUMERIC.replace_all(input, "_").into_owned()
}

/// Tag applied to cards of a relevance band: `prefix_high`, `prefix_medium`,
/// `prefix_low`.
pub fn relevance_tag(prefix: &str, band: RelevanceBand) -> String {
    format!("{}_{}", prefix, band.tag_suffix())
}

/// Case-insensitive extension check. `"deck.APKG"` has extension `apkg`;
/// `"apkg"` alone has none.
pub fn has_extension(file_name: &str, extension: &str) -> bool {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) => !stem.is_empty() && ext.eq_ignore_ascii_case(extension),
        None => false,
    }
}

/// Check a file against the rules of the slot it is offered to.
pub fn validate_for_slot(slot: FileSlot, file: &SelectedFile, max_bytes: u64) -> Result<()> {
    validate_extension(slot, &file.file_name)?;
    validate_size(slot, &file.file_name, file.size(), max_bytes)
}

pub fn validate_extension(slot: FileSlot, file_name: &str) -> Result<()> {
    let expected = slot.expected_extension();
    if !has_extension(file_name, expected) {
        return Err(Error::InvalidFile {
            slot,
            file_name: file_name.to_string(),
            expected,
        });
    }
    Ok(())
}

pub fn validate_size(slot: FileSlot, file_name: &str, size: u64, max_bytes: u64) -> Result<()> {
    if size > max_bytes {
        return Err(Error::FileTooLarge {
            slot,
            file_name: file_name.to_string(),
            size,
            limit: max_bytes,
        });
    }
    Ok(())
}

/// True when the bytes look like the format the slot expects.
///
/// Empty payloads are given the benefit of the doubt.
pub fn content_matches_slot(slot: FileSlot, bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return true;
    }
    match slot {
        // .apkg is a zip archive
        FileSlot::Deck => infer::archive::is_zip(bytes),
        FileSlot::Study => infer::archive::is_pdf(bytes),
    }
}

/// Detect the MIME type of an upload from magic bytes, falling back to the
/// file extension.
pub fn detect_content_type(file_name: &str, bytes: &[u8]) -> String {
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_string();
    }

    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("pdf") => "application/pdf".to_string(),
        Some("zip") => "application/zip".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}
