//! Utility functions for working with A2A Part objects.

use crate::types::{FileContent, FileDecodeError, Part};

/// Extracts text content from all text Parts in a list.
///
/// # Example
///
/// ```
/// use a2a_rs::types::Part;
/// use a2a_rs::utils::get_text_parts;
///
/// let parts = vec![
///     Part::Text { text: "Hello".to_string(), metadata: None },
///     Part::Text { text: "World".to_string(), metadata: None },
/// ];
/// let texts = get_text_parts(&parts);
/// assert_eq!(texts, vec!["Hello", "World"]);
/// ```
pub fn get_text_parts(parts: &[Part]) -> Vec<String> {
    parts
        .iter()
        .filter_map(|part| match part {
            Part::Text { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

/// Decodes data content from all data Parts in a list (base64 -> bytes).
///
/// Parts whose `data` field fails to decode as base64 are skipped.
///
/// # Example
///
/// ```
/// use a2a_rs::types::Part;
/// use a2a_rs::utils::get_data_parts;
///
/// let parts = vec![Part::data_from_bytes(b"value".to_vec())];
/// let data = get_data_parts(&parts);
/// assert_eq!(data, vec![b"value".to_vec()]);
/// ```
pub fn get_data_parts(parts: &[Part]) -> Vec<Vec<u8>> {
    parts
        .iter()
        .filter_map(|part| part.decode_data())
        .filter_map(Result::ok)
        .collect()
}

/// Decodes file content from all file Parts in a list.
///
/// Parts whose `file` field matches neither the URL nor the base64
/// decoding branch are skipped.
///
/// # Example
///
/// ```
/// use a2a_rs::types::Part;
/// use a2a_rs::utils::get_file_parts;
///
/// let parts = vec![Part::file_from_url("https://example.com/file.pdf")];
/// let files = get_file_parts(&parts);
/// assert_eq!(files.len(), 1);
/// ```
pub fn get_file_parts(parts: &[Part]) -> Vec<FileContent> {
    parts
        .iter()
        .filter_map(|part| part.decode_file())
        .filter_map(Result::ok)
        .collect()
}

/// Decodes file content from all file Parts in a list, propagating the
/// first decode failure encountered.
pub fn try_get_file_parts(parts: &[Part]) -> Result<Vec<FileContent>, FileDecodeError> {
    parts.iter().filter_map(|part| part.decode_file()).collect()
}
