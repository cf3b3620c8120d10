use crate::text::{heading_lines, normalize_line};

pub const SIGNATURE_DELIMITER: &str = "|";

/// Fingerprint of a draft's level-2/3 heading sequence. Body text does not
/// participate, so rewording paragraphs leaves the signature unchanged.
/// Returns an empty string when there are no headings.
pub fn build_signature(content: &str) -> String {
    heading_lines(content)
        .map(normalize_line)
        .collect::<Vec<_>>()
        .join(SIGNATURE_DELIMITER)
}

/// Empty signatures carry no structure and must never be counted.
pub fn is_scored(signature: &str) -> bool {
    !signature.is_empty()
}
