//! Request path encoding
//!
//! Database names and document ids travel as single path segments, so every
//! reserved character (including `/`) is percent-encoded. Design document
//! ids keep the slash after `_design/` literal.

use url::form_urlencoded::byte_serialize;

use super::validation::DESIGN_PREFIX;

/// Percent-encode `segment` as one path segment
///
/// Only ASCII alphanumerics and `*-._` pass through unchanged; a space is
/// written as `%20`.
pub fn encode_path_segment(segment: &str) -> String {
    byte_serialize(segment.as_bytes())
        .map(|chunk| if chunk == "+" { "%20" } else { chunk })
        .collect()
}

/// Path segment(s) for a document id
pub fn document_path_segment(id: &str) -> String {
    match id.strip_prefix(DESIGN_PREFIX) {
        Some(name) => format!("{}{}", DESIGN_PREFIX, encode_path_segment(name)),
        None => encode_path_segment(id),
    }
}
