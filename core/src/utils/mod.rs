//! Utility functions and helpers
//!
//! Name validation, path encoding and small string helpers shared by the
//! client crate.

pub mod path;
pub mod validation;

pub use path::{document_path_segment, encode_path_segment};
pub use validation::{
    design_document_id, is_design_document_id, strip_line_breaks, validate_database_name,
    validate_language, DESIGN_PREFIX,
};
