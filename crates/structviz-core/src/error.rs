//! # Error Types
//!
//! General error handling for the extraction and rendering pipeline.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for structviz operations
///
/// This enum represents all the ways the pipeline can fail. Anything not
/// covered here (missing debug info, unsupported relocations, unresolvable
/// type chains) is by policy *not* an error: those cases degrade to warnings
/// or placeholder values so that a partially described binary still renders.
///
/// ## Error Categories
///
/// 1. **Input errors**: ObjectParse (the container format is unreadable)
/// 2. **Metadata errors**: Dwarf (the debug info is malformed)
/// 3. **I/O errors**: Io (file reads, scratch files, SVG writes)
#[derive(Error, Debug)]
pub enum StructvizError
{
    /// The object file container could not be parsed
    ///
    /// This happens when:
    /// - The input is not an ELF/object file at all
    /// - The file is truncated or corrupt
    #[error("failed to parse {path}: {detail}")]
    ObjectParse
    {
        /// Path of the offending input file
        path: PathBuf,
        /// Parser error message
        detail: String,
    },

    /// The DWARF debug info could not be read
    ///
    /// The context string names the operation that failed (e.g. "parsing
    /// compilation unit", "resolving DWARF string") so a malformed input can
    /// be pinned down without a debugger.
    #[error("{context}: {source}")]
    Dwarf
    {
        /// Description of the operation that failed
        context: String,
        /// Underlying gimli error
        source: gimli::Error,
    },

    /// I/O error (for file operations, etc.)
    ///
    /// Used for errors when reading inputs, writing scratch copies, or
    /// writing the rendered SVG documents. This is a standard Rust
    /// `std::io::Error` converted to our error type.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, StructvizError>`
pub type Result<T> = std::result::Result<T, StructvizError>;

pub(crate) fn map_dwarf_error(context: &str, err: gimli::Error) -> StructvizError
{
    StructvizError::Dwarf {
        context: context.to_string(),
        source: err,
    }
}
