//! Core data model: the movie aggregate and its children.
//!
//! Field values use the [`UNKNOWN`] sentinel rather than `Option` so the
//! merge gate can distinguish "never set" from "set to empty" the same way
//! persisted records do.

mod attachment;
mod files;
mod movie;

pub use attachment::{Attachment, ContentType};
pub use files::{ExtraFile, MovieFile};
pub use movie::{DirtyFlag, FormatType, MediaType, Movie};

/// Sentinel marking a field that has never been set by any source.
pub const UNKNOWN: &str = "UNKNOWN";

/// True when a string field still carries the sentinel (or nothing usable).
pub fn is_unknown(value: &str) -> bool {
    value.is_empty() || value == UNKNOWN
}
