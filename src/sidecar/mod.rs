//! Local metadata sidecars: NFO files and embedded container attachments.

pub mod attachments;
pub mod nfo;

pub use attachments::{classify, AttachmentService};
pub use nfo::{apply_nfo_content, NfoReader, SOURCE_NFO};
