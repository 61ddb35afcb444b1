//! Domain types for preview artifacts and their storage keys.

mod preview;
mod preview_key;

pub use preview::{Content, ContentStream, Metadata, Preview};
pub use preview_key::PreviewKey;
