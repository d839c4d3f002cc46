//! Data models for ytacquire.

mod file;
mod video;

pub use file::{FileRef, FileResult};
pub use video::{Localization, PendingStage, Thumbnail, VideoRecord, THUMBNAIL_SIZES};
