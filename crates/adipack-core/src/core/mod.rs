//! adipack Core Engine
//!
//! Stage modules for the asset-to-package pipeline plus the shared
//! configuration, filesystem and FFmpeg plumbing they run on.

pub mod adi;
pub mod assets;
pub mod ffmpeg;
pub mod fs;
pub mod package;
pub mod pipeline;
pub mod settings;
pub mod storage;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;

#[cfg(test)]
mod tests_pipeline;
