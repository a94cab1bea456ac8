//! adipack Core Library
//!
//! Turns an uploaded video asset into a publishable VOD package:
//! probe the media, capture periodic thumbnails, synthesize an ADI 1.1
//! descriptor, bundle everything into a zip archive and push it to
//! S3-compatible object storage.
//!
//! The [`core::pipeline::Pipeline`] type wires the stages together; each
//! stage is also usable on its own.

pub mod core;

pub use crate::core::{CoreError, CoreResult};
