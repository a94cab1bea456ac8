//! Asset Analysis Module
//!
//! Probes the uploaded media and derives the preview images that travel
//! with it in the package.

mod inspector;
mod models;
pub mod thumbnail;

pub use inspector::*;
pub use models::*;
pub use thumbnail::*;
