//! Package Module
//!
//! Bundles descriptor, media and thumbnails into a single zip archive.
//! Entries are collected first and the archive is only produced by
//! [`PackageBuilder::finalize`] / [`PackageBuilder::finalize_to`], so a
//! failed build never leaves a partial archive behind.

mod assembler;
mod builder;

pub use assembler::*;
pub use builder::*;

/// Fixed entry name of the descriptor inside the package
pub const DESCRIPTOR_ENTRY_NAME: &str = "adi.xml";

/// Default local/object name of the package
pub const DEFAULT_PACKAGE_NAME: &str = "output.zip";
