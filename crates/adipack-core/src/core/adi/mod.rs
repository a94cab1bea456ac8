//! ADI Descriptor Module
//!
//! Builds the ADI 1.1 metadata document that describes a packaged asset:
//! an `AMS` header plus an ordered list of `App_Data` name/value pairs made
//! of the user's descriptive fields followed by facts taken from the probe.

mod descriptor;
mod fields;
mod synthesizer;

pub use descriptor::*;
pub use fields::*;
pub use synthesizer::*;
