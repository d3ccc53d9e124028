//! Atlas region resolution and vertex skinning for 2D skeletal-animation runtimes.
//!
//! This crate is renderer-agnostic: it turns a packed-atlas description into
//! addressable, rotation-aware texture regions, and turns bone poses plus
//! attachment-local geometry into world-space vertices. Pose solving,
//! animation timelines and rendering live in the surrounding runtime.

#![forbid(unsafe_code)]

mod atlas;
mod error;
mod skinning;

pub use atlas::*;
pub use error::*;
pub use skinning::*;
