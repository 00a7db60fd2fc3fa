//! Framecast Scene Model
//!
//! Defines the data contracts the renderer consumes:
//! - **Elements:** Positioned, styled visual items (shapes, text, images, video)
//! - **Tracks:** Keyframe animation tracks keyed by `{elementId}_{property}`
//! - **Audio:** Audio layers placed on the output timeline
//! - **Export:** The immutable configuration of one export job
//!
//! Coordinates are canvas pixels with the origin at the top-left corner and
//! Y increasing downward. Element positions are centers.

pub mod audio;
pub mod color;
pub mod easing;
pub mod element;
pub mod export;
pub mod geometry;
pub mod keyframe;
pub mod manifest;
pub mod track;

pub use audio::*;
pub use color::*;
pub use easing::*;
pub use element::*;
pub use export::*;
pub use geometry::*;
pub use keyframe::*;
pub use manifest::*;
pub use track::*;
