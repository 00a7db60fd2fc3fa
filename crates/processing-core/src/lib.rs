//! Framecast Processing Core
//!
//! Turns the editable scene description into per-frame render input:
//! - **Sampler:** Evaluates keyframe tracks at arbitrary times
//! - **Snapshot:** Resolves every animated property of every element for
//!   one instant, producing an immutable, animation-free scene

pub mod sampler;
pub mod snapshot;

pub use sampler::*;
pub use snapshot::*;
