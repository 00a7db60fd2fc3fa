//! Framecast Render Engine
//!
//! Offline export pipeline turning an animated scene into video, GIF, or
//! image sequences.
//!
//! # Pipeline Architecture
//!
//! ```text
//! elements + tracks ──▶ SnapshotBuilder (t = i / fps)
//!                              │
//!                              ▼
//!                       FrameCompositor ──▶ bounded channel
//!                                                │
//!                                                ▼
//!                                        VideoEncoderSink ──▶ FrameWriter
//!                                                                 │
//! audio layers ──▶ AudioComposer ──────────────▶ mux ◀────────────┘
//!                                                 │
//!                                                 ▼
//!                                         verified output
//! ```

pub mod assets;
pub mod audio;
pub mod backend;
pub mod color;
pub mod compositor;
pub mod encoder;
pub mod export;
pub mod raster;
pub mod text;
pub mod writers;

pub use backend::{FfmpegBackend, RenderBackend};
pub use encoder::{FrameWriter, VideoEncoderSink, WriterStatus, WriterTarget};
pub use export::*;
pub use raster::PixelBuffer;
