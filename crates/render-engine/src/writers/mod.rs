//! Concrete [`FrameWriter`](crate::encoder::FrameWriter) implementations.

pub mod ffmpeg;
pub mod gif;
pub mod sequence;

pub use self::ffmpeg::FfmpegVideoWriter;
pub use self::gif::GifWriter;
pub use self::sequence::ImageSequenceWriter;
