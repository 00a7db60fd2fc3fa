//! Animated GIF output.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use framecast_common::clock::PresentationTime;
use framecast_common::error::{FramecastError, FramecastResult};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame};

use crate::encoder::{FrameWriter, WriterStatus, WriterTarget};
use crate::raster::PixelBuffer;

const GIF_TRAILER: u8 = 0x3B;

/// Buffered output file shared with the encoder.
///
/// Write failures are recorded instead of returned, so the trailer the encoder
/// emits when dropped can never panic. [`GifWriter`] checks the recorded
/// failure after every frame and when closing.
#[derive(Clone)]
struct SharedSink(Arc<Mutex<SinkState>>);

struct SinkState {
    out: BufWriter<File>,
    failure: Option<io::Error>,
    last_byte: Option<u8>,
}

impl SharedSink {
    fn new(file: File) -> Self {
        Self(Arc::new(Mutex::new(SinkState {
            out: BufWriter::new(file),
            failure: None,
            last_byte: None,
        })))
    }

    fn take_failure(&self) -> Option<io::Error> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failure
            .take()
    }

    /// Flushes and syncs the file, then checks the stream ends with the trailer.
    fn close(&self) -> io::Result<()> {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(err) = state.failure.take() {
            return Err(err);
        }
        state.out.flush()?;
        state.out.get_ref().sync_all()?;
        if state.last_byte != Some(GIF_TRAILER) {
            return Err(io::Error::other("GIF trailer was not written"));
        }
        Ok(())
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if state.failure.is_none() {
            match state.out.write_all(buf) {
                Ok(()) => {
                    if let Some(&last) = buf.last() {
                        state.last_byte = Some(last);
                    }
                }
                Err(err) => state.failure = Some(err),
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Encodes frames into a looping GIF, one frame per `1/frame_rate`.
pub struct GifWriter {
    output: PathBuf,
    sink: SharedSink,
    encoder: Option<GifEncoder<SharedSink>>,
    delay: Delay,
    frames_sent: u64,
    status: WriterStatus,
}

impl GifWriter {
    pub fn create(target: &WriterTarget) -> FramecastResult<Self> {
        let file = File::create(&target.output).map_err(|e| {
            FramecastError::writer_setup(format!(
                "cannot create {}: {e}",
                target.output.display()
            ))
        })?;
        let sink = SharedSink::new(file);
        let mut encoder = GifEncoder::new(sink.clone());
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| FramecastError::writer_setup(format!("GIF encoder setup: {e}")))?;

        // GIF delays have centisecond resolution.
        let delay = Delay::from_saturating_duration(Duration::from_secs_f64(
            1.0 / target.frame_rate.max(1e-3),
        ));
        Ok(Self {
            output: target.output.clone(),
            sink,
            encoder: Some(encoder),
            delay,
            frames_sent: 0,
            status: WriterStatus::Writing,
        })
    }
}

impl FrameWriter for GifWriter {
    fn is_ready_for_more_data(&self) -> bool {
        true
    }

    fn append(&mut self, frame: PixelBuffer, pts: PresentationTime) -> FramecastResult<()> {
        let Some(encoder) = self.encoder.as_mut() else {
            return Err(FramecastError::encode_rejection(
                pts.frame_index,
                format!("writer is {:?}", self.status),
            ));
        };
        let frame = Frame::from_parts(frame.to_rgba_image(), 0, 0, self.delay);
        let encoded = encoder
            .encode_frame(frame)
            .map_err(|e| e.to_string())
            .and_then(|()| match self.sink.take_failure() {
                Some(err) => Err(err.to_string()),
                None => Ok(()),
            });
        if let Err(message) = encoded {
            self.encoder = None;
            self.status = WriterStatus::Failed;
            return Err(FramecastError::encode_rejection(pts.frame_index, message));
        }
        self.frames_sent += 1;
        Ok(())
    }

    fn finish(&mut self) -> FramecastResult<()> {
        if self.status != WriterStatus::Writing {
            return Err(FramecastError::writer_setup(format!(
                "cannot finish a writer that is {:?}",
                self.status
            )));
        }
        // Dropping the encoder writes the trailer.
        self.encoder = None;
        if let Err(err) = self.sink.close() {
            self.status = WriterStatus::Failed;
            return Err(FramecastError::encode_rejection(
                self.frames_sent.saturating_sub(1),
                format!("finalizing {} failed: {err}", self.output.display()),
            ));
        }
        self.status = WriterStatus::Finished;
        tracing::info!(output = %self.output.display(), "GIF written");
        Ok(())
    }

    fn cancel(&mut self) {
        if self.status == WriterStatus::Writing {
            self.encoder = None;
            self.status = WriterStatus::Cancelled;
        }
    }

    fn status(&self) -> WriterStatus {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::WriterKind;
    use framecast_common::clock::FrameClock;
    use image::AnimationDecoder;

    #[test]
    fn test_writes_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let target = WriterTarget {
            output: dir.path().join("loop.gif"),
            width: 8,
            height: 8,
            frame_rate: 10.0,
            kind: WriterKind::Gif,
        };
        let mut writer = GifWriter::create(&target).unwrap();
        let clock = FrameClock::new(10.0);
        for i in 0..3 {
            writer
                .append(PixelBuffer::new(8, 8).unwrap(), clock.presentation_time(i))
                .unwrap();
        }
        writer.finish().unwrap();
        assert_eq!(writer.status(), WriterStatus::Finished);

        let bytes = std::fs::read(&target.output).unwrap();
        assert_eq!(bytes.last(), Some(&GIF_TRAILER));

        let file = std::io::BufReader::new(File::open(&target.output).unwrap());
        let decoder = image::codecs::gif::GifDecoder::new(file).unwrap();
        let frames = decoder.into_frames().collect_frames().unwrap();
        assert_eq!(frames.len(), 3);
        let (num, den) = frames[0].delay().numer_denom_ms();
        assert!((num as f64 / den as f64 - 100.0).abs() < 1e-6);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_flush_failure_fails_finish() {
        let target = WriterTarget {
            output: PathBuf::from("/dev/full"),
            width: 8,
            height: 8,
            frame_rate: 10.0,
            kind: WriterKind::Gif,
        };
        let mut writer = GifWriter::create(&target).unwrap();
        let clock = FrameClock::new(10.0);
        for i in 0..2 {
            writer
                .append(PixelBuffer::new(8, 8).unwrap(), clock.presentation_time(i))
                .unwrap();
        }
        let err = writer.finish().unwrap_err();
        match err {
            FramecastError::EncodeRejection { frame_index, .. } => assert_eq!(frame_index, 1),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(writer.status(), WriterStatus::Failed);
    }

    #[test]
    fn test_finish_without_frames_fails() {
        let dir = tempfile::tempdir().unwrap();
        let target = WriterTarget {
            output: dir.path().join("empty.gif"),
            width: 8,
            height: 8,
            frame_rate: 10.0,
            kind: WriterKind::Gif,
        };
        let mut writer = GifWriter::create(&target).unwrap();
        assert!(writer.finish().is_err());
        assert_eq!(writer.status(), WriterStatus::Failed);
    }
}
