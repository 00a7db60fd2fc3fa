//! Numbered still-image output.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use framecast_common::clock::PresentationTime;
use framecast_common::error::{FramecastError, FramecastResult};
use framecast_scene_model::export::ImageFormat;
use image::codecs::jpeg::JpegEncoder;

use crate::encoder::{FrameWriter, WriterKind, WriterStatus, WriterTarget};
use crate::raster::PixelBuffer;

/// Writes `{base}_{index:05}.{ext}` files into a directory.
#[derive(Debug)]
pub struct ImageSequenceWriter {
    dir: PathBuf,
    base_filename: String,
    format: ImageFormat,
    jpeg_quality: u8,
    written: Vec<PathBuf>,
    status: WriterStatus,
}

impl ImageSequenceWriter {
    pub fn create(target: &WriterTarget) -> FramecastResult<Self> {
        let WriterKind::ImageSequence {
            format,
            base_filename,
            jpeg_quality,
        } = &target.kind
        else {
            return Err(FramecastError::writer_setup(format!(
                "image sequence writer cannot produce {:?}",
                target.kind
            )));
        };
        std::fs::create_dir_all(&target.output).map_err(|e| {
            FramecastError::writer_setup(format!(
                "cannot create {}: {e}",
                target.output.display()
            ))
        })?;
        Ok(Self {
            dir: target.output.clone(),
            base_filename: base_filename.clone(),
            format: *format,
            jpeg_quality: (*jpeg_quality).clamp(1, 100),
            written: Vec::new(),
            status: WriterStatus::Writing,
        })
    }

    /// Files written so far, in order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn write(&self, frame: &PixelBuffer, path: &Path) -> anyhow::Result<()> {
        let rgba = frame.to_rgba_image();
        match self.format {
            ImageFormat::Png => rgba.save_with_format(path, image::ImageFormat::Png)?,
            ImageFormat::Jpeg => {
                let rgb = image::DynamicImage::ImageRgba8(rgba).to_rgb8();
                let out = BufWriter::new(File::create(path)?);
                JpegEncoder::new_with_quality(out, self.jpeg_quality).encode_image(&rgb)?;
            }
        }
        Ok(())
    }
}

impl FrameWriter for ImageSequenceWriter {
    fn is_ready_for_more_data(&self) -> bool {
        true
    }

    fn append(&mut self, frame: PixelBuffer, pts: PresentationTime) -> FramecastResult<()> {
        if self.status != WriterStatus::Writing {
            return Err(FramecastError::encode_rejection(
                pts.frame_index,
                format!("writer is {:?}", self.status),
            ));
        }
        let path = self
            .dir
            .join(self.format.frame_file_name(&self.base_filename, pts.frame_index));
        if let Err(err) = self.write(&frame, &path) {
            self.status = WriterStatus::Failed;
            return Err(FramecastError::encode_rejection(
                pts.frame_index,
                format!("writing {}: {err}", path.display()),
            ));
        }
        self.written.push(path);
        Ok(())
    }

    fn finish(&mut self) -> FramecastResult<()> {
        if self.status != WriterStatus::Writing {
            return Err(FramecastError::writer_setup(format!(
                "cannot finish a writer that is {:?}",
                self.status
            )));
        }
        self.status = WriterStatus::Finished;
        tracing::info!(
            dir = %self.dir.display(),
            frames = self.written.len(),
            "Image sequence written"
        );
        Ok(())
    }

    fn cancel(&mut self) {
        if self.status == WriterStatus::Writing {
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
    use framecast_common::clock::FrameClock;

    fn target(dir: &std::path::Path, format: ImageFormat) -> WriterTarget {
        WriterTarget {
            output: dir.join("frames"),
            width: 4,
            height: 4,
            frame_rate: 24.0,
            kind: WriterKind::ImageSequence {
                format,
                base_filename: "shot".to_string(),
                jpeg_quality: 80,
            },
        }
    }

    #[test]
    fn test_png_sequence_naming() {
        let dir = tempfile::tempdir().unwrap();
        let target = target(dir.path(), ImageFormat::Png);
        let mut writer = ImageSequenceWriter::create(&target).unwrap();
        let clock = FrameClock::new(24.0);
        for i in 0..3 {
            writer
                .append(PixelBuffer::new(4, 4).unwrap(), clock.presentation_time(i))
                .unwrap();
        }
        writer.finish().unwrap();
        let names: Vec<_> = writer
            .written()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["shot_00000.png", "shot_00001.png", "shot_00002.png"]);
        assert!(target.output.join("shot_00002.png").is_file());
    }

    #[test]
    fn test_jpeg_frames_decode() {
        let dir = tempfile::tempdir().unwrap();
        let target = target(dir.path(), ImageFormat::Jpeg);
        let mut writer = ImageSequenceWriter::create(&target).unwrap();
        writer
            .append(
                PixelBuffer::new(4, 4).unwrap(),
                FrameClock::new(24.0).presentation_time(0),
            )
            .unwrap();
        let img = image::open(target.output.join("shot_00000.jpg")).unwrap();
        assert_eq!((img.width(), img.height()), (4, 4));
    }

    #[test]
    fn test_wrong_target_kind() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = target(dir.path(), ImageFormat::Png);
        t.kind = WriterKind::Gif;
        assert!(ImageSequenceWriter::create(&t).is_err());
    }
}
