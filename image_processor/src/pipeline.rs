// THEORY:
// The `pipeline` module is the synchronous, top-level API of the processor. It ties
// the buffer layer, the effect library, the geometric operations and the frame
// cache together behind one `ImageProcessor`, so that a host (or the animation
// controller) only deals in `PixelBuffer` values:
//
//   load (decode) -> process (copy, transform, re-encode) -> display or save
//
// Nothing here holds a "current" image. Buffers flow in and new buffers flow out;
// deciding which buffer is current is the controller's job.

use crate::animation::{MAX_SPEED, MIN_SPEED};
use crate::core_modules::effects::{DEFAULT_GRID_SIZE, EffectLibrary, EffectName};
use crate::core_modules::frame_cache::FrameCache;
use crate::core_modules::geometry::GeometricOp;
use crate::core_modules::pixel_buffer::PixelBuffer;
use crate::error::{ProcessorError, ProcessorResult};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Configuration for the ImageProcessor and the animation controller built on it.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Cell size, in pixels, of the checkered overlay.
    pub grid_size: u32,
    /// Animation speed a new session starts with (1..=10).
    pub initial_speed: u8,
    /// Effect selection a new session starts with.
    pub initial_effect: String,
    /// Directory of the last-image cache. `None` disables the cache.
    pub cache_dir: Option<PathBuf>,
    /// Capacity of the session event channel. Slow subscribers lag past this.
    pub event_capacity: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            initial_speed: MIN_SPEED,
            initial_effect: EffectName::FlipByteArray.label().to_string(),
            cache_dir: Some(FrameCache::default_dir()),
            event_capacity: 16,
        }
    }
}

impl ProcessorConfig {
    pub fn validate(&self) -> ProcessorResult<()> {
        if self.grid_size == 0 {
            return Err(ProcessorError::invalid_config("grid_size must be at least 1"));
        }
        if !(MIN_SPEED..=MAX_SPEED).contains(&self.initial_speed) {
            return Err(ProcessorError::invalid_config(format!(
                "initial_speed {} is outside {MIN_SPEED}..={MAX_SPEED}",
                self.initial_speed
            )));
        }
        if self.event_capacity == 0 {
            return Err(ProcessorError::invalid_config("event_capacity must be at least 1"));
        }
        Ok(())
    }
}

/// The main, top-level struct of the processor.
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    library: EffectLibrary,
    cache: Option<FrameCache>,
    config: ProcessorConfig,
}

impl ImageProcessor {
    pub fn new(config: ProcessorConfig) -> ProcessorResult<Self> {
        config.validate()?;
        Ok(Self {
            library: EffectLibrary::new(config.grid_size),
            cache: config.cache_dir.clone().map(FrameCache::new),
            config,
        })
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn library(&self) -> &EffectLibrary {
        &self.library
    }

    pub fn cache(&self) -> Option<&FrameCache> {
        self.cache.as_ref()
    }

    /// Decodes `path` and records it as the last loaded image.
    pub fn load_image(&self, path: impl AsRef<Path>) -> ProcessorResult<PixelBuffer> {
        let path = path.as_ref();
        let buffer = PixelBuffer::load(path)?;
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.write(path) {
                warn!(error = %err, "could not update frame cache");
            }
        }
        Ok(buffer)
    }

    /// Decodes an encoded image held in memory. The cache is left alone.
    pub fn load_bytes(&self, encoded: &[u8]) -> ProcessorResult<PixelBuffer> {
        PixelBuffer::load_bytes(encoded)
    }

    /// Loads the image named by the frame cache, if there is one and it still decodes.
    pub fn restore_last_image(&self) -> Option<(PathBuf, PixelBuffer)> {
        let path = self.cache.as_ref()?.restorable()?;
        match PixelBuffer::load(&path) {
            Ok(buffer) => {
                info!(path = %path.display(), "restored last image");
                Some((path, buffer))
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cached image could not be restored");
                None
            }
        }
    }

    /// Runs the selected effect on a copy of `buffer`.
    #[tracing::instrument(level = "debug", skip(self, buffer), fields(width = buffer.width(), height = buffer.height()))]
    pub fn process_image(&self, buffer: &PixelBuffer, effect: &str) -> ProcessorResult<PixelBuffer> {
        self.library.apply(buffer, effect)
    }

    pub fn apply_geometry(&self, buffer: &PixelBuffer, op: GeometricOp) -> ProcessorResult<PixelBuffer> {
        op.apply(buffer)
    }

    pub fn save_image(&self, buffer: &PixelBuffer, path: impl AsRef<Path>) -> ProcessorResult<()> {
        let path = path.as_ref();
        buffer.save(path)?;
        info!(path = %path.display(), "image saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::pixel_buffer::PixelFormat;

    fn processor_in(dir: &Path) -> ImageProcessor {
        ImageProcessor::new(ProcessorConfig {
            cache_dir: Some(dir.join("cache")),
            ..ProcessorConfig::default()
        })
        .unwrap()
    }

    fn tiny() -> PixelBuffer {
        PixelBuffer::from_raw(vec![10, 20, 30, 255, 40, 50, 60, 255], 2, 1, PixelFormat::BGRA32).unwrap()
    }

    #[test]
    fn default_config_is_valid() {
        let config = ProcessorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grid_size, 64);
        assert_eq!(config.initial_speed, 1);
        assert_eq!(config.initial_effect, "1. Flip Byte Array");
    }

    #[test]
    fn invalid_config_is_rejected() {
        for config in [
            ProcessorConfig { grid_size: 0, ..ProcessorConfig::default() },
            ProcessorConfig { initial_speed: 0, ..ProcessorConfig::default() },
            ProcessorConfig { initial_speed: 11, ..ProcessorConfig::default() },
            ProcessorConfig { event_capacity: 0, ..ProcessorConfig::default() },
        ] {
            assert!(matches!(ImageProcessor::new(config), Err(ProcessorError::InvalidConfig(_))));
        }
    }

    #[test]
    fn loading_records_the_path_and_restoring_reads_it_back() {
        let dir = tempfile::tempdir().unwrap();
        let processor = processor_in(dir.path());
        let image_path = dir.path().join("tiny.png");
        tiny().save(&image_path).unwrap();

        assert!(processor.restore_last_image().is_none());
        let loaded = processor.load_image(&image_path).unwrap();
        assert_eq!(loaded, tiny());

        let (path, restored) = processor.restore_last_image().unwrap();
        assert_eq!(path, image_path);
        assert_eq!(restored, tiny());
    }

    #[test]
    fn failed_loads_leave_the_cache_alone() {
        let dir = tempfile::tempdir().unwrap();
        let processor = processor_in(dir.path());
        let bogus = dir.path().join("bogus.png");
        std::fs::write(&bogus, b"not a png").unwrap();

        assert!(matches!(processor.load_image(&bogus), Err(ProcessorError::InvalidImage(_))));
        assert_eq!(processor.cache().unwrap().read().unwrap(), None);
    }

    #[test]
    fn unreadable_cached_image_is_not_restored() {
        let dir = tempfile::tempdir().unwrap();
        let processor = processor_in(dir.path());
        let bogus = dir.path().join("bogus.png");
        std::fs::write(&bogus, b"not a png").unwrap();
        processor.cache().unwrap().write(&bogus).unwrap();

        assert!(processor.restore_last_image().is_none());
    }

    #[test]
    fn disabled_cache_never_restores() {
        let processor = ImageProcessor::new(ProcessorConfig {
            cache_dir: None,
            ..ProcessorConfig::default()
        })
        .unwrap();
        assert!(processor.cache().is_none());
        assert!(processor.restore_last_image().is_none());
    }

    #[test]
    fn process_image_leaves_the_input_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let processor = processor_in(dir.path());
        let source = tiny();

        let inverted = processor.process_image(&source, "2. Invert Colours").unwrap();
        assert_eq!(inverted.bytes(), &[245, 235, 225, 0, 215, 205, 195, 0]);
        assert_eq!(source, tiny());
        assert!(matches!(
            processor.process_image(&source, "nope"),
            Err(ProcessorError::UnknownEffect(_))
        ));
    }

    #[test]
    fn geometry_goes_through_the_processor() {
        let dir = tempfile::tempdir().unwrap();
        let processor = processor_in(dir.path());
        let mirrored = processor.apply_geometry(&tiny(), GeometricOp::MirrorHorizontally).unwrap();
        assert_eq!(mirrored.bytes(), &[40, 50, 60, 255, 10, 20, 30, 255]);
        assert!(processor.apply_geometry(&tiny(), GeometricOp::Rotate).is_err());
    }
}
