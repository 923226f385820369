// THEORY:
// This file is the main entry point for the `image_processor` library crate.
// It exposes the pixel-buffer effect pipeline (`ImageProcessor`) and the animation
// scheduler built on top of it (`AnimationController`) as the public API. Hosts
// (a GUI, or the `effect_tester` command-line harness) issue commands and render
// whatever buffers the core hands back; decoding files, picking files and drawing
// pixels stay on the host side of that boundary.

pub mod animation;
pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use animation::{AnimationController, AnimationSpeed, AnimationState, ControllerStatus, FrameSource, SessionEvent};
pub use core_modules::effects::{EffectLibrary, EffectName};
pub use core_modules::frame_cache::FrameCache;
pub use core_modules::geometry::GeometricOp;
pub use core_modules::pixel_buffer::{BufferGeometry, PixelBuffer, PixelFormat};
pub use error::{ProcessorError, ProcessorResult};
pub use pipeline::{ImageProcessor, ProcessorConfig};
