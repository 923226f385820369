pub mod effects;
pub mod frame_cache;
pub mod geometry;
pub mod pixel;
pub mod pixel_buffer;
