pub mod annotation;
pub mod color_segmenter;
pub mod compositor;
pub mod detection;
pub mod frame_source;
pub mod hsv;
pub mod object_locator;
pub mod trail;
