pub mod blob_extractor;
pub mod detection;
pub mod heatmap;
pub mod motion_segmenter;
#[cfg(feature = "opencv")]
pub mod opencv_backend;
pub mod rotation;
pub mod track_state;
pub mod zone;
pub mod zone_resolver;
