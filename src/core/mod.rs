pub mod config;
pub mod image_acquisition;
pub mod pixel_buffer;
pub mod scheduler;
pub mod pipeline;

// Pose estimation and model assets
pub mod pose_detector;
pub mod ml_models;

#[cfg(test)]
pub(crate) mod test_support;
