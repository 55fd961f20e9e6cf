// Pose estimation platform integration
// Provides the pose model bridge and heatmap decoding helpers

pub mod heatmap;
pub mod model_bridge;

pub use model_bridge::{DefaultPoseModel, PoseModel};

#[cfg(not(feature = "ml-onnx"))]
pub use model_bridge::DummyPoseModel;

#[cfg(feature = "ml-onnx")]
pub use model_bridge::onnx_backend::OnnxPoseModel;
