// Pose model bridge
// Abstraction over the external animal pose estimator
// Implemented natively with ONNX Runtime, or as a no-op when no backend is enabled

use crate::core::pixel_buffer::DeviceImageBuffer;
use crate::models::pose::{DetectedSubject, PoseConfig, PoseResult};

/// Pose model bridge trait
/// Implement this for each inference backend
pub trait PoseModel: Send + Sync {
    /// Load the model
    fn new(config: &PoseConfig) -> PoseResult<Self>
    where
        Self: Sized;

    /// Run one pose request on a frame; subjects are ordered as the model reports them
    fn detect(&self, buffer: &DeviceImageBuffer) -> PoseResult<Vec<DetectedSubject>>;

    /// Check if the model is loaded
    fn is_initialized(&self) -> bool;

    /// Get model info
    fn get_model_info(&self) -> String;
}

// ==============================================================================
// ONNX Runtime Implementation (Pure Rust)
// ==============================================================================

#[cfg(feature = "ml-onnx")]
pub mod onnx_backend {
    use super::*;
    use crate::models::pose::PoseError;
    use crate::platform::pose::heatmap;
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::Tensor;
    use std::sync::Mutex;
    use tracing::info;

    /// Single-subject heatmap keypoint model (AP-10K style)
    pub struct OnnxPoseModel {
        session: Mutex<Session>,
        config: PoseConfig,
    }

    impl PoseModel for OnnxPoseModel {
        fn new(config: &PoseConfig) -> PoseResult<Self> {
            let model_path = config.model_path.as_ref().ok_or_else(|| {
                PoseError::ModelLoadFailed("No model path configured".to_string())
            })?;

            let load_failed =
                |e: String| PoseError::ModelLoadFailed(format!("{}: {}", model_path.display(), e));

            let session = Session::builder()
                .map_err(|e| load_failed(e.to_string()))?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| load_failed(e.to_string()))?
                .commit_from_file(model_path)
                .map_err(|e| load_failed(e.to_string()))?;

            info!(model = %model_path.display(), "ONNX pose model loaded");

            Ok(Self {
                session: Mutex::new(session),
                config: config.clone(),
            })
        }

        fn detect(&self, buffer: &DeviceImageBuffer) -> PoseResult<Vec<DetectedSubject>> {
            let width = self.config.input_width;
            let height = self.config.input_height;
            let input = heatmap::to_nchw(buffer, width, height)?;

            let tensor = Tensor::from_array(([1usize, 3, height as usize, width as usize], input))
                .map_err(|e| PoseError::InvalidInput(e.to_string()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| PoseError::InferenceFailed("Session lock poisoned".to_string()))?;

            let outputs = session
                .run(ort::inputs![tensor])
                .map_err(|e| PoseError::InferenceFailed(e.to_string()))?;

            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| PoseError::InferenceFailed(e.to_string()))?;

            // Expect [1, joints, rows, cols]
            let dims: Vec<usize> = shape.iter().map(|d| (*d).max(0) as usize).collect();
            let [_, channels, rows, cols] = dims[..] else {
                return Err(PoseError::InferenceFailed(format!(
                    "Unexpected output shape {:?}",
                    dims
                )));
            };

            let subject = heatmap::decode(data, channels, rows, cols, &self.config.joint_names)?;
            Ok(vec![subject])
        }

        fn is_initialized(&self) -> bool {
            true
        }

        fn get_model_info(&self) -> String {
            format!(
                "ONNX Runtime pose model ({}x{} input, {} joints)",
                self.config.input_width,
                self.config.input_height,
                self.config.joint_names.len()
            )
        }
    }
}

// ==============================================================================
// Dummy Implementation (for compilation without features)
// ==============================================================================

#[cfg(not(feature = "ml-onnx"))]
pub struct DummyPoseModel {
    config: PoseConfig,
}

#[cfg(not(feature = "ml-onnx"))]
impl PoseModel for DummyPoseModel {
    fn new(config: &PoseConfig) -> PoseResult<Self> {
        tracing::warn!("Using dummy pose model (no inference); enable 'ml-onnx' for actual detection");
        Ok(Self {
            config: config.clone(),
        })
    }

    fn detect(&self, _buffer: &DeviceImageBuffer) -> PoseResult<Vec<DetectedSubject>> {
        Ok(vec![])
    }

    fn is_initialized(&self) -> bool {
        false
    }

    fn get_model_info(&self) -> String {
        format!(
            "Dummy pose model (no ML inference, {} joint vocabulary) - enable 'ml-onnx' feature",
            self.config.joint_names.len()
        )
    }
}

// ==============================================================================
// Default Backend Selection
// ==============================================================================

#[cfg(feature = "ml-onnx")]
pub type DefaultPoseModel = onnx_backend::OnnxPoseModel;

#[cfg(not(feature = "ml-onnx"))]
pub type DefaultPoseModel = DummyPoseModel;
