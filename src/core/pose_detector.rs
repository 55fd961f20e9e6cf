use crate::core::pixel_buffer::DeviceImageBuffer;
use crate::models::pose::{
    DetectedSubject, JointName, JointRecord, PoseError, PoseObservation, PoseResult,
};
use crate::platform::pose::PoseModel;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, warn};

// ==============================================================================
// Joint Name Interning
// ==============================================================================

/// Keeps one shared allocation per joint name seen from the model
#[derive(Default)]
pub struct JointNameInterner {
    names: Mutex<HashSet<JointName>>,
}

impl JointNameInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, name: &str) -> JointName {
        let mut names = self.names.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = names.get(name) {
            return existing.clone();
        }
        let interned = JointName::new(name);
        names.insert(interned.clone());
        interned
    }

    pub fn len(&self) -> usize {
        self.names.lock().map(|n| n.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ==============================================================================
// Pose Detector
// ==============================================================================

/// Runs the pose model on device buffers and turns its output into joint maps
pub struct PoseDetector {
    model: Arc<dyn PoseModel>,
    names: JointNameInterner,
    min_joint_confidence: f32,
}

impl PoseDetector {
    pub fn new(model: Arc<dyn PoseModel>, min_joint_confidence: f32) -> Self {
        Self {
            model,
            names: JointNameInterner::new(),
            min_joint_confidence: min_joint_confidence.clamp(0.0, 1.0),
        }
    }

    pub fn model_info(&self) -> String {
        self.model.get_model_info()
    }

    /// Detect the pose in `buffer`
    ///
    /// Never fails: a model error or an image without subjects yields an
    /// empty observation. The buffer is consumed by the request.
    pub async fn detect(&self, buffer: DeviceImageBuffer) -> PoseObservation {
        match self.run_model(buffer).await {
            Ok(subjects) => self.observation_from(subjects),
            Err(e) => {
                warn!("Pose detection failed: {}", e);
                PoseObservation::empty()
            }
        }
    }

    /// One pose request, off the async runtime
    pub async fn run_model(&self, buffer: DeviceImageBuffer) -> PoseResult<Vec<DetectedSubject>> {
        let model = self.model.clone();
        let start_time = Instant::now();

        let subjects = tokio::task::spawn_blocking(move || model.detect(&buffer))
            .await
            .map_err(|e| PoseError::InferenceFailed(format!("Inference task failed: {}", e)))??;

        debug!(
            subjects = subjects.len(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Pose request finished"
        );
        Ok(subjects)
    }

    /// Joint map of the first subject; later subjects are ignored
    pub fn observation_from(&self, subjects: Vec<DetectedSubject>) -> PoseObservation {
        let Some(subject) = subjects.into_iter().next() else {
            return PoseObservation::empty();
        };

        subject
            .joints
            .iter()
            .filter(|(_, point)| point.is_localized())
            .filter(|(_, point)| point.confidence >= self.min_joint_confidence)
            .map(|(name, point)| {
                JointRecord::new(self.names.intern(name), point.x, point.y, point.confidence)
            })
            .collect()
    }
}
