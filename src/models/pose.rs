// Data models for animal pose estimation results

use serde::{Serialize, Serializer};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

// ==============================================================================
// Joint Names (open vocabulary)
// ==============================================================================

/// Model-defined joint identifier, e.g. "left_front_paw"
///
/// Names are opaque strings so a model can extend its vocabulary without a
/// matching change here. Cloning shares the underlying allocation, which is
/// what [`crate::core::pose_detector::JointNameInterner`] relies on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointName(Arc<str>);

impl JointName {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether two names share one allocation
    pub fn ptr_eq(&self, other: &JointName) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Borrow<str> for JointName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for JointName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

// ==============================================================================
// Published Joints
// ==============================================================================

/// 2D point in normalized image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point2D {
    pub x: f32,
    pub y: f32,
}

/// One localized joint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JointRecord {
    pub name: JointName,
    pub position: Point2D,
    pub confidence: f32, // [0, 1]
}

impl JointRecord {
    /// Build a record, clamping `confidence` into [0, 1]
    pub fn new(name: JointName, x: f32, y: f32, confidence: f32) -> Self {
        Self {
            name,
            position: Point2D { x, y },
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Joints of one detected subject, keyed by name. Empty means nothing was detected.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PoseObservation {
    joints: HashMap<JointName, JointRecord>,
}

impl PoseObservation {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    /// Insert a joint, replacing any previous record with the same name
    pub fn insert(&mut self, record: JointRecord) {
        self.joints.insert(record.name.clone(), record);
    }

    pub fn get(&self, name: &str) -> Option<&JointRecord> {
        self.joints.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.joints.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &JointRecord> {
        self.joints.values()
    }

    /// Joints ordered by name, the order the display lists them in
    pub fn sorted(&self) -> Vec<&JointRecord> {
        let mut records: Vec<&JointRecord> = self.joints.values().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }
}

impl FromIterator<JointRecord> for PoseObservation {
    fn from_iter<I: IntoIterator<Item = JointRecord>>(iter: I) -> Self {
        let mut observation = Self::default();
        for record in iter {
            observation.insert(record);
        }
        observation
    }
}

// ==============================================================================
// Raw Model Output
// ==============================================================================

/// A point as reported by the pose model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecognizedPoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

impl RecognizedPoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    /// A point counts as localized when its coordinates are finite and the
    /// model gave it some confidence
    pub fn is_localized(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.confidence.is_finite() && self.confidence > 0.0
    }
}

/// One subject found by the pose model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectedSubject {
    pub confidence: f32,
    pub joints: HashMap<String, RecognizedPoint>,
}

impl DetectedSubject {
    pub fn with_joints<I, S>(confidence: f32, joints: I) -> Self
    where
        I: IntoIterator<Item = (S, RecognizedPoint)>,
        S: Into<String>,
    {
        Self {
            confidence,
            joints: joints.into_iter().map(|(name, p)| (name.into(), p)).collect(),
        }
    }
}

// ==============================================================================
// Configuration
// ==============================================================================

/// Joint vocabulary of the 17-keypoint animal models (AP-10K layout)
pub const ANIMAL_JOINTS: [&str; 17] = [
    "left_eye",
    "right_eye",
    "nose",
    "neck",
    "root_of_tail",
    "left_shoulder",
    "left_elbow",
    "left_front_paw",
    "right_shoulder",
    "right_elbow",
    "right_front_paw",
    "left_hip",
    "left_knee",
    "left_back_paw",
    "right_hip",
    "right_knee",
    "right_back_paw",
];

#[derive(Debug, Clone, PartialEq)]
pub struct PoseConfig {
    pub model_path: Option<PathBuf>,
    pub input_width: u32,            // Model input size (default: 256x256)
    pub input_height: u32,
    pub joint_names: Vec<String>,    // Heatmap channel order
    pub min_joint_confidence: f32,   // Joints below this are dropped (default: 0.0)
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            input_width: 256,
            input_height: 256,
            joint_names: ANIMAL_JOINTS.iter().map(|s| s.to_string()).collect(),
            min_joint_confidence: 0.0,
        }
    }
}

// ==============================================================================
// Error Types
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PoseError {
    #[error("Pose detection not initialized")]
    NotInitialized,

    #[error("Model loading failed: {0}")]
    ModelLoadFailed(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not supported on this platform")]
    NotSupported,
}

pub type PoseResult<T> = Result<T, PoseError>;
