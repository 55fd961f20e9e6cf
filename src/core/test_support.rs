// Fakes shared by unit tests

use crate::core::image_acquisition::ImageSource;
use crate::core::pixel_buffer::DeviceImageBuffer;
use crate::models::frame::{AcquisitionError, AcquisitionResult, CorpusIndex, RawImage};
use crate::models::pipeline::TickResult;
use crate::models::pose::{
    DetectedSubject, JointName, JointRecord, PoseConfig, PoseObservation, PoseResult,
    RecognizedPoint,
};
use crate::platform::pose::PoseModel;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 2x2 image whose pixels encode `index`
pub fn index_image(index: u32) -> RawImage {
    let shade = (index % 256) as u8;
    RawImage::from_rgba8(2, 2, [shade, shade, shade, 255].repeat(4)).unwrap()
}

pub fn fake_tick(sequence: u64, index: u32) -> TickResult {
    let observation: PoseObservation =
        std::iter::once(JointRecord::new(JointName::new("nose"), 0.5, 0.5, 0.9)).collect();

    TickResult {
        sequence,
        index: CorpusIndex(index),
        url: format!("fake://{}.jpg", index),
        image: Arc::new(index_image(index)),
        observation,
        completed_at: 1_700_000_000_000 + sequence as i64,
    }
}

/// In-memory corpus
#[derive(Default)]
pub struct FakeCorpus {
    failing: HashSet<u32>,
    empty: HashSet<u32>,
}

impl FakeCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indices whose fetch fails
    pub fn failing(mut self, indices: &[u32]) -> Self {
        self.failing.extend(indices);
        self
    }

    /// Indices that decode to a 0x0 image
    pub fn empty_images(mut self, indices: &[u32]) -> Self {
        self.empty.extend(indices);
        self
    }
}

#[async_trait]
impl ImageSource for FakeCorpus {
    fn url_for(&self, index: CorpusIndex) -> String {
        format!("fake://{}.jpg", index)
    }

    async fn fetch(&self, index: CorpusIndex) -> AcquisitionResult<RawImage> {
        if self.failing.contains(&index.get()) {
            return Err(AcquisitionError::Status {
                status: 404,
                url: self.url_for(index),
            });
        }
        if self.empty.contains(&index.get()) {
            return Ok(RawImage {
                width: 0,
                height: 0,
                data: vec![],
                format: crate::models::frame::PixelFormat::RGBA8,
            });
        }
        Ok(index_image(index.get()))
    }
}

/// Corpus whose fetches take `delay`, counting how many overlap
pub struct SlowCorpus {
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowCorpus {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Most fetches ever running at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSource for SlowCorpus {
    fn url_for(&self, index: CorpusIndex) -> String {
        format!("slow://{}.jpg", index)
    }

    async fn fetch(&self, index: CorpusIndex) -> AcquisitionResult<RawImage> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(index_image(index.get()))
    }
}

/// Always finds one subject with a nose
pub struct FixedModel;

impl PoseModel for FixedModel {
    fn new(_config: &PoseConfig) -> PoseResult<Self> {
        Ok(Self)
    }

    fn detect(&self, _buffer: &DeviceImageBuffer) -> PoseResult<Vec<DetectedSubject>> {
        Ok(vec![DetectedSubject::with_joints(
            0.9,
            [("nose", RecognizedPoint::new(0.5, 0.5, 0.9))],
        )])
    }

    fn is_initialized(&self) -> bool {
        true
    }

    fn get_model_info(&self) -> String {
        "fixed".to_string()
    }
}
