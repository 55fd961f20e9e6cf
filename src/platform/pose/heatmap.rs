// Pre- and post-processing for heatmap keypoint models
//
// Input is an ImageNet-normalized NCHW float tensor; output is one heatmap
// per joint, decoded by arg-max into normalized (x, y) with origin top-left.

use crate::core::pixel_buffer::DeviceImageBuffer;
use crate::models::pose::{DetectedSubject, PoseError, PoseResult, RecognizedPoint};

pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Resample an ARGB32 buffer to `width` x `height` (nearest neighbour) as a
/// normalized `[1, 3, height, width]` tensor
pub fn to_nchw(buffer: &DeviceImageBuffer, width: u32, height: u32) -> PoseResult<Vec<f32>> {
    if width == 0 || height == 0 {
        return Err(PoseError::InvalidInput(format!(
            "Model input size {}x{} is empty",
            width, height
        )));
    }

    let plane = width as usize * height as usize;
    let mut tensor = vec![0.0f32; plane * 3];

    for y in 0..height {
        let src_y = (y as u64 * buffer.height() as u64 / height as u64) as u32;
        let row = buffer
            .row(src_y)
            .ok_or_else(|| PoseError::InvalidInput(format!("Row {} out of range", src_y)))?;

        for x in 0..width {
            let src_x = (x as u64 * buffer.width() as u64 / width as u64) as usize;
            let px = &row[src_x * 4..src_x * 4 + 4];
            let offset = y as usize * width as usize + x as usize;
            for c in 0..3 {
                // px[0] is alpha
                let value = px[c + 1] as f32 / 255.0;
                tensor[c * plane + offset] = (value - MEAN[c]) / STD[c];
            }
        }
    }

    Ok(tensor)
}

/// Decode `[channels, rows, cols]` heatmaps into one subject
///
/// Channel `k` is named `names[k]`, or `joint_{k}` past the end of `names`.
/// Peak values become confidences, clamped to [0, 1].
pub fn decode(
    heatmaps: &[f32],
    channels: usize,
    rows: usize,
    cols: usize,
    names: &[String],
) -> PoseResult<DetectedSubject> {
    let bad_shape = || {
        PoseError::InferenceFailed(format!(
            "Heatmap output has {} values, expected {}x{}x{}",
            heatmaps.len(),
            channels,
            rows,
            cols
        ))
    };

    let plane = rows.checked_mul(cols).filter(|plane| *plane > 0).ok_or_else(bad_shape)?;
    let expected = channels.checked_mul(plane).ok_or_else(bad_shape)?;
    if heatmaps.len() != expected {
        return Err(bad_shape());
    }

    let mut subject = DetectedSubject::default();
    let mut total = 0.0f32;

    for (k, map) in heatmaps.chunks_exact(plane).enumerate() {
        let (peak, value) = map
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .fold((0usize, f32::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best });
        if !value.is_finite() {
            continue;
        }

        let confidence = value.clamp(0.0, 1.0);
        let x = ((peak % cols) as f32 + 0.5) / cols as f32;
        let y = ((peak / cols) as f32 + 0.5) / rows as f32;

        let name = names
            .get(k)
            .cloned()
            .unwrap_or_else(|| format!("joint_{}", k));
        subject.joints.insert(name, RecognizedPoint::new(x, y, confidence));
        total += confidence;
    }

    if channels > 0 {
        subject.confidence = total / channels as f32;
    }

    Ok(subject)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pixel_buffer::convert;
    use crate::models::frame::RawImage;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_decode_peaks() {
        // 2 channels of 2x3
        let heatmaps = [
            0.0, 0.1, 0.0, //
            0.0, 0.0, 0.9, //
            0.7, 0.0, 0.0, //
            0.0, 0.0, 0.0,
        ];
        let subject = decode(&heatmaps, 2, 2, 3, &names(&["nose", "neck"])).unwrap();

        let nose = subject.joints["nose"];
        assert!((nose.x - 2.5 / 3.0).abs() < 1e-6);
        assert!((nose.y - 0.75).abs() < 1e-6);
        assert!((nose.confidence - 0.9).abs() < 1e-6);

        let neck = subject.joints["neck"];
        assert!((neck.x - 0.5 / 3.0).abs() < 1e-6);
        assert!((neck.y - 0.25).abs() < 1e-6);
        assert!((subject.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_decode_names_extra_channels() {
        let subject = decode(&[0.5, 0.2], 2, 1, 1, &names(&["nose"])).unwrap();
        assert!(subject.joints.contains_key("nose"));
        assert!(subject.joints.contains_key("joint_1"));
    }

    #[test]
    fn test_decode_rejects_bad_shape() {
        assert!(decode(&[0.0; 5], 2, 1, 3, &[]).is_err());
        assert!(decode(&[], 1, 0, 3, &[]).is_err());
    }

    #[test]
    fn test_decode_rejects_overflowing_shape() {
        assert!(matches!(
            decode(&[0.0; 4], 1, usize::MAX, 2, &[]),
            Err(PoseError::InferenceFailed(_))
        ));
        assert!(matches!(
            decode(&[0.0; 4], usize::MAX, 2, 2, &[]),
            Err(PoseError::InferenceFailed(_))
        ));
    }

    #[test]
    fn test_to_nchw_layout() {
        let image = RawImage::from_rgba8(2, 1, vec![255, 0, 0, 255, 0, 0, 255, 255]).unwrap();
        let buffer = convert(&image).unwrap();
        let tensor = to_nchw(&buffer, 2, 1).unwrap();

        assert_eq!(tensor.len(), 6);
        // red plane: left pixel red, right pixel not
        assert!((tensor[0] - (1.0 - MEAN[0]) / STD[0]).abs() < 1e-5);
        assert!((tensor[1] - (0.0 - MEAN[0]) / STD[0]).abs() < 1e-5);
        // blue plane
        assert!((tensor[5] - (1.0 - MEAN[2]) / STD[2]).abs() < 1e-5);
    }

    #[test]
    fn test_to_nchw_resamples() {
        let image = RawImage::from_rgba8(4, 4, vec![128; 64]).unwrap();
        let buffer = convert(&image).unwrap();
        let tensor = to_nchw(&buffer, 8, 2).unwrap();
        assert_eq!(tensor.len(), 3 * 8 * 2);
        assert!(to_nchw(&buffer, 0, 2).is_err());
    }
}
