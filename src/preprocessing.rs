// src/preprocessing.rs

use crate::error::PipelineError;
use crate::types::{Frame, ModelConfig, Normalization};

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Shape descriptor for a classifier input, batch dimension excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorShape {
    pub channels: usize,
    /// Temporal depth for sequence-mode inputs; `None` in single-frame mode.
    pub temporal: Option<usize>,
    pub height: usize,
    pub width: usize,
}

impl TensorShape {
    pub fn from_model(config: &ModelConfig) -> Self {
        Self {
            channels: 3,
            temporal: (config.frames_per_unit > 1).then_some(config.frames_per_unit),
            height: config.input_height,
            width: config.input_width,
        }
    }

    pub fn element_count(&self) -> usize {
        self.channels * self.temporal.unwrap_or(1) * self.height * self.width
    }

    /// Dimensions with a leading batch of 1, as the runtime expects them.
    pub fn batched_dims(&self) -> Vec<i64> {
        let mut dims = vec![1i64, self.channels as i64];
        if let Some(t) = self.temporal {
            dims.push(t as i64);
        }
        dims.push(self.height as i64);
        dims.push(self.width as i64);
        dims
    }
}

/// A flat f32 buffer plus its shape. Invariant: `data.len() == shape.element_count()`.
#[derive(Debug, Clone)]
pub struct Tensor {
    pub data: Vec<f32>,
    pub shape: TensorShape,
}

/// Build the classifier input for one sampling unit.
///
/// Frames are resized first, then normalized per the configured scheme.
/// Sequence layout is channel-major, then temporal, then spatial
/// ([C, T, H, W]); short units are padded by repeating the last frame.
pub fn build_tensor(frames: &[Frame], config: &ModelConfig) -> Result<Tensor, PipelineError> {
    if frames.is_empty() {
        return Err(PipelineError::TensorShapeMismatch(
            "no frames in sampling unit".to_string(),
        ));
    }

    let shape = TensorShape::from_model(config);
    let (w, h) = (shape.width, shape.height);
    let temporal = shape.temporal.unwrap_or(1);
    let frame_size = h * w;
    let channel_size = temporal * frame_size;

    let mut data = vec![0.0f32; shape.element_count()];

    for t in 0..temporal {
        // Repeat the last available frame when the unit came up short.
        let frame = frames.get(t).unwrap_or_else(|| frames.last().unwrap());
        let resized = resize_bilinear(&frame.data, frame.width, frame.height, w, h);

        for p in 0..frame_size {
            for c in 0..3 {
                let px = resized[p * 3 + c] as f32 / 255.0;
                let value = match config.normalization {
                    Normalization::Imagenet => (px - IMAGENET_MEAN[c]) / IMAGENET_STD[c],
                    Normalization::Symmetric => 1.0 - 2.0 * px,
                };
                data[c * channel_size + t * frame_size + p] = value;
            }
        }
    }

    Ok(Tensor { data, shape })
}

/// Bilinear image resize over packed RGB24.
fn resize_bilinear(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];

    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sy = dy as f32 * y_ratio;

            let sx0 = sx.floor() as usize;
            let sy0 = sy.floor() as usize;
            let sx1 = (sx0 + 1).min(src_w - 1);
            let sy1 = (sy0 + 1).min(src_h - 1);

            let fx = sx - sx0 as f32;
            let fy = sy - sy0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round() as u8;
            }
        }
    }

    dst
}
