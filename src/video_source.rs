// src/video_source.rs

use crate::error::PipelineError;
use crate::types::{Frame, ModelConfig, SamplingConfig};
use anyhow::Result;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::path::Path;
use tracing::{debug, info, warn};

/// One inference input: `frames_per_unit` decoded frames starting at `start_ms`.
#[derive(Debug, Clone)]
pub struct SamplingUnit {
    pub frames: Vec<Frame>,
    pub start_ms: i64,
}

/// Source of decoded frames at arbitrary time offsets. Seam between unit
/// extraction and the decoder backend, so sampling is testable without video
/// files.
pub trait FrameProvider {
    fn duration_ms(&self) -> i64;
    fn frame_at(&mut self, time_ms: i64) -> Result<Option<Frame>>;
}

/// An opened video resource. The underlying capture is released on drop, on
/// every exit path.
pub struct VideoHandle {
    cap: VideoCapture,
    duration_ms: i64,
}

impl VideoHandle {
    /// Open a video and read its metadata. A missing or empty file is fatal;
    /// missing duration metadata is not — the configured default is
    /// substituted and the run proceeds.
    pub fn open(path: &Path, default_duration_ms: i64) -> Result<Self, PipelineError> {
        let display = path.display().to_string();

        if !path.exists() {
            return Err(PipelineError::VideoNotFound(display));
        }
        let file_len = std::fs::metadata(path)
            .map_err(|e| PipelineError::VideoOpen(format!("{}: {}", display, e)))?
            .len();
        if file_len == 0 {
            return Err(PipelineError::VideoEmpty(display));
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| PipelineError::VideoOpen(format!("non-utf8 path: {}", display)))?;
        let cap = VideoCapture::from_file(path_str, videoio::CAP_ANY)
            .map_err(|e| PipelineError::VideoOpen(format!("{}: {}", display, e)))?;
        if !cap
            .is_opened()
            .map_err(|e| PipelineError::VideoOpen(format!("{}: {}", display, e)))?
        {
            return Err(PipelineError::VideoOpen(display));
        }

        let fps = cap.get(videoio::CAP_PROP_FPS).unwrap_or(0.0);
        let total_frames = cap.get(videoio::CAP_PROP_FRAME_COUNT).unwrap_or(0.0);
        let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(0.0) as usize;
        let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0) as usize;

        let duration_ms = if fps > 0.0 && total_frames > 0.0 {
            (total_frames / fps * 1000.0) as i64
        } else {
            warn!(
                "duration metadata unavailable for {}, assuming {}ms",
                display, default_duration_ms
            );
            default_duration_ms
        };

        info!(
            "Video opened: {}x{} @ {:.1} FPS, {}ms",
            width, height, fps, duration_ms
        );

        Ok(Self { cap, duration_ms })
    }
}

impl FrameProvider for VideoHandle {
    fn duration_ms(&self) -> i64 {
        self.duration_ms
    }

    fn frame_at(&mut self, time_ms: i64) -> Result<Option<Frame>> {
        self.cap.set(videoio::CAP_PROP_POS_MSEC, time_ms as f64)?;

        let mut mat = Mat::default();
        if !self.cap.read(&mut mat)? || mat.empty() {
            return Ok(None);
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color(&mat, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

        Ok(Some(Frame {
            data: rgb.data_bytes()?.to_vec(),
            width: rgb.cols() as usize,
            height: rgb.rows() as usize,
            timestamp_ms: time_ms as f64,
        }))
    }
}

/// Unit start offsets for a video of `duration_ms`, as a pure function of the
/// sampling configuration.
///
/// Sequence mode fits whole units: `t + unit_duration <= duration`. In
/// single-frame mode the stride alone sets the cadence and the unit duration
/// is ignored.
pub fn unit_offsets(duration_ms: i64, sampling: &SamplingConfig, frames_per_unit: usize) -> Vec<i64> {
    let mut offsets = Vec::new();
    let mut t = 0i64;
    if frames_per_unit == 1 {
        while t < duration_ms {
            offsets.push(t);
            t += sampling.stride_ms;
        }
    } else {
        while t + sampling.unit_duration_ms <= duration_ms {
            offsets.push(t);
            t += sampling.stride_ms;
        }
    }
    offsets
}

/// Frame timestamps within one unit: `frames_per_unit` offsets evenly spaced
/// across `[start, start + unit_duration)`.
fn frame_times(start_ms: i64, sampling: &SamplingConfig, frames_per_unit: usize) -> Vec<i64> {
    if frames_per_unit == 1 {
        return vec![start_ms];
    }
    let interval = sampling.unit_duration_ms / frames_per_unit as i64;
    (0..frames_per_unit as i64)
        .map(|i| start_ms + i * interval)
        .collect()
}

/// Lazy, finite sequence of complete sampling units.
///
/// A unit is emitted only when every planned frame decoded; partial units
/// are dropped and do not appear downstream. Individual decode failures are
/// logged and never abort extraction.
pub struct UnitIter<'a, P: FrameProvider + ?Sized> {
    provider: &'a mut P,
    sampling: SamplingConfig,
    frames_per_unit: usize,
    offsets: Vec<i64>,
    next_offset: usize,
}

impl<'a, P: FrameProvider + ?Sized> UnitIter<'a, P> {
    pub fn new(provider: &'a mut P, sampling: &SamplingConfig, model: &ModelConfig) -> Self {
        let offsets = unit_offsets(provider.duration_ms(), sampling, model.frames_per_unit);
        Self {
            provider,
            sampling: sampling.clone(),
            frames_per_unit: model.frames_per_unit,
            offsets,
            next_offset: 0,
        }
    }

    /// (offsets attempted, offsets planned) — drives progress reporting.
    pub fn position(&self) -> (usize, usize) {
        (self.next_offset, self.offsets.len())
    }

    fn read_unit(&mut self, start_ms: i64) -> Option<SamplingUnit> {
        let mut frames = Vec::with_capacity(self.frames_per_unit);
        for time_ms in frame_times(start_ms, &self.sampling, self.frames_per_unit) {
            match self.provider.frame_at(time_ms) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => {
                    warn!("no frame decodable at {}ms", time_ms);
                }
                Err(e) => {
                    warn!("frame decode failed at {}ms: {}", time_ms, e);
                }
            }
        }

        if frames.len() == self.frames_per_unit {
            debug!(
                "unit at {}ms: {} frames ({:.0}..{:.0}ms)",
                start_ms,
                frames.len(),
                frames.first().map(|f| f.timestamp_ms).unwrap_or(0.0),
                frames.last().map(|f| f.timestamp_ms).unwrap_or(0.0)
            );
            Some(SamplingUnit { frames, start_ms })
        } else {
            warn!(
                "dropping partial unit at {}ms ({}/{} frames)",
                start_ms,
                frames.len(),
                self.frames_per_unit
            );
            None
        }
    }
}

impl<'a, P: FrameProvider + ?Sized> Iterator for UnitIter<'a, P> {
    type Item = SamplingUnit;

    fn next(&mut self) -> Option<SamplingUnit> {
        while self.next_offset < self.offsets.len() {
            let start_ms = self.offsets[self.next_offset];
            self.next_offset += 1;
            if let Some(unit) = self.read_unit(start_ms) {
                return Some(unit);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Config;

    /// Deterministic provider: every timestamp decodes to a solid 8x8 frame,
    /// except timestamps listed in `dead_ms`.
    struct SyntheticProvider {
        duration_ms: i64,
        dead_ms: Vec<i64>,
    }

    impl FrameProvider for SyntheticProvider {
        fn duration_ms(&self) -> i64 {
            self.duration_ms
        }

        fn frame_at(&mut self, time_ms: i64) -> Result<Option<Frame>> {
            if self.dead_ms.contains(&time_ms) {
                return Ok(None);
            }
            Ok(Some(Frame {
                data: vec![128u8; 8 * 8 * 3],
                width: 8,
                height: 8,
                timestamp_ms: time_ms as f64,
            }))
        }
    }

    fn config() -> Config {
        Config::default()
    }

    #[test]
    fn test_exact_unit_count() {
        // duration 10000, unit 2000, stride 1000 -> floor((10000-2000)/1000)+1 = 9
        let config = config();
        let offsets = unit_offsets(10_000, &config.sampling, config.model.frames_per_unit);
        assert_eq!(offsets.len(), 9);
        assert_eq!(offsets.first(), Some(&0));
        assert_eq!(offsets.last(), Some(&8000));
    }

    #[test]
    fn test_frame_mode_cadence_ignores_unit_duration() {
        let mut config = config();
        config.model.frames_per_unit = 1;
        config.sampling.stride_ms = 2000;
        // unit_duration no longer constrains the tail: 0,2000,...,8000
        let offsets = unit_offsets(10_000, &config.sampling, 1);
        assert_eq!(offsets.len(), 5);
        assert_eq!(offsets.last(), Some(&8000));
    }

    #[test]
    fn test_frame_times_evenly_spaced() {
        let config = config();
        let times = frame_times(4000, &config.sampling, 16);
        assert_eq!(times.len(), 16);
        assert_eq!(times[0], 4000);
        assert_eq!(times[1], 4125);
        assert_eq!(times[15], 5875); // stays inside [4000, 6000)
    }

    #[test]
    fn test_iterator_yields_complete_units() {
        let config = config();
        let mut provider = SyntheticProvider {
            duration_ms: 10_000,
            dead_ms: vec![],
        };
        let units: Vec<_> = UnitIter::new(&mut provider, &config.sampling, &config.model).collect();
        assert_eq!(units.len(), 9);
        assert!(units.iter().all(|u| u.frames.len() == 16));
    }

    #[test]
    fn test_partial_units_are_dropped_silently() {
        let config = config();
        // Kill the frame at 125ms: with a 1000ms stride it only belongs to
        // the unit starting at 0, so exactly that unit disappears.
        let mut provider = SyntheticProvider {
            duration_ms: 10_000,
            dead_ms: vec![125],
        };
        let units: Vec<_> = UnitIter::new(&mut provider, &config.sampling, &config.model).collect();
        assert_eq!(units.len(), 8);
        assert!(units.iter().all(|u| u.start_ms != 0));
    }

    #[test]
    fn test_all_failures_yield_no_units() {
        let config = config();
        let dead: Vec<i64> = (0..10_000i64).step_by(125).collect();
        let mut provider = SyntheticProvider {
            duration_ms: 10_000,
            dead_ms: dead,
        };
        let mut iter = UnitIter::new(&mut provider, &config.sampling, &config.model);
        assert!(iter.next().is_none());
        let (done, total) = iter.position();
        assert_eq!(done, total);
    }
}
