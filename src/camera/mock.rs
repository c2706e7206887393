//! Synthetic device catalog for hardware-free operation.
//!
//! The mock catalog advertises a configurable set of cameras, all sharing
//! one format table, and produces deterministic moving-gradient frames: red
//! ramps along x, green along y, and the blue channel of every pixel carries
//! the low byte of the grab counter, so consecutive frames are
//! distinguishable in tests without depending on timing.

use crate::camera::{CameraFormat, DeviceCatalog, FormatFilter, FrameSource};
use crate::error::{Error, Result};
use crate::frame::{Frame, CHANNELS};
use std::collections::BTreeMap;
use std::time::Duration;

/// Format table every mock camera advertises (mirrors a typical UVC webcam)
fn default_formats() -> Vec<CameraFormat> {
    let mk = |width, height, min_fps, tag: &str| CameraFormat {
        width,
        height,
        min_fps,
        pixel_format: tag.to_string(),
    };
    vec![
        mk(2592, 1944, 30, "Jpeg"),
        mk(1920, 1080, 30, "Jpeg"),
        mk(1280, 720, 30, "Jpeg"),
        mk(1280, 960, 30, "Jpeg"),
        mk(2048, 1536, 30, "Jpeg"),
        mk(1920, 1080, 3, "YUYV"),
        mk(1280, 720, 8, "YUYV"),
    ]
}

/// Catalog of synthetic cameras
pub struct MockCatalog {
    cameras: Vec<String>,
    formats: Vec<CameraFormat>,
    frame_interval: Duration,
}

impl Default for MockCatalog {
    fn default() -> Self {
        Self::new(["Mock Camera"])
    }
}

impl MockCatalog {
    /// Catalog with the given camera names, indexed in order
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cameras: names.into_iter().map(Into::into).collect(),
            formats: default_formats(),
            frame_interval: Duration::ZERO,
        }
    }

    /// Pace sources so consecutive grabs are at least `interval` apart.
    ///
    /// Zero (the default) streams unpaced, which is what tests want; the
    /// daemon sets a small interval so an idle consumer does not saturate a
    /// core.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Replace the shared format table
    pub fn with_formats(mut self, formats: Vec<CameraFormat>) -> Self {
        self.formats = formats;
        self
    }
}

impl DeviceCatalog for MockCatalog {
    fn list_cameras(&self) -> BTreeMap<String, u32> {
        self.cameras
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx as u32))
            .collect()
    }

    fn list_formats(&self, cam_name: &str, filter: &FormatFilter) -> Vec<String> {
        if !self.cameras.iter().any(|name| name == cam_name) {
            return Vec::new();
        }
        self.formats
            .iter()
            .filter(|format| filter.matches(format))
            .map(|format| format.to_string())
            .collect()
    }

    fn open(&self, index: u32, width: u32, height: u32) -> Result<Box<dyn FrameSource>> {
        if index as usize >= self.cameras.len() {
            return Err(Error::CameraNotAvailable(format!("index {}", index)));
        }
        if width == 0 || height == 0 {
            return Err(Error::InvalidParameter(format!(
                "capture resolution {}x{}",
                width, height
            )));
        }
        log::debug!(
            "opening mock camera {} ({}) at {}x{}",
            index,
            self.cameras[index as usize],
            width,
            height
        );
        Ok(Box::new(MockSource {
            width,
            height,
            counter: 0,
            frame_interval: self.frame_interval,
        }))
    }
}

/// Deterministic gradient frame generator
struct MockSource {
    width: u32,
    height: u32,
    counter: u64,
    frame_interval: Duration,
}

impl FrameSource for MockSource {
    fn grab(&mut self) -> Result<Option<Frame>> {
        if !self.frame_interval.is_zero() {
            std::thread::sleep(self.frame_interval);
        }
        let tag = (self.counter % 256) as u8;
        self.counter += 1;

        let mut data = vec![0u8; self.width as usize * self.height as usize * CHANNELS];
        for y in 0..self.height {
            for x in 0..self.width {
                let idx = (y as usize * self.width as usize + x as usize) * CHANNELS;
                data[idx] = (x % 256) as u8;
                data[idx + 1] = (y % 256) as u8;
                data[idx + 2] = tag;
            }
        }
        Ok(Some(Frame::new(self.width, self.height, data)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_enumeration() {
        let catalog = MockCatalog::new(["camA", "camB"]);
        let cameras = catalog.list_cameras();
        assert_eq!(cameras.get("camA"), Some(&0));
        assert_eq!(cameras.get("camB"), Some(&1));
        assert_eq!(cameras.len(), 2);
    }

    #[test]
    fn test_format_listing_respects_filter() {
        let catalog = MockCatalog::default();
        let formats = catalog.list_formats("Mock Camera", &FormatFilter::default());
        // Default filter drops the low-fps YUYV modes
        assert!(formats.iter().all(|f| f.ends_with("Jpeg")));
        assert!(formats.contains(&"1280x720 30fps Jpeg".to_string()));

        let all = catalog.list_formats(
            "Mock Camera",
            &FormatFilter {
                min_fps: 0,
                ..FormatFilter::default()
            },
        );
        assert!(all.len() > formats.len());
    }

    #[test]
    fn test_unknown_camera_lists_nothing() {
        let catalog = MockCatalog::default();
        assert!(catalog
            .list_formats("No Such Camera", &FormatFilter::default())
            .is_empty());
    }

    #[test]
    fn test_open_validates_index() {
        let catalog = MockCatalog::default();
        assert!(catalog.open(5, 640, 480).is_err());
        assert!(catalog.open(0, 0, 480).is_err());
        assert!(catalog.open(0, 640, 480).is_ok());
    }

    #[test]
    fn test_grab_produces_tagged_frames() {
        let catalog = MockCatalog::default();
        let mut source = catalog.open(0, 8, 4).unwrap();
        let first = source.grab().unwrap().unwrap();
        let second = source.grab().unwrap().unwrap();
        assert_eq!(first.resolution(), (8, 4));
        // Blue channel carries the grab counter
        assert_eq!(first.data()[2], 0);
        assert_eq!(second.data()[2], 1);
    }
}
