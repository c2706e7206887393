//! Device catalog boundary.
//!
//! Camera hardware enumeration and capture are external collaborators as far
//! as the streaming core is concerned: the server consults a
//! [`DeviceCatalog`] for metadata and opens a [`FrameSource`] when a session
//! starts streaming. The in-tree implementation is the synthetic
//! [`MockCatalog`]; real backends live behind the same traits.

use crate::error::Result;
use crate::frame::Frame;
use std::collections::BTreeMap;
use std::fmt;

pub mod mock;

pub use mock::MockCatalog;

/// One capture format advertised by a camera.
///
/// Displays as the catalog's conventional format string, e.g.
/// `"1280x720 30fps Jpeg"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraFormat {
    pub width: u32,
    pub height: u32,
    /// Minimum frame rate the camera sustains at this resolution
    pub min_fps: u32,
    /// Pixel format tag, e.g. `Jpeg` or `YUYV`
    pub pixel_format: String,
}

impl fmt::Display for CameraFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} {}fps {}",
            self.width, self.height, self.min_fps, self.pixel_format
        )
    }
}

impl CameraFormat {
    /// Recover `(width, height)` from the leading `<w>x<h>` of a format
    /// string. `None` when the string does not start with a resolution.
    pub fn parse_resolution(format_str: &str) -> Option<(u32, u32)> {
        let resolution = format_str.split_whitespace().next()?;
        let (w, h) = resolution.split_once('x')?;
        Some((w.parse().ok()?, h.parse().ok()?))
    }
}

/// Bounds applied when listing a camera's formats.
///
/// Defaults are the control protocol's conventional limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatFilter {
    pub min_width: u32,
    pub min_fps: u32,
    pub min_height: u32,
    pub max_height: u32,
}

impl Default for FormatFilter {
    fn default() -> Self {
        Self {
            min_width: 640,
            min_fps: 30,
            min_height: 0,
            max_height: 10_000,
        }
    }
}

impl FormatFilter {
    pub fn matches(&self, format: &CameraFormat) -> bool {
        format.width >= self.min_width
            && format.min_fps >= self.min_fps
            && format.height >= self.min_height
            && format.height <= self.max_height
    }
}

/// Enumerates cameras and opens capture sources.
///
/// Shared between the server's control dispatch (metadata queries) and its
/// send loop (opening the selected camera), so implementations must be
/// thread-safe.
pub trait DeviceCatalog: Send + Sync {
    /// Cameras known to the catalog, name → index
    fn list_cameras(&self) -> BTreeMap<String, u32>;

    /// Format strings of `cam_name` passing `filter`, in catalog order.
    ///
    /// Unknown cameras yield an empty list, not an error.
    fn list_formats(&self, cam_name: &str, filter: &FormatFilter) -> Vec<String>;

    /// Open camera `index` configured to capture at `width`x`height`
    fn open(&self, index: u32, width: u32, height: u32) -> Result<Box<dyn FrameSource>>;
}

/// A live capture source for one opened camera
pub trait FrameSource: Send {
    /// Grab the next frame.
    ///
    /// `Ok(None)` means no frame was ready this tick; the caller retries
    /// without sending anything.
    fn grab(&mut self) -> Result<Option<Frame>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(width: u32, height: u32, fps: u32) -> CameraFormat {
        CameraFormat {
            width,
            height,
            min_fps: fps,
            pixel_format: "Jpeg".to_string(),
        }
    }

    #[test]
    fn test_format_display() {
        assert_eq!(fmt(1280, 720, 30).to_string(), "1280x720 30fps Jpeg");
    }

    #[test]
    fn test_parse_resolution() {
        assert_eq!(
            CameraFormat::parse_resolution("1280x720 30fps Jpeg"),
            Some((1280, 720))
        );
        assert_eq!(CameraFormat::parse_resolution("2592x1944"), Some((2592, 1944)));
        assert_eq!(CameraFormat::parse_resolution("garbage"), None);
        assert_eq!(CameraFormat::parse_resolution(""), None);
    }

    #[test]
    fn test_filter_bounds() {
        let filter = FormatFilter {
            min_width: 1280,
            min_fps: 30,
            min_height: 720,
            max_height: 960,
        };
        assert!(filter.matches(&fmt(1280, 720, 30)));
        assert!(filter.matches(&fmt(1280, 960, 30)));
        assert!(!filter.matches(&fmt(640, 480, 30)));
        assert!(!filter.matches(&fmt(1920, 1080, 30)));
        assert!(!filter.matches(&fmt(1280, 720, 8)));
    }
}
