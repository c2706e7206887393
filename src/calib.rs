//! Camera calibration parameters: loading, validation, undistortion.
//!
//! Calibration files are JSON objects with a `matrix` key (3×3 nested array,
//! the camera intrinsics) and a `distortion` key (five Brown–Conrady
//! coefficients, accepted as a flat 5-element array or a 1×5/5×1 nested
//! array). The format-bound variant additionally carries `width`/`height`,
//! which must equal the resolution the caller is streaming at. The check
//! happens at load time; applying the parameters never re-validates.
//!
//! Shape validation is all-or-nothing: a rejected file leaves no partial
//! state behind.
//!
//! The directory convention for per-format files is
//! `"<camera name>@<width>x<height>.json"`.

use crate::camera::CameraFormat;
use crate::error::{Error, Result};
use crate::frame::{Frame, CHANNELS};
use serde_json::Value;
use std::path::Path;

/// Intrinsic matrix plus distortion coefficients for one camera format
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationParams {
    matrix: [[f64; 3]; 3],
    /// Brown–Conrady coefficients in OpenCV order: k1, k2, p1, p2, k3
    distortion: [f64; 5],
    /// Resolution the parameters were captured for, when the file declares one
    resolution: Option<(u32, u32)>,
}

impl CalibrationParams {
    /// Load from a calibration file, validating shapes only.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_inner(path.as_ref(), None)
    }

    /// Format-bound load: the file must declare `width`/`height` equal to
    /// `active` (the resolution currently being streamed).
    pub fn load_bound<P: AsRef<Path>>(path: P, active: (u32, u32)) -> Result<Self> {
        Self::load_inner(path.as_ref(), Some(active))
    }

    /// Load the per-format file `"<cam_name>@<w>x<h>.json"` under `dir`,
    /// bound to the resolution encoded in `format_str`.
    pub fn load_for_format<P: AsRef<Path>>(
        dir: P,
        cam_name: &str,
        format_str: &str,
    ) -> Result<Self> {
        let (width, height) = CameraFormat::parse_resolution(format_str).ok_or_else(|| {
            Error::InvalidParameter(format!("format string without resolution: {:?}", format_str))
        })?;
        let file = dir
            .as_ref()
            .join(format!("{}@{}x{}.json", cam_name, width, height));
        Self::load_bound(file, (width, height))
    }

    fn load_inner(path: &Path, active: Option<(u32, u32)>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text).map_err(|e| {
            Error::InvalidParameter(format!("calibration file {}: {}", path.display(), e))
        })?;
        let obj = value.as_object().ok_or_else(|| {
            Error::InvalidParameter(format!(
                "calibration file {} is not a JSON object",
                path.display()
            ))
        })?;

        let matrix = parse_matrix(obj.get("matrix").ok_or_else(|| missing(path, "matrix"))?)?;
        let distortion =
            parse_distortion(obj.get("distortion").ok_or_else(|| missing(path, "distortion"))?)?;

        let resolution = match (obj.get("width"), obj.get("height")) {
            (Some(w), Some(h)) => Some((parse_dim(w, "width")?, parse_dim(h, "height")?)),
            (None, None) => None,
            _ => {
                return Err(Error::InvalidParameter(
                    "width and height must appear together".to_string(),
                ))
            }
        };

        if let Some(active) = active {
            match resolution {
                Some(declared) if declared == active => {}
                Some((w, h)) => {
                    return Err(Error::InvalidParameter(format!(
                        "calibration resolution {}x{} does not match active format {}x{}",
                        w, h, active.0, active.1
                    )))
                }
                None => {
                    return Err(Error::InvalidParameter(
                        "calibration file declares no resolution, cannot bind to format"
                            .to_string(),
                    ))
                }
            }
        }

        Ok(Self {
            matrix,
            distortion,
            resolution,
        })
    }

    /// 3×3 intrinsic matrix K
    pub fn matrix(&self) -> &[[f64; 3]; 3] {
        &self.matrix
    }

    /// Distortion coefficients k1, k2, p1, p2, k3
    pub fn distortion(&self) -> &[f64; 5] {
        &self.distortion
    }

    /// Declared resolution, if the file carried one
    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.resolution
    }

    /// Produce an undistorted copy of `frame`.
    ///
    /// Inverse mapping: each output pixel is projected through the
    /// distortion model to its source position in the input, then sampled
    /// bilinearly. Source positions falling outside the input stay black.
    pub fn undistort(&self, frame: &Frame) -> Frame {
        let [k1, k2, p1, p2, k3] = self.distortion;
        let fx = self.matrix[0][0];
        let fy = self.matrix[1][1];
        let cx = self.matrix[0][2];
        let cy = self.matrix[1][2];

        let width = frame.width();
        let height = frame.height();
        let mut out = vec![0u8; width as usize * height as usize * CHANNELS];

        for v in 0..height {
            for u in 0..width {
                // Normalized coordinates of the undistorted pixel
                let x = (u as f64 - cx) / fx;
                let y = (v as f64 - cy) / fy;
                let r2 = x * x + y * y;
                let radial = 1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;
                let xd = x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
                let yd = y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
                let src_u = xd * fx + cx;
                let src_v = yd * fy + cy;

                if let Some(rgb) = sample_bilinear(frame, src_u, src_v) {
                    let idx = (v as usize * width as usize + u as usize) * CHANNELS;
                    out[idx..idx + CHANNELS].copy_from_slice(&rgb);
                }
            }
        }

        // Length is correct by construction
        Frame::new(width, height, out).unwrap_or_else(|_| Frame::black(width, height))
    }
}

fn missing(path: &Path, key: &str) -> Error {
    Error::InvalidParameter(format!(
        "calibration file {} has no {:?} key",
        path.display(),
        key
    ))
}

fn parse_dim(value: &Value, key: &str) -> Result<u32> {
    value
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| Error::InvalidParameter(format!("{} is not a valid dimension", key)))
}

fn parse_matrix(value: &Value) -> Result<[[f64; 3]; 3]> {
    let rows = value
        .as_array()
        .filter(|rows| rows.len() == 3)
        .ok_or_else(|| Error::InvalidParameter("matrix is not 3x3".to_string()))?;
    let mut matrix = [[0.0; 3]; 3];
    for (i, row) in rows.iter().enumerate() {
        let cols = row
            .as_array()
            .filter(|cols| cols.len() == 3)
            .ok_or_else(|| Error::InvalidParameter("matrix is not 3x3".to_string()))?;
        for (j, cell) in cols.iter().enumerate() {
            matrix[i][j] = cell
                .as_f64()
                .ok_or_else(|| Error::InvalidParameter("matrix entry is not a number".to_string()))?;
        }
    }
    Ok(matrix)
}

/// Accepts `[5]`, `[1][5]` and `[5][1]` shapes, flattening to five
/// coefficients.
fn parse_distortion(value: &Value) -> Result<[f64; 5]> {
    let outer = value
        .as_array()
        .ok_or_else(|| Error::InvalidParameter("distortion is not an array".to_string()))?;

    let flat: Vec<&Value> = if outer.iter().all(|v| v.is_array()) {
        // Nested shapes must be exactly 1x5 or 5x1; every row is checked so
        // ragged inputs cannot flatten to five by accident
        let rectangular = (outer.len() == 1
            && outer[0].as_array().map_or(false, |row| row.len() == 5))
            || (outer.len() == 5
                && outer
                    .iter()
                    .all(|row| row.as_array().map_or(false, |row| row.len() == 1)));
        if !rectangular {
            return Err(Error::InvalidParameter(
                "distortion must be shaped [5], [1][5] or [5][1]".to_string(),
            ));
        }
        outer
            .iter()
            .flat_map(|row| row.as_array().into_iter().flatten())
            .collect()
    } else {
        outer.iter().collect()
    };

    if flat.len() != 5 {
        return Err(Error::InvalidParameter(format!(
            "distortion has {} coefficients, expected 5",
            flat.len()
        )));
    }

    let mut distortion = [0.0; 5];
    for (i, cell) in flat.iter().enumerate() {
        distortion[i] = cell.as_f64().ok_or_else(|| {
            Error::InvalidParameter("distortion entry is not a number".to_string())
        })?;
    }
    Ok(distortion)
}

fn sample_bilinear(frame: &Frame, u: f64, v: f64) -> Option<[u8; 3]> {
    let max_u = (frame.width() - 1) as f64;
    let max_v = (frame.height() - 1) as f64;
    if !(0.0..=max_u).contains(&u) || !(0.0..=max_v).contains(&v) {
        return None;
    }

    let u0 = u.floor() as u32;
    let v0 = v.floor() as u32;
    let u1 = (u0 + 1).min(frame.width() - 1);
    let v1 = (v0 + 1).min(frame.height() - 1);
    let du = u - u0 as f64;
    let dv = v - v0 as f64;

    let p00 = frame.pixel(u0, v0);
    let p10 = frame.pixel(u1, v0);
    let p01 = frame.pixel(u0, v1);
    let p11 = frame.pixel(u1, v1);

    let mut rgb = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f64 * (1.0 - du) + p10[c] as f64 * du;
        let bottom = p01[c] as f64 * (1.0 - du) + p11[c] as f64 * du;
        rgb[c] = (top * (1.0 - dv) + bottom * dv).round().clamp(0.0, 255.0) as u8;
    }
    Some(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const IDENTITY_MATRIX: &str = "[[100.0, 0.0, 2.0], [0.0, 100.0, 2.0], [0.0, 0.0, 1.0]]";

    fn write_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn valid_json(distortion: &str) -> String {
        format!(
            r#"{{"matrix": {}, "distortion": {}}}"#,
            IDENTITY_MATRIX, distortion
        )
    }

    #[test]
    fn test_load_flat_distortion() {
        let file = write_file(&valid_json("[0.1, 0.2, 0.0, 0.0, 0.3]"));
        let params = CalibrationParams::load(file.path()).unwrap();
        assert_eq!(params.distortion(), &[0.1, 0.2, 0.0, 0.0, 0.3]);
        assert_eq!(params.matrix()[0][0], 100.0);
        assert_eq!(params.resolution(), None);
    }

    #[test]
    fn test_load_nested_distortion_shapes() {
        let file = write_file(&valid_json("[[0.1, 0.2, 0.0, 0.0, 0.3]]"));
        assert!(CalibrationParams::load(file.path()).is_ok());

        let file = write_file(&valid_json("[[0.1], [0.2], [0.0], [0.0], [0.3]]"));
        assert!(CalibrationParams::load(file.path()).is_ok());
    }

    #[test]
    fn test_reject_bad_distortion() {
        let file = write_file(&valid_json("[0.1, 0.2, 0.0]"));
        assert!(CalibrationParams::load(file.path()).is_err());

        let file = write_file(&valid_json("\"nope\""));
        assert!(CalibrationParams::load(file.path()).is_err());
    }

    #[test]
    fn test_reject_ragged_distortion() {
        // Five values total, but not shaped [5], [1][5] or [5][1]
        let file = write_file(&valid_json("[[1, 2, 3, 4, 5], [], [], [], []]"));
        assert!(CalibrationParams::load(file.path()).is_err());

        let file = write_file(&valid_json("[[1, 2], [3, 4, 5]]"));
        assert!(CalibrationParams::load(file.path()).is_err());

        let file = write_file(&valid_json("[[1], [2], [3], [4, 5]]"));
        assert!(CalibrationParams::load(file.path()).is_err());
    }

    #[test]
    fn test_reject_bad_matrix() {
        let file = write_file(
            r#"{"matrix": [[1.0, 0.0], [0.0, 1.0]], "distortion": [0, 0, 0, 0, 0]}"#,
        );
        assert!(CalibrationParams::load(file.path()).is_err());
    }

    #[test]
    fn test_reject_missing_keys() {
        let file = write_file(r#"{"matrix": [[1,0,0],[0,1,0],[0,0,1]]}"#);
        assert!(CalibrationParams::load(file.path()).is_err());
        let file = write_file(r#"{}"#);
        assert!(CalibrationParams::load(file.path()).is_err());
    }

    #[test]
    fn test_bound_load_checks_resolution() {
        let content = format!(
            r#"{{"matrix": {}, "distortion": [0,0,0,0,0], "width": 1280, "height": 720}}"#,
            IDENTITY_MATRIX
        );
        let file = write_file(&content);
        assert!(CalibrationParams::load_bound(file.path(), (1280, 720)).is_ok());
        assert!(CalibrationParams::load_bound(file.path(), (640, 480)).is_err());

        // Unbound files cannot be format-bound
        let file = write_file(&valid_json("[0,0,0,0,0]"));
        assert!(CalibrationParams::load_bound(file.path(), (1280, 720)).is_err());
    }

    #[test]
    fn test_load_for_format_naming() {
        let dir = tempfile::tempdir().unwrap();
        let content = format!(
            r#"{{"matrix": {}, "distortion": [0,0,0,0,0], "width": 16, "height": 8}}"#,
            IDENTITY_MATRIX
        );
        std::fs::write(dir.path().join("camA@16x8.json"), content).unwrap();

        let params =
            CalibrationParams::load_for_format(dir.path(), "camA", "16x8 30fps Jpeg").unwrap();
        assert_eq!(params.resolution(), Some((16, 8)));

        // Missing file surfaces as an I/O error, not a panic
        assert!(
            CalibrationParams::load_for_format(dir.path(), "camB", "16x8 30fps Jpeg").is_err()
        );
    }

    #[test]
    fn test_zero_distortion_is_identity() {
        let file = write_file(&valid_json("[0, 0, 0, 0, 0]"));
        let params = CalibrationParams::load(file.path()).unwrap();

        let mut data = Vec::new();
        for i in 0..(4 * 4 * 3) {
            data.push((i * 7 % 256) as u8);
        }
        let frame = Frame::new(4, 4, data).unwrap();
        assert_eq!(params.undistort(&frame), frame);
    }

    #[test]
    fn test_undistort_preserves_shape() {
        let file = write_file(&valid_json("[0.05, 0.0, 0.0, 0.0, 0.0]"));
        let params = CalibrationParams::load(file.path()).unwrap();
        let frame = Frame::black(8, 6);
        assert_eq!(params.undistort(&frame).resolution(), (8, 6));
    }
}
