//! Control channel vocabulary.
//!
//! The control channel carries a closed set of JSON commands, each answered
//! by exactly one response, in strict arrival order. There is no pipelining
//! at the protocol level: a well-behaved client waits for the response
//! before sending the next command, and the server dispatches commands from
//! one connection on a single thread so they never run concurrently.
//!
//! # Wire shape
//!
//! ```text
//! request:  {"cmd": "<name>", ...args}
//! response: {"result": <bool>, ...fields, "msg": "<string, on failure>"}
//! ```
//!
//! | command              | args                               | success payload              |
//! |----------------------|------------------------------------|------------------------------|
//! | `get_cameras`        | none                               | `cameras`: name to index     |
//! | `set_camera`         | `cam_idx`, `width`, `height`       | none                         |
//! | `get_camera_formats` | `cam_name`, optional filter bounds | `formats`: ordered list      |
//! | `capture`            | none                               | none (data state -> running) |
//! | `stop_capture`       | none                               | none (data state -> idle)    |
//!
//! Unknown commands and missing required arguments fail JSON dispatch and
//! are answered with `result: false` plus a `msg`; they never tear the
//! connection down.

use crate::camera::FormatFilter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_min_width() -> u32 {
    FormatFilter::default().min_width
}

fn default_min_fps() -> u32 {
    FormatFilter::default().min_fps
}

fn default_min_height() -> u32 {
    FormatFilter::default().min_height
}

fn default_max_height() -> u32 {
    FormatFilter::default().max_height
}

/// Commands a client may issue on the control channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ControlCommand {
    /// Enumerate cameras known to the device catalog
    GetCameras,

    /// Select the camera and capture resolution used by subsequent `capture`
    SetCamera {
        cam_idx: u32,
        width: u32,
        height: u32,
    },

    /// List a camera's capture formats, filtered by the given bounds.
    ///
    /// Filter bounds are optional on the wire and default to the catalog's
    /// conventional limits (min 640 wide, min 30 fps, any height up to
    /// 10000).
    GetCameraFormats {
        cam_name: String,
        #[serde(default = "default_min_width")]
        min_width: u32,
        #[serde(default = "default_min_fps")]
        min_fps: u32,
        #[serde(default = "default_min_height")]
        min_height: u32,
        #[serde(default = "default_max_height")]
        max_height: u32,
    },

    /// Start streaming frames on the paired data connection
    Capture,

    /// Stop streaming, leaving the data connection idle
    StopCapture,
}

impl ControlCommand {
    /// Filter bounds of a `get_camera_formats` command, if this is one
    pub fn format_filter(&self) -> Option<FormatFilter> {
        match self {
            ControlCommand::GetCameraFormats {
                min_width,
                min_fps,
                min_height,
                max_height,
                ..
            } => Some(FormatFilter {
                min_width: *min_width,
                min_fps: *min_fps,
                min_height: *min_height,
                max_height: *max_height,
            }),
            _ => None,
        }
    }
}

/// Response to one control command.
///
/// `result` is always present. Payload fields are command-specific and
/// omitted from the JSON when absent; `msg` carries a human-readable reason
/// on failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub result: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cameras: Option<BTreeMap<String, u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formats: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl ControlResponse {
    /// Bare success
    pub fn ok() -> Self {
        Self {
            result: true,
            ..Default::default()
        }
    }

    /// Failure with a reason
    pub fn failure(msg: impl Into<String>) -> Self {
        Self {
            result: false,
            msg: Some(msg.into()),
            ..Default::default()
        }
    }

    /// Success carrying the camera enumeration
    pub fn with_cameras(cameras: BTreeMap<String, u32>) -> Self {
        Self {
            result: true,
            cameras: Some(cameras),
            ..Default::default()
        }
    }

    /// Success carrying a format list
    pub fn with_formats(formats: Vec<String>) -> Self {
        Self {
            result: true,
            formats: Some(formats),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_shape() {
        let json = serde_json::to_value(&ControlCommand::Capture).unwrap();
        assert_eq!(json, serde_json::json!({"cmd": "capture"}));

        let json = serde_json::to_value(&ControlCommand::SetCamera {
            cam_idx: 0,
            width: 1280,
            height: 720,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"cmd": "set_camera", "cam_idx": 0, "width": 1280, "height": 720})
        );
    }

    #[test]
    fn test_format_filter_defaults_fill_in() {
        let cmd: ControlCommand =
            serde_json::from_str(r#"{"cmd": "get_camera_formats", "cam_name": "camA"}"#).unwrap();
        let filter = cmd.format_filter().unwrap();
        assert_eq!(filter.min_width, 640);
        assert_eq!(filter.min_fps, 30);
        assert_eq!(filter.min_height, 0);
        assert_eq!(filter.max_height, 10_000);
    }

    #[test]
    fn test_unknown_command_fails_parse() {
        let result: Result<ControlCommand, _> =
            serde_json::from_str(r#"{"cmd": "reboot_everything"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_argument_fails_parse() {
        let result: Result<ControlCommand, _> =
            serde_json::from_str(r#"{"cmd": "set_camera", "cam_idx": 0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_response_omits_absent_fields() {
        let json = serde_json::to_string(&ControlResponse::ok()).unwrap();
        assert_eq!(json, r#"{"result":true}"#);

        let json = serde_json::to_string(&ControlResponse::failure("no cmd")).unwrap();
        assert_eq!(json, r#"{"result":false,"msg":"no cmd"}"#);
    }

    #[test]
    fn test_response_payload_roundtrip() {
        let mut cameras = BTreeMap::new();
        cameras.insert("camA".to_string(), 0u32);
        let resp = ControlResponse::with_cameras(cameras.clone());
        let back: ControlResponse =
            serde_json::from_str(&serde_json::to_string(&resp).unwrap()).unwrap();
        assert!(back.result);
        assert_eq!(back.cameras, Some(cameras));
        assert_eq!(back.formats, None);
    }
}
