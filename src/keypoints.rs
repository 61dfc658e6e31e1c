//! Pose keypoints and their projection into raster pixel space.
//!
//! Keypoints come from an external BlazePose estimator, usually measured on
//! the source upload rather than on the cut-out raster the eraser works
//! on. [`Projection`] describes how to get from one to the other.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MIN_HULL_POINTS;
use crate::geometry::Point;

/// The 33 BlazePose joints, in model output order.
pub const BLAZEPOSE_KEYPOINTS: [&str; 33] = [
    "nose",
    "left_eye_inner",
    "left_eye",
    "left_eye_outer",
    "right_eye_inner",
    "right_eye",
    "right_eye_outer",
    "left_ear",
    "right_ear",
    "mouth_left",
    "mouth_right",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_pinky",
    "right_pinky",
    "left_index",
    "right_index",
    "left_thumb",
    "right_thumb",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
    "left_heel",
    "right_heel",
    "left_foot_index",
    "right_foot_index",
];

/// A single named joint estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub name: String,
    pub x: f64,
    pub y: f64,
    /// Confidence score (0.0-1.0)
    pub score: f64,
}

impl Keypoint {
    pub fn new<S: Into<String>>(name: S, x: f64, y: f64, score: f64) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            score,
        }
    }

    /// Score at or above the threshold
    pub fn is_confident(&self, min_score: f64) -> bool {
        self.score.is_finite() && self.score >= min_score
    }

    /// Position in BlazePose output order, if the name is a known joint
    pub fn blazepose_index(&self) -> Option<usize> {
        BLAZEPOSE_KEYPOINTS.iter().position(|&n| n == self.name)
    }
}

/// Rectangle cut out of the source image before the raster was produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropWindow {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Second crop applied after the image was uploaded for segmentation.
///
/// The uploaded image is `original_width` x `original_height`; the raster
/// is the `width` x `height` window at `(x, y)` of that upload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServerCrop {
    pub original_width: f64,
    pub original_height: f64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Mapping from keypoint coordinates to raster pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Projection {
    /// Keypoints are already raster pixel coordinates
    #[default]
    Identity,
    /// `raster = keypoint * scale + offset`
    Affine {
        scale_x: f64,
        scale_y: f64,
        offset_x: f64,
        offset_y: f64,
    },
    /// Keypoints were measured on a source image of the given size,
    /// optionally cropped on the client, then optionally cropped again
    /// after upload before being resized to the raster.
    FromImage {
        image_width: f64,
        image_height: f64,
        crop: Option<CropWindow>,
        #[serde(default)]
        server_crop: Option<ServerCrop>,
    },
}

impl Projection {
    /// Map one keypoint position onto a `raster_width` x `raster_height`
    /// raster. `None` when the point falls outside the crop window or the
    /// projection is unusable.
    pub fn apply(&self, x: f64, y: f64, raster_width: usize, raster_height: usize) -> Option<Point> {
        let mapped = match *self {
            Projection::Identity => Point::new(x, y),
            Projection::Affine {
                scale_x,
                scale_y,
                offset_x,
                offset_y,
            } => Point::new(x * scale_x + offset_x, y * scale_y + offset_y),
            Projection::FromImage {
                image_width,
                image_height,
                crop,
                server_crop,
            } => {
                let (local_x, local_y, source_w, source_h) = match crop {
                    Some(c) => {
                        let cx = x - c.x;
                        let cy = y - c.y;
                        if cx < 0.0 || cy < 0.0 || cx > c.width || cy > c.height {
                            return None;
                        }
                        (cx, cy, c.width, c.height)
                    }
                    None => (x, y, image_width, image_height),
                };
                if source_w <= 0.0 || source_h <= 0.0 {
                    return None;
                }
                match server_crop {
                    // Rescale into upload space, then into the server window
                    Some(s) if s.width > 0.0 => {
                        if s.height <= 0.0 {
                            return None;
                        }
                        let upload_x = local_x * s.original_width / source_w - s.x;
                        let upload_y = local_y * s.original_height / source_h - s.y;
                        Point::new(
                            upload_x / s.width * raster_width as f64,
                            upload_y / s.height * raster_height as f64,
                        )
                    }
                    _ => Point::new(
                        local_x / source_w * raster_width as f64,
                        local_y / source_h * raster_height as f64,
                    ),
                }
            }
        };
        mapped.is_finite().then_some(mapped)
    }
}

/// Fewer than three keypoints survived filtering; the caller should switch
/// to the color-based selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsufficientKeypoints {
    pub found: usize,
}

/// Filter keypoints by score and map survivors into raster space.
pub fn project_keypoints(
    keypoints: &[Keypoint],
    projection: &Projection,
    min_score: f64,
    raster_width: usize,
    raster_height: usize,
) -> Result<Vec<Point>, InsufficientKeypoints> {
    let points: Vec<Point> = keypoints
        .iter()
        .filter(|kp| kp.is_confident(min_score))
        .filter_map(|kp| projection.apply(kp.x, kp.y, raster_width, raster_height))
        .collect();

    debug!(
        total = keypoints.len(),
        kept = points.len(),
        min_score,
        "projected keypoints"
    );

    if points.len() < MIN_HULL_POINTS {
        Err(InsufficientKeypoints { found: points.len() })
    } else {
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kp(x: f64, y: f64, score: f64) -> Keypoint {
        Keypoint::new("nose", x, y, score)
    }

    #[test]
    fn test_score_filter() {
        let keypoints = vec![kp(1.0, 1.0, 0.9), kp(2.0, 2.0, 0.29), kp(3.0, 1.0, 0.3), kp(4.0, 4.0, 0.5)];
        let points = project_keypoints(&keypoints, &Projection::Identity, 0.3, 10, 10).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[1], Point::new(3.0, 1.0));
    }

    #[test]
    fn test_insufficient_keypoints() {
        let keypoints = vec![kp(1.0, 1.0, 0.9), kp(2.0, 2.0, 0.1), kp(3.0, 3.0, f64::NAN)];
        assert_eq!(
            project_keypoints(&keypoints, &Projection::Identity, 0.3, 10, 10),
            Err(InsufficientKeypoints { found: 1 })
        );
    }

    #[test]
    fn test_affine_projection() {
        let projection = Projection::Affine {
            scale_x: 0.5,
            scale_y: 2.0,
            offset_x: 10.0,
            offset_y: -1.0,
        };
        assert_eq!(projection.apply(4.0, 3.0, 100, 100), Some(Point::new(12.0, 5.0)));
    }

    #[test]
    fn test_image_projection_with_crop() {
        let projection = Projection::FromImage {
            image_width: 1000.0,
            image_height: 800.0,
            crop: Some(CropWindow {
                x: 100.0,
                y: 200.0,
                width: 400.0,
                height: 200.0,
            }),
            server_crop: None,
        };
        // Middle of the crop lands in the middle of the raster
        assert_eq!(projection.apply(300.0, 300.0, 200, 100), Some(Point::new(100.0, 50.0)));
        // Outside the crop is dropped
        assert_eq!(projection.apply(50.0, 300.0, 200, 100), None);

        let uncropped = Projection::FromImage {
            image_width: 1000.0,
            image_height: 800.0,
            crop: None,
            server_crop: None,
        };
        assert_eq!(uncropped.apply(500.0, 200.0, 100, 80), Some(Point::new(50.0, 20.0)));
    }

    #[test]
    fn test_image_projection_with_server_crop() {
        // 1000x800 photo, client crop of 500x400 at (100, 100), uploaded at
        // 1000x800 and cut to the 500x400 window at (200, 200) on the server
        let projection = Projection::FromImage {
            image_width: 1000.0,
            image_height: 800.0,
            crop: Some(CropWindow {
                x: 100.0,
                y: 100.0,
                width: 500.0,
                height: 400.0,
            }),
            server_crop: Some(ServerCrop {
                original_width: 1000.0,
                original_height: 800.0,
                x: 200.0,
                y: 200.0,
                width: 500.0,
                height: 400.0,
            }),
        };
        // (350, 300) -> client (250, 200) -> upload (500, 400) -> window (300, 200)
        assert_eq!(projection.apply(350.0, 300.0, 100, 80), Some(Point::new(60.0, 40.0)));
        // Client crop still discards
        assert_eq!(projection.apply(50.0, 300.0, 100, 80), None);

        // Without a client crop the upload is scaled from the full image
        let projection = Projection::FromImage {
            image_width: 500.0,
            image_height: 400.0,
            crop: None,
            server_crop: Some(ServerCrop {
                original_width: 1000.0,
                original_height: 800.0,
                x: 0.0,
                y: 0.0,
                width: 1000.0,
                height: 800.0,
            }),
        };
        assert_eq!(projection.apply(250.0, 100.0, 100, 80), Some(Point::new(50.0, 20.0)));

        // A zero-width server window is ignored
        let projection = Projection::FromImage {
            image_width: 1000.0,
            image_height: 800.0,
            crop: None,
            server_crop: Some(ServerCrop {
                original_width: 1000.0,
                original_height: 800.0,
                x: 0.0,
                y: 0.0,
                width: 0.0,
                height: 0.0,
            }),
        };
        assert_eq!(projection.apply(500.0, 200.0, 100, 80), Some(Point::new(50.0, 20.0)));
    }

    #[test]
    fn test_server_crop_json_is_optional() {
        let projection: Projection = serde_json::from_str(
            r#"{"FromImage":{"image_width":100.0,"image_height":50.0,"crop":null}}"#,
        )
        .unwrap();
        assert_eq!(
            projection,
            Projection::FromImage {
                image_width: 100.0,
                image_height: 50.0,
                crop: None,
                server_crop: None,
            }
        );
    }

    #[test]
    fn test_blazepose_names_and_json() {
        assert_eq!(BLAZEPOSE_KEYPOINTS.len(), 33);
        let parsed: Vec<Keypoint> = serde_json::from_str(
            r#"[{"name":"left_hip","x":10.5,"y":20.0,"score":0.8},
                {"name":"tail","x":1.0,"y":2.0,"score":0.4}]"#,
        )
        .unwrap();
        assert_eq!(parsed[0].blazepose_index(), Some(23));
        assert_eq!(parsed[1].blazepose_index(), None);
    }
}
