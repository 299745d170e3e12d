//! Face detection and embedding engine
//!
//! The service only depends on the `FaceEngine` boundary: an image in,
//! zero or more (box, embedding) observations out. The OpenVINO-backed
//! implementation lives in `openvino`; tests substitute their own.

pub mod openvino;

use anyhow::Result;
use image::DynamicImage;

pub use self::openvino::OpenVinoEngine;

/// One detected face with its identity embedding
#[derive(Debug, Clone)]
pub struct FaceObservation {
    /// x1, y1, x2, y2 in source-image pixels
    pub bbox: [i32; 4],
    /// L2-normalized identity vector
    pub embedding: Vec<f32>,
}

impl FaceObservation {
    pub fn area(&self) -> i64 {
        let [x1, y1, x2, y2] = self.bbox;
        i64::from((x2 - x1).max(0)) * i64::from((y2 - y1).max(0))
    }
}

/// Detection plus embedding extraction for one image
///
/// Implementations must accept any decodable image and return an empty
/// list when no face is present; they run on the blocking thread pool and
/// must be shareable across requests.
pub trait FaceEngine: Send + Sync {
    fn extract(&self, image: &DynamicImage) -> Result<Vec<FaceObservation>>;
}
