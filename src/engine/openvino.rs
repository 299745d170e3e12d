//! OpenVINO-backed face engine
//!
//! SCRFD face detection plus ArcFace-style embedding. Both models are
//! compiled once at startup and stay resident for the service lifetime.

use std::sync::Arc;

use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::Array4;
use openvino::{CompiledModel, Core, ElementType, InferRequest, Shape, Tensor};
use tracing::{debug, info};

use crate::config::Config;
use crate::utils::math::l2_normalize;

use super::{FaceEngine, FaceObservation};

const DETECTOR_INPUT_SIZE: (u32, u32) = (640, 640);
const EMBEDDER_INPUT_SIZE: (u32, u32) = (112, 112);

/// SCRFD feature-map strides; each has a scores and a bbox output
const DETECTION_STRIDES: [u32; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;
const NMS_IOU_THRESHOLD: f32 = 0.4;

/// Relative margin added around a detected box before embedding
const CROP_MARGIN: f32 = 0.08;

/// OpenVINO compiled models are thread-safe in C++, but the Rust bindings
/// require `&mut self` for request creation and are not `Send`/`Sync`.
/// We bypass that restriction the same way for both models.
struct SafeModel(Arc<CompiledModel>);

unsafe impl Send for SafeModel {}
unsafe impl Sync for SafeModel {}

impl SafeModel {
    fn create_infer_request(&self) -> Result<InferRequest> {
        unsafe {
            let ptr = Arc::as_ptr(&self.0) as *mut CompiledModel;
            (*ptr).create_infer_request().map_err(|e| e.into())
        }
    }
}

/// Raw detection before embedding, in source-image coordinates
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// SCRFD detector + ArcFace embedder on OpenVINO
pub struct OpenVinoEngine {
    detector: SafeModel,
    embedder: SafeModel,
    detection_confidence: f32,
    embedding_dim: usize,
}

impl OpenVinoEngine {
    pub fn new(config: &Config) -> Result<Self> {
        let mut core = Core::new()?;
        let device = config.inference.device.clone();

        let detector = compile_model(&mut core, &config.models.detector.to_string_lossy(), &device)
            .context("Failed to load detector model")?;
        let embedder = compile_model(&mut core, &config.models.embedder.to_string_lossy(), &device)
            .context("Failed to load embedder model")?;

        Ok(Self {
            detector,
            embedder,
            detection_confidence: config.recognition.detection_confidence,
            embedding_dim: config.recognition.embedding_dim,
        })
    }

    /// Run SCRFD detection and return NMS-filtered candidates.
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Candidate>> {
        let (orig_w, orig_h) = image.dimensions();
        let (in_w, in_h) = DETECTOR_INPUT_SIZE;

        // Letterbox into the detector input, anchored top-left so that
        // mapping back is a single division by the scale factor
        let scale = f32::min(in_w as f32 / orig_w as f32, in_h as f32 / orig_h as f32);
        let new_w = ((orig_w as f32 * scale) as u32).clamp(1, in_w);
        let new_h = ((orig_h as f32 * scale) as u32).clamp(1, in_h);
        let resized = image.resize_exact(new_w, new_h, FilterType::Lanczos3).to_rgb8();
        let mut canvas = image::RgbImage::new(in_w, in_h);
        image::imageops::replace(&mut canvas, &resized, 0, 0);

        let input = image_to_nchw(&DynamicImage::ImageRgb8(canvas));
        let request = run_inference(&self.detector, &input)?;

        let mut candidates = Vec::new();
        for (idx, &stride) in DETECTION_STRIDES.iter().enumerate() {
            let scores = read_tensor_f32(&request.get_output_tensor_by_index(idx)?)?;
            let boxes = read_tensor_f32(&request.get_output_tensor_by_index(idx + DETECTION_STRIDES.len())?)?;

            let cells_w = (in_w / stride) as usize;
            let cells_h = (in_h / stride) as usize;
            let anchor_count = cells_w * cells_h * ANCHORS_PER_CELL;

            for i in 0..anchor_count.min(scores.len()) {
                let score = scores[i];
                if score < self.detection_confidence {
                    continue;
                }
                let bbox_idx = i * 4;
                if bbox_idx + 3 >= boxes.len() {
                    continue;
                }

                let cell = i / ANCHORS_PER_CELL;
                let cx = ((cell % cells_w) as u32 * stride) as f32;
                let cy = ((cell / cells_w) as u32 * stride) as f32;

                // Distances to the box edges, in stride units
                let left = boxes[bbox_idx] * stride as f32;
                let top = boxes[bbox_idx + 1] * stride as f32;
                let right = boxes[bbox_idx + 2] * stride as f32;
                let bottom = boxes[bbox_idx + 3] * stride as f32;

                candidates.push(Candidate {
                    x1: ((cx - left) / scale).clamp(0.0, orig_w as f32),
                    y1: ((cy - top) / scale).clamp(0.0, orig_h as f32),
                    x2: ((cx + right) / scale).clamp(0.0, orig_w as f32),
                    y2: ((cy + bottom) / scale).clamp(0.0, orig_h as f32),
                    score,
                });
            }
        }

        Ok(nms(candidates))
    }

    /// Crop a candidate box and run the embedder on it.
    fn embed(&self, image: &DynamicImage, candidate: &Candidate) -> Result<Vec<f32>> {
        let (orig_w, orig_h) = image.dimensions();
        let margin_x = (candidate.x2 - candidate.x1) * CROP_MARGIN;
        let margin_y = (candidate.y2 - candidate.y1) * CROP_MARGIN;

        let x1 = (candidate.x1 - margin_x).max(0.0) as u32;
        let y1 = (candidate.y1 - margin_y).max(0.0) as u32;
        let x2 = ((candidate.x2 + margin_x) as u32).min(orig_w);
        let y2 = ((candidate.y2 + margin_y) as u32).min(orig_h);
        let w = x2.saturating_sub(x1);
        let h = y2.saturating_sub(y1);
        if w == 0 || h == 0 {
            anyhow::bail!("Degenerate face crop {}x{}", w, h);
        }

        let (target_w, target_h) = EMBEDDER_INPUT_SIZE;
        let crop = image
            .crop_imm(x1, y1, w, h)
            .resize_exact(target_w, target_h, FilterType::Lanczos3);

        let input = image_to_nchw(&crop);
        let request = run_inference(&self.embedder, &input)?;
        let output = read_tensor_f32(&request.get_output_tensor()?)?;
        if output.len() < self.embedding_dim {
            anyhow::bail!(
                "Embedder produced {} values, expected {}",
                output.len(),
                self.embedding_dim
            );
        }

        let mut embedding = output[..self.embedding_dim].to_vec();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

impl FaceEngine for OpenVinoEngine {
    fn extract(&self, image: &DynamicImage) -> Result<Vec<FaceObservation>> {
        let candidates = self.detect(image)?;
        debug!("Detected {} face(s)", candidates.len());

        let mut observations = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let embedding = self.embed(image, candidate)?;
            observations.push(FaceObservation {
                bbox: [
                    candidate.x1.round() as i32,
                    candidate.y1.round() as i32,
                    candidate.x2.round() as i32,
                    candidate.y2.round() as i32,
                ],
                embedding,
            });
        }
        Ok(observations)
    }
}

fn compile_model(core: &mut Core, path: &str, device: &str) -> Result<SafeModel> {
    info!("Loading model from {}", path);
    let model = core.read_model_from_file(path, "")?;
    let compiled = core.compile_model(&model, device.into())?;
    Ok(SafeModel(Arc::new(compiled)))
}

/// Copy an NCHW tensor into the model and run synchronous inference.
fn run_inference(model: &SafeModel, input: &Array4<f32>) -> Result<InferRequest> {
    let mut request = model.create_infer_request()?;

    let dims: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
    let shape = Shape::new(&dims)?;
    let mut tensor = Tensor::new(ElementType::F32, &shape)?;

    let data = input.as_slice().unwrap();
    unsafe {
        let dst = tensor.get_raw_data_mut()?.as_mut_ptr() as *mut f32;
        std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
    }

    request.set_input_tensor(&tensor)?;
    request.infer()?;
    Ok(request)
}

fn read_tensor_f32(tensor: &Tensor) -> Result<Vec<f32>> {
    let dims: Vec<i64> = tensor.get_shape()?.get_dimensions().to_vec();
    let len: i64 = dims.iter().product();

    let data = unsafe {
        let ptr = tensor.get_raw_data()?.as_ptr() as *const f32;
        std::slice::from_raw_parts(ptr, len as usize).to_vec()
    };
    Ok(data)
}

/// Convert to NCHW with InsightFace normalization.
/// These models expect BGR channel order, not RGB.
fn image_to_nchw(image: &DynamicImage) -> Array4<f32> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for y in 0..height {
        for x in 0..width {
            let pixel = rgb.get_pixel(x, y);
            tensor[[0, 0, y as usize, x as usize]] = (pixel[2] as f32 - 127.5) / 128.0;
            tensor[[0, 1, y as usize, x as usize]] = (pixel[1] as f32 - 127.5) / 128.0;
            tensor[[0, 2, y as usize, x as usize]] = (pixel[0] as f32 - 127.5) / 128.0;
        }
    }
    tensor
}

/// Greedy non-maximum suppression, highest score first.
fn nms(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if keep.iter().all(|kept| kept.iou(&candidate) < NMS_IOU_THRESHOLD) {
            keep.push(candidate);
        }
    }
    keep
}
