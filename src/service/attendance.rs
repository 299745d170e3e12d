//! Attendance Service - Core business logic
//!
//! Orchestrates detection, matching, enrollment and cooldown-gated
//! attendance logging.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::cooldown::CooldownTracker;
use crate::engine::FaceEngine;
use crate::gallery::{Gallery, IdentityRecord};
use crate::matcher::{find_best_match, UNKNOWN_LABEL};
use crate::storage::{AttendanceEntry, AttendanceStorage, EmployeeRecord};
use crate::utils::image::decode_image;
use crate::utils::math::mean_embedding;

use super::types::*;

/// The best above-threshold face of one probe image
struct LogCandidate {
    employee_id: String,
    name: String,
    member_code: String,
    score: f32,
}

/// Face attendance service
pub struct AttendanceService<S: AttendanceStorage> {
    engine: Arc<dyn FaceEngine>,
    gallery: Arc<Gallery>,
    cooldown: Arc<CooldownTracker>,
    storage: Arc<S>,
    config: Config,
}

impl<S: AttendanceStorage> AttendanceService<S> {
    /// Create a new attendance service
    pub fn new(engine: Arc<dyn FaceEngine>, storage: Arc<S>, config: Config) -> Self {
        let gallery = Arc::new(Gallery::new(config.recognition.embedding_dim));
        let cooldown = Arc::new(CooldownTracker::new());

        Self {
            engine,
            gallery,
            cooldown,
            storage,
            config,
        }
    }

    /// Get a reference to the storage
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Get a reference to the gallery
    pub fn gallery(&self) -> &Arc<Gallery> {
        &self.gallery
    }

    /// Load every enrolled identity from the store into the gallery.
    pub async fn load_gallery(&self) -> Result<usize> {
        let dim = self.gallery.embedding_dim();
        let records = self.storage.load_employees().await?;
        let total = records.len();

        let identities: Vec<IdentityRecord> = records
            .into_iter()
            .filter_map(|record| {
                let Some(embedding) = record.decode_embedding(dim) else {
                    warn!("Dropping '{}': stored embedding is malformed", record.employee_id);
                    return None;
                };
                Some(IdentityRecord {
                    employee_id: record.employee_id,
                    name: record.name,
                    member_code: record.member_code,
                    embedding,
                })
            })
            .collect();

        let loaded = self.gallery.replace_all(identities);
        info!("Gallery loaded with {}/{} identities", loaded, total);
        Ok(loaded)
    }

    /// Recognize every face in a probe image.
    ///
    /// All faces are matched against one snapshot taken at the start of
    /// the call. The single best above-threshold face becomes the
    /// logging candidate; logging is best-effort and never fails the
    /// recognition itself. With an empty gallery every face comes back
    /// labeled "Unknown" with score 0.
    pub async fn recognize(&self, image_data: &[u8]) -> Result<RecognitionResult> {
        let start = Instant::now();

        let image = decode_image(image_data).context("Failed to decode probe image")?;

        let snapshot = self.gallery.snapshot();
        let threshold = self.config.recognition.similarity_threshold;
        let engine = self.engine.clone();

        // Detection, embedding and matching are CPU-bound
        let (faces, candidate) = tokio::task::spawn_blocking(
            move || -> Result<(Vec<RecognizedFace>, Option<LogCandidate>)> {
                let observations = engine.extract(&image)?;

                let mut faces = Vec::with_capacity(observations.len());
                let mut candidate: Option<LogCandidate> = None;

                for obs in observations {
                    let matched = find_best_match(&obs.embedding, &snapshot, threshold);
                    match matched.index {
                        Some(i) => {
                            faces.push(RecognizedFace {
                                name: snapshot.name(i).to_string(),
                                bbox: obs.bbox,
                                score: matched.score,
                                employee_id: Some(snapshot.employee_id(i).to_string()),
                            });
                            // Strict comparison keeps the first of tied
                            // scores in detection order
                            if candidate.as_ref().map_or(true, |c| matched.score > c.score) {
                                candidate = Some(LogCandidate {
                                    employee_id: snapshot.employee_id(i).to_string(),
                                    name: snapshot.name(i).to_string(),
                                    member_code: snapshot.member_code(i).to_string(),
                                    score: matched.score,
                                });
                            }
                        }
                        None => faces.push(RecognizedFace {
                            name: UNKNOWN_LABEL.to_string(),
                            bbox: obs.bbox,
                            score: matched.score,
                            employee_id: None,
                        }),
                    }
                }

                Ok((faces, candidate))
            },
        )
        .await??;

        let mut logged_employee_id = None;
        if let Some(candidate) = candidate {
            if self.try_log(&candidate).await {
                logged_employee_id = Some(candidate.employee_id);
            }
        }

        let inference_time_ms = start.elapsed().as_millis() as u64;
        debug!(
            "Recognized {} face(s) in {}ms",
            faces.len(),
            inference_time_ms
        );

        Ok(RecognitionResult {
            faces,
            logged_employee_id,
            inference_time_ms,
        })
    }

    /// Claim the cooldown slot for a candidate and append the log row.
    ///
    /// The claim is written before the append so duplicates arriving
    /// during a slow append are blocked; a failed append releases the
    /// claim, allowing an immediate retry on the next recognition.
    async fn try_log(&self, candidate: &LogCandidate) -> bool {
        let now = chrono::Utc::now().timestamp();
        let window = self.config.attendance.cooldown_seconds;

        if !self.cooldown.try_claim(&candidate.employee_id, now, window) {
            debug!(
                "Attendance for '{}' suppressed by cooldown",
                candidate.employee_id
            );
            return false;
        }

        let entry = AttendanceEntry {
            id: Uuid::new_v4().to_string(),
            employee_id: candidate.employee_id.clone(),
            name: candidate.name.clone(),
            member_code: candidate.member_code.clone(),
            timestamp: now,
        };

        match self.storage.append_attendance(&entry).await {
            Ok(()) => {
                info!(
                    "Logged attendance for '{}' (score {:.3})",
                    candidate.employee_id, candidate.score
                );
                true
            }
            Err(e) => {
                warn!(
                    "Failed to log attendance for '{}', rolling back claim: {}",
                    candidate.employee_id, e
                );
                self.cooldown.release(&candidate.employee_id);
                false
            }
        }
    }

    /// Enroll a new employee from one or more photos.
    pub async fn enroll(
        &self,
        employee_id: &str,
        name: &str,
        member_code: &str,
        images: Vec<Vec<u8>>,
    ) -> Result<EnrollResult> {
        if self.storage.get_employee(employee_id).await?.is_some() {
            return Ok(EnrollResult {
                success: false,
                message: format!("Employee with ID {} already exists", employee_id),
            });
        }
        self.enroll_inner(employee_id, name, member_code, images, false).await
    }

    /// Re-enroll an existing employee with fresh photos.
    pub async fn update_enrollment(
        &self,
        employee_id: &str,
        name: &str,
        member_code: &str,
        images: Vec<Vec<u8>>,
    ) -> Result<EnrollResult> {
        if self.storage.get_employee(employee_id).await?.is_none() {
            return Ok(EnrollResult {
                success: false,
                message: format!("Employee with ID {} not found", employee_id),
            });
        }
        self.enroll_inner(employee_id, name, member_code, images, true).await
    }

    async fn enroll_inner(
        &self,
        employee_id: &str,
        name: &str,
        member_code: &str,
        images: Vec<Vec<u8>>,
        replace: bool,
    ) -> Result<EnrollResult> {
        // One embedding per usable photo: the largest detected face
        let mut embeddings = Vec::new();
        let mut representative: Option<(DynamicImage, [i32; 4])> = None;

        for data in &images {
            let image = match decode_image(data) {
                Ok(image) => image,
                Err(e) => {
                    warn!("Skipping undecodable enrollment image: {}", e);
                    continue;
                }
            };

            let engine = self.engine.clone();
            let task_image = image.clone();
            let observations =
                tokio::task::spawn_blocking(move || engine.extract(&task_image)).await??;

            let Some(obs) = observations.into_iter().max_by_key(|o| o.area()) else {
                continue;
            };
            if representative.is_none() {
                representative = Some((image, obs.bbox));
            }
            embeddings.push(obs.embedding);
        }

        let Some(embedding) = mean_embedding(&embeddings) else {
            return Ok(EnrollResult {
                success: false,
                message: "No usable face found in the provided images".to_string(),
            });
        };

        let image_path = representative
            .and_then(|(image, bbox)| self.save_face_image(employee_id, &image, bbox));

        let now = chrono::Utc::now().timestamp();
        let record = EmployeeRecord {
            employee_id: employee_id.to_string(),
            name: name.to_string(),
            member_code: member_code.to_string(),
            embedding: EmployeeRecord::encode_embedding(&embedding),
            image_path,
            created_at: now,
            updated_at: now,
        };

        // Persist first; the gallery only changes once the store accepts
        if replace {
            self.storage.update_employee(&record).await?;
        } else {
            self.storage.save_employee(&record).await?;
        }

        self.gallery.upsert(IdentityRecord {
            employee_id: record.employee_id.clone(),
            name: record.name.clone(),
            member_code: record.member_code.clone(),
            embedding,
        })?;

        info!("Enrolled '{}' ({}) from {} image(s)", name, employee_id, embeddings.len());
        Ok(EnrollResult {
            success: true,
            message: format!("{} is stored successfully", name),
        })
    }

    /// Delete an employee from the store and the gallery.
    pub async fn remove_employee(&self, employee_id: &str) -> Result<bool> {
        let deleted = self.storage.delete_employee(employee_id).await?;
        if deleted {
            self.gallery.remove(employee_id);
            let path = self.config.storage.faces_dir.join(format!("{}.jpg", employee_id));
            let _ = std::fs::remove_file(path);
            info!("Removed employee '{}'", employee_id);
        }
        Ok(deleted)
    }

    /// Get health status
    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            healthy: true,
            version: env!("CARGO_PKG_VERSION").to_string(),
            enrolled: self.gallery.len(),
        }
    }

    /// Save the detected face crop as the representative image.
    fn save_face_image(&self, employee_id: &str, image: &DynamicImage, bbox: [i32; 4]) -> Option<String> {
        let dir = &self.config.storage.faces_dir;
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("Failed to create faces directory: {}", e);
            return None;
        }

        let (width, height) = image.dimensions();
        let x1 = bbox[0].max(0) as u32;
        let y1 = bbox[1].max(0) as u32;
        let x2 = (bbox[2].max(0) as u32).min(width);
        let y2 = (bbox[3].max(0) as u32).min(height);
        let w = x2.saturating_sub(x1);
        let h = y2.saturating_sub(y1);
        if w == 0 || h == 0 {
            return None;
        }

        let path = dir.join(format!("{}.jpg", employee_id));
        match image.crop_imm(x1, y1, w, h).to_rgb8().save(&path) {
            Ok(()) => Some(path.to_string_lossy().into_owned()),
            Err(e) => {
                warn!("Failed to save face image for '{}': {}", employee_id, e);
                None
            }
        }
    }
}
