//! Attendance service configuration

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub inference: InferenceConfig,
    pub models: ModelsConfig,
    pub recognition: RecognitionConfig,
    pub attendance: AttendanceConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    pub device: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub detector: PathBuf,
    pub embedder: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecognitionConfig {
    /// Cosine similarity cutoff; a score equal to the threshold is a match
    pub similarity_threshold: f32,
    pub embedding_dim: usize,
    pub detection_confidence: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttendanceConfig {
    /// Minimum interval between two logged events for the same employee
    pub cooldown_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub sqlite_path: PathBuf,
    pub faces_dir: PathBuf,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default_path() -> &'static str {
        "config.toml"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig { port: 8000 },
            inference: InferenceConfig {
                device: "CPU".to_string(),
            },
            models: ModelsConfig {
                detector: PathBuf::from("models/scrfd_10g_bnkps.onnx"),
                embedder: PathBuf::from("models/w600k_r50.onnx"),
            },
            recognition: RecognitionConfig {
                similarity_threshold: 0.45,
                embedding_dim: 512,
                detection_confidence: 0.5,
            },
            attendance: AttendanceConfig {
                cooldown_seconds: 60,
            },
            storage: StorageConfig {
                sqlite_path: PathBuf::from("data/attendance.db"),
                faces_dir: PathBuf::from("data/faces"),
            },
        }
    }
}
