//! Nearest-identity search
//!
//! Scores a probe embedding against every gallery row and selects the
//! single best identity, or none when nothing clears the threshold.

use ndarray::ArrayView1;

use crate::gallery::GallerySnapshot;

/// Sentinel name for faces that match no enrolled identity
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Result of matching one probe against a gallery snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceMatch {
    /// Index into the snapshot, `None` when no identity clears the threshold
    pub index: Option<usize>,
    /// Best cosine similarity seen; 0.0 for an empty gallery
    pub score: f32,
}

/// Find the gallery identity most similar to `probe`.
///
/// Pure: identical inputs always produce an identical result. A score
/// equal to `threshold` counts as a match. Ties on the maximum score go to
/// the lowest index (first enrolled).
pub fn find_best_match(probe: &[f32], gallery: &GallerySnapshot, threshold: f32) -> FaceMatch {
    if gallery.is_empty() || probe.len() != gallery.embedding_dim() {
        return FaceMatch { index: None, score: 0.0 };
    }

    let probe = ArrayView1::from(probe);
    let probe_norm = probe.dot(&probe).sqrt();

    let mut best_index = 0usize;
    let mut best_score = f32::NEG_INFINITY;
    for (i, row) in gallery.embeddings().outer_iter().enumerate() {
        let row_norm = row.dot(&row).sqrt();
        let score = if probe_norm > 0.0 && row_norm > 0.0 {
            probe.dot(&row) / (probe_norm * row_norm)
        } else {
            0.0
        };
        // Strict comparison keeps the first of tied maxima
        if score > best_score {
            best_index = i;
            best_score = score;
        }
    }

    if best_score >= threshold {
        FaceMatch {
            index: Some(best_index),
            score: best_score,
        }
    } else {
        FaceMatch {
            index: None,
            score: best_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::{Gallery, IdentityRecord};

    fn gallery_with(embeddings: &[(&str, Vec<f32>)]) -> Gallery {
        let dim = embeddings[0].1.len();
        let gallery = Gallery::new(dim);
        for (id, embedding) in embeddings {
            gallery
                .upsert(IdentityRecord {
                    employee_id: id.to_string(),
                    name: id.to_string(),
                    member_code: String::new(),
                    embedding: embedding.clone(),
                })
                .unwrap();
        }
        gallery
    }

    #[test]
    fn test_empty_gallery_matches_nothing() {
        let gallery = Gallery::new(4);
        let result = find_best_match(&[1.0, 0.0, 0.0, 0.0], &gallery.snapshot(), 0.5);
        assert_eq!(result, FaceMatch { index: None, score: 0.0 });
    }

    #[test]
    fn test_exact_probe_scores_one() {
        let gallery = gallery_with(&[
            ("e1", vec![0.0, 1.0, 0.0]),
            ("e2", vec![1.0, 0.0, 0.0]),
        ]);
        let result = find_best_match(&[1.0, 0.0, 0.0], &gallery.snapshot(), 0.5);
        assert_eq!(result.index, Some(1));
        assert!((result.score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let gallery = gallery_with(&[("e1", vec![1.0, 0.0])]);
        // Identical probe yields similarity 1.0; threshold 1.0 still matches
        let result = find_best_match(&[1.0, 0.0], &gallery.snapshot(), 1.0);
        assert_eq!(result.index, Some(0));
    }

    #[test]
    fn test_unattainable_threshold_yields_unknown() {
        let gallery = gallery_with(&[("e1", vec![1.0, 0.0])]);
        let result = find_best_match(&[1.0, 0.0], &gallery.snapshot(), 1.5);
        assert_eq!(result.index, None);
        assert!((result.score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_orthogonal_probe_is_unknown_but_reports_score() {
        let gallery = gallery_with(&[("e1", vec![1.0, 0.0])]);
        let result = find_best_match(&[0.0, 1.0], &gallery.snapshot(), 0.5);
        assert_eq!(result.index, None);
        assert!(result.score.abs() < 1e-6);
    }

    #[test]
    fn test_tie_breaks_to_lowest_index() {
        let gallery = gallery_with(&[
            ("e1", vec![1.0, 0.0]),
            ("e2", vec![1.0, 0.0]),
            ("e3", vec![2.0, 0.0]),
        ]);
        // All three rows have cosine similarity 1.0 with the probe
        let result = find_best_match(&[3.0, 0.0], &gallery.snapshot(), 0.5);
        assert_eq!(result.index, Some(0));
    }

    #[test]
    fn test_deterministic_for_identical_inputs() {
        let gallery = gallery_with(&[
            ("e1", vec![0.7, 0.3, 0.1]),
            ("e2", vec![0.2, 0.9, 0.4]),
        ]);
        let snapshot = gallery.snapshot();
        let probe = [0.5, 0.5, 0.2];
        let first = find_best_match(&probe, &snapshot, 0.3);
        for _ in 0..10 {
            assert_eq!(find_best_match(&probe, &snapshot, 0.3), first);
        }
    }

    #[test]
    fn test_dimension_mismatch_is_unknown() {
        let gallery = gallery_with(&[("e1", vec![1.0, 0.0, 0.0])]);
        let result = find_best_match(&[1.0, 0.0], &gallery.snapshot(), 0.1);
        assert_eq!(result, FaceMatch { index: None, score: 0.0 });
    }
}
