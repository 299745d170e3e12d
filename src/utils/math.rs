//! Math utility functions

/// L2 normalize a vector in place
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Average several embeddings into one unit-length vector.
///
/// Used at enrollment to fold multiple photos of the same person into a
/// single gallery entry. Returns `None` for an empty input or when the
/// vectors disagree on length.
pub fn mean_embedding(embeddings: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = embeddings.first()?;
    let dim = first.len();
    if dim == 0 || embeddings.iter().any(|e| e.len() != dim) {
        return None;
    }

    let mut mean = vec![0.0f32; dim];
    for embedding in embeddings {
        for (m, x) in mean.iter_mut().zip(embedding.iter()) {
            *m += x;
        }
    }
    let n = embeddings.len() as f32;
    for m in mean.iter_mut() {
        *m /= n;
    }
    l2_normalize(&mut mean);
    Some(mean)
}
