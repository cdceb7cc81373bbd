//! Vector similarity.

/// Cosine similarity between two vectors.
///
/// The dot product runs over the shorter of the two lengths (dimension
/// mismatches come from model changes between writes). A zero denominator
/// yields 0.0 rather than a division error.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }

    let mut dot = 0.0f32;
    for i in 0..len {
        dot += a[i] * b[i];
    }

    let mag_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    let denominator = mag_a * mag_b;
    if denominator == 0.0 {
        return 0.0;
    }

    dot / denominator
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors_score_one() {
        let v = vec![0.3f32, -0.7, 1.2, 0.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_orthogonal_vectors_score_zero() {
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_opposite_vectors_score_negative_one() {
        let a = vec![1.0f32, 2.0];
        let b = vec![-1.0f32, -2.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        let a = vec![1.0f32, 2.0];
        let zero = vec![0.0f32, 0.0];
        assert_eq!(cosine_similarity(&a, &zero), 0.0);
    }

    #[test]
    fn test_empty_vector_scores_zero() {
        let a = vec![1.0f32, 2.0];
        assert_eq!(cosine_similarity(&a, &[]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_mismatched_lengths_use_shorter() {
        let a = vec![1.0f32, 0.0];
        let b = vec![1.0f32, 0.0, 5.0, 5.0];
        // Dot runs over two components; magnitudes use the full vectors.
        let score = cosine_similarity(&a, &b);
        assert!(score > 0.0 && score < 1.0);
    }
}
