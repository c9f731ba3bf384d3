use super::*;

struct FixedEmbedder {
    dimension: usize,
    output: Vec<Vec<f32>>,
}

impl Embedder for FixedEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(self.output.clone())
    }
}

fn norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

#[test]
fn normalize_produces_unit_vectors() {
    let mut vector = vec![3.0, 4.0];
    normalize(&mut vector);
    assert!((vector[0] - 0.6).abs() < 1e-6);
    assert!((vector[1] - 0.8).abs() < 1e-6);
    assert!((norm(&vector) - 1.0).abs() < 1e-6);
}

#[test]
fn normalize_leaves_zero_vector_alone() {
    let mut vector = vec![0.0; 4];
    normalize(&mut vector);
    assert_eq!(vector, vec![0.0; 4]);
}

#[test]
fn embed_normalized_normalizes_each_vector() {
    let embedder = FixedEmbedder {
        dimension: 3,
        output: vec![vec![2.0, 0.0, 0.0], vec![1.0, 1.0, 1.0]],
    };

    let vectors = embed_normalized(&embedder, &["a".to_string(), "b".to_string()])
        .expect("embedding succeeds");

    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[0], vec![1.0, 0.0, 0.0]);
    assert!((norm(&vectors[1]) - 1.0).abs() < 1e-6);
}

#[test]
fn embed_normalized_rejects_wrong_dimension() {
    let embedder = FixedEmbedder {
        dimension: 4,
        output: vec![vec![1.0, 0.0, 0.0]],
    };

    let err = embed_normalized(&embedder, &["a".to_string()]).expect_err("dimension mismatch");
    assert!(matches!(err, LookupError::Embedding(_)));
}

#[test]
fn embed_normalized_rejects_count_mismatch() {
    let embedder = FixedEmbedder {
        dimension: 2,
        output: vec![vec![1.0, 0.0]],
    };

    let err = embed_normalized(&embedder, &["a".to_string(), "b".to_string()])
        .expect_err("count mismatch");
    assert!(err.to_string().contains("Expected 2 embeddings"));
}

#[test]
fn embed_normalized_rejects_nan() {
    let embedder = FixedEmbedder {
        dimension: 2,
        output: vec![vec![f32::NAN, 1.0]],
    };

    assert!(embed_normalized(&embedder, &["a".to_string()]).is_err());
}

#[test]
fn empty_input_skips_embedder() {
    let embedder = FixedEmbedder {
        dimension: 2,
        output: vec![vec![1.0, 0.0]],
    };

    let vectors = embed_normalized(&embedder, &[]).expect("empty input is fine");
    assert!(vectors.is_empty());
}

#[test]
fn embed_query_returns_single_unit_vector() {
    let embedder = FixedEmbedder {
        dimension: 2,
        output: vec![vec![0.0, 5.0]],
    };

    let vector = embed_query(&embedder, "query").expect("embedding succeeds");
    assert_eq!(vector, vec![0.0, 1.0]);
}
