use crate::model::Answer;

/// Encodes answers with the shared truth-weight table.
pub fn encode_history(history: &[Answer]) -> Vec<f64> {
    history.iter().map(|answer| answer.value.weight()).collect()
}

/// Cosine similarity over the common prefix of both vectors.
///
/// Returns 0 for empty or all-zero inputs.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }

    let (dot, mag_a, mag_b) = a[..len]
        .iter()
        .zip(&b[..len])
        .fold((0.0, 0.0, 0.0), |(dot, ma, mb), (x, y)| {
            (dot + x * y, ma + x * x, mb + y * y)
        });

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a.sqrt() * mag_b.sqrt())
}
