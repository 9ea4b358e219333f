//! Vector similarity.

/// Similarity reported for vectors that cannot be compared.
pub const UNMATCHED: f32 = -1.0;

/// Cosine similarity `dot(a, b) / (‖a‖·‖b‖)`.
///
/// Returns [`UNMATCHED`] instead of failing when either vector has zero norm,
/// when the lengths differ, or when the result is not finite. Accumulates in
/// `f64` and is exactly symmetric in its arguments.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return UNMATCHED;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return UNMATCHED;
    }

    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !sim.is_finite() {
        return UNMATCHED;
    }
    sim.clamp(-1.0, 1.0) as f32
}
