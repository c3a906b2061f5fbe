//! Distance functions shared by dedup, retrieval and ranking.

const NORM_EPS: f64 = 1e-50;

/// Squared Euclidean distance. Extra trailing components are ignored.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum()
}

/// `1 - cos(a, b)`, the pgvector `<=>` operator.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    1.0 - dot / ((norm_a.sqrt() + NORM_EPS) * (norm_b.sqrt() + NORM_EPS))
}

pub fn squared_l2_rgb(a: [u8; 3], b: [u8; 3]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum()
}
