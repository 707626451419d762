use ndarray::{Array1, ArrayViewMut1};

/// Smallest probability fed to a logarithm.
pub(crate) const PROBABILITY_EPSILON: f64 = 1e-15;

pub(crate) fn normalize_vector(vec: &Array1<f32>) -> Array1<f32> {
    let norm: f32 = vec.iter().map(|&x| x * x).sum::<f32>().sqrt();
    if norm > 1e-10 {
        vec / norm
    } else {
        Array1::zeros(vec.len())
    }
}

pub(crate) fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

pub(crate) fn softmax_inplace(mut row: ArrayViewMut1<f32>) {
    let max = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    row.mapv_inplace(|v| (v - max).exp());
    let sum = row.sum();
    if sum > 0.0 {
        row /= sum;
    }
}

pub(crate) fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
}

/// Negative natural log of `p`, with `p` clamped away from 0 and 1.
pub(crate) fn clamped_log_loss(p: f64) -> f64 {
    let p = if p.is_nan() { PROBABILITY_EPSILON } else { p };
    -p.clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_normalize_zero_vector() {
        let v = normalize_vector(&array![0.0, 0.0]);
        assert_eq!(v, array![0.0, 0.0]);
    }

    #[test]
    fn test_sigmoid_is_stable_for_large_inputs() {
        assert!((sigmoid(1000.0) - 1.0).abs() < 1e-6);
        assert!(sigmoid(-1000.0) >= 0.0);
        assert!(sigmoid(-1000.0).is_finite());
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let mut v = array![1.0f32, 2.0, 3.0];
        softmax_inplace(v.view_mut());
        assert!((v.sum() - 1.0).abs() < 1e-6);
        assert_eq!(argmax(v.as_slice().unwrap()), Some(2));
    }

    #[test]
    fn test_clamped_log_loss_is_finite() {
        assert!(clamped_log_loss(0.0).is_finite());
        assert!(clamped_log_loss(1.0).is_finite());
        assert!(clamped_log_loss(f64::NAN).is_finite());
    }
}
