//! Vector similarity primitives for multi-vector (late interaction) search.

/// Several vectors describing one item, one per token or image patch.
pub type MultiVector = Vec<Vec<f32>>;

/// Dot product over the common prefix of `a` and `b`.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scales `v` to unit length in place. Zero vectors are left as they are.
pub fn normalize(v: &mut [f32]) {
    let norm = dot(v, v).sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// MaxSim late-interaction score: for every query row, the best dot
/// product with any document row, summed over query rows.
///
/// An empty document scores zero.
pub fn max_sim<Q, D>(query: &[Q], document: &[D]) -> f32
where
    Q: AsRef<[f32]>,
    D: AsRef<[f32]>,
{
    if document.is_empty() {
        return 0.0;
    }
    query
        .iter()
        .map(|q| {
            document
                .iter()
                .map(|d| dot(q.as_ref(), d.as_ref()))
                .fold(f32::NEG_INFINITY, f32::max)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_unit_length() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn max_sim_sums_best_matches() {
        let query = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let doc = vec![vec![0.5, 0.1], vec![0.2, 0.9], vec![-1.0, -1.0]];
        // 0.5 for the first row, 0.9 for the second
        assert!((max_sim(&query, &doc) - 1.4).abs() < 1e-6);
    }

    #[test]
    fn max_sim_handles_negative_and_empty() {
        let query = vec![vec![1.0, 0.0]];
        let doc = vec![vec![-0.5, 0.0], vec![-0.2, 0.0]];
        assert!((max_sim(&query, &doc) + 0.2).abs() < 1e-6);

        let empty: Vec<Vec<f32>> = Vec::new();
        assert_eq!(max_sim(&query, &empty), 0.0);
    }
}
