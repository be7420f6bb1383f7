//! # Scalar quantization
//!
//! Symmetric int8 quantization of embedding components. The clipping bound
//! is the requested quantile of absolute component values, so a few outliers
//! do not waste the int8 range.

const HISTOGRAM_BINS: usize = 2048;

/// Fixed-bin histogram of absolute values in `[0, max]`.
#[derive(Debug, Clone)]
pub struct AbsHistogram {
    max: f32,
    bins: Vec<u64>,
    total: u64,
}

impl AbsHistogram {
    /// Histogram for values whose magnitude does not exceed `max`.
    pub fn new(max: f32) -> Self {
        Self {
            max: max.abs(),
            bins: vec![0; HISTOGRAM_BINS],
            total: 0,
        }
    }

    pub fn add(&mut self, values: &[f32]) {
        if self.max == 0.0 {
            self.total += values.len() as u64;
            return;
        }
        for v in values {
            let position = (v.abs() / self.max * HISTOGRAM_BINS as f32) as usize;
            self.bins[position.min(HISTOGRAM_BINS - 1)] += 1;
            self.total += 1;
        }
    }

    /// Upper edge of the bin holding the `q` quantile.
    pub fn quantile(&self, q: f32) -> f32 {
        if self.total == 0 || self.max == 0.0 {
            return self.max;
        }
        let target = (q.clamp(0.0, 1.0) as f64 * self.total as f64).ceil() as u64;
        let mut seen = 0u64;
        for (i, count) in self.bins.iter().enumerate() {
            seen += count;
            if seen >= target.max(1) {
                return (i + 1) as f32 / HISTOGRAM_BINS as f32 * self.max;
            }
        }
        self.max
    }
}

/// Largest absolute value across `rows`.
pub fn max_abs<R: AsRef<[f32]>>(rows: &[R]) -> f32 {
    rows.iter()
        .flat_map(|r| r.as_ref().iter())
        .fold(0.0f32, |m, v| m.max(v.abs()))
}

/// Maps `f32` components to `i8` with a fixed symmetric bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarQuantizer {
    bound: f32,
}

impl ScalarQuantizer {
    /// Quantizer clipping at `bound`. A non-positive bound falls back to 1.
    pub fn new(bound: f32) -> Self {
        let bound = if bound.is_finite() && bound > 0.0 { bound } else { 1.0 };
        Self { bound }
    }

    /// Fits the bound to the `quantile` of absolute values in `rows`.
    pub fn fit<R: AsRef<[f32]>>(rows: &[R], quantile: f32) -> Self {
        let mut histogram = AbsHistogram::new(max_abs(rows));
        for row in rows {
            histogram.add(row.as_ref());
        }
        Self::new(histogram.quantile(quantile))
    }

    pub fn bound(&self) -> f32 {
        self.bound
    }

    fn scale(&self) -> f32 {
        self.bound / i8::MAX as f32
    }

    /// Quantizes one vector, clipping values beyond the bound.
    pub fn encode(&self, v: &[f32]) -> Vec<i8> {
        let scale = self.scale();
        v.iter()
            .map(|x| (x / scale).round().clamp(-(i8::MAX as f32), i8::MAX as f32) as i8)
            .collect()
    }

    pub fn encode_rows<R: AsRef<[f32]>>(&self, rows: &[R]) -> Vec<Vec<i8>> {
        rows.iter().map(|r| self.encode(r.as_ref())).collect()
    }

    /// Approximate dot product of two quantized vectors.
    #[inline]
    pub fn dot(&self, a: &[i8], b: &[i8]) -> f32 {
        let raw: i32 = a.iter().zip(b).map(|(&x, &y)| x as i32 * y as i32).sum();
        raw as f32 * self.scale() * self.scale()
    }

    /// MaxSim over quantized rows.
    pub fn max_sim_quantized<Q, D>(&self, query: &[Q], document: &[D]) -> f32
    where
        Q: AsRef<[i8]>,
        D: AsRef<[i8]>,
    {
        if document.is_empty() {
            return 0.0;
        }
        query
            .iter()
            .map(|q| {
                document
                    .iter()
                    .map(|d| self.dot(q.as_ref(), d.as_ref()))
                    .fold(f32::NEG_INFINITY, f32::max)
            })
            .sum()
    }
}
