//! Statistical primitives shared by the generation engines.
//!
//! All randomness flows through an explicit [`RandomSource`] so that a seeded
//! source reproduces a generation run exactly. The descriptive statistics
//! ([`percentile`], [`mean`], [`standard_deviation`]) are plain functions.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::f64::consts::PI;
use uuid::Uuid;

/// Lambda above which the Poisson draw switches to a normal approximation.
const POISSON_NORMAL_CUTOFF: f64 = 30.0;

/// Rescaling divisor for [`RandomSource::exponential_random`]: the mean of
/// the draw sits at one fifth of the range above `min`.
const EXPONENTIAL_RANGE_DIVISOR: f64 = 5.0;

/// Injectable pseudo-random source.
#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: StdRng,
}

impl RandomSource {
    /// Reproducible source.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Non-reproducible source seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Seeded when `seed` is set, entropy-backed otherwise.
    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }

    /// Derive an independent child source, e.g. one per parallel task.
    pub fn fork(&mut self) -> Self {
        Self::seeded(self.rng.next_u64())
    }

    /// Next raw 64-bit value.
    pub fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    /// Uniform float in `[0, 1)`.
    pub fn unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Uniform float in `[min, max)`; returns `min` for an empty range.
    pub fn uniform(&mut self, min: f64, max: f64) -> f64 {
        if max <= min {
            return min;
        }
        self.rng.gen_range(min..max)
    }

    /// Uniform integer in `[min, max]`; returns `min` when `max < min`.
    pub fn int_between(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        self.rng.gen_range(min..=max)
    }

    /// Uniform index in `[0, len)`. `len` must be non-zero.
    pub fn index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }

    /// Bernoulli trial; `p` is clamped into `[0, 1]`.
    pub fn chance(&mut self, p: f64) -> bool {
        if p.is_nan() {
            return false;
        }
        self.rng.gen_bool(p.clamp(0.0, 1.0))
    }

    /// Normally distributed value via the Box-Muller transform.
    pub fn gaussian(&mut self, mu: f64, sigma: f64) -> f64 {
        // u1 == 0 would make ln(u1) infinite
        let u1 = self.unit().max(f64::EPSILON);
        let u2 = self.unit();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
        mu + sigma * z
    }

    /// Exponentially distributed value rescaled into `[min, max]`, skewed
    /// toward `min`. Used for latencies and incident durations.
    pub fn exponential_random(&mut self, min: f64, max: f64) -> f64 {
        if max <= min {
            return min;
        }
        let u = self.unit().max(f64::EPSILON);
        let draw = -u.ln();
        let scale = (max - min) / EXPONENTIAL_RANGE_DIVISOR;
        (min + draw * scale).clamp(min, max)
    }

    /// Poisson-distributed count using Knuth's multiplication method.
    pub fn poisson_random(&mut self, lambda: f64) -> u64 {
        if !(lambda > 0.0) {
            return 0;
        }
        if lambda > POISSON_NORMAL_CUTOFF {
            let approx = self.gaussian(lambda, lambda.sqrt()).round();
            return approx.max(0.0) as u64;
        }

        let limit = (-lambda).exp();
        let mut count = 0u64;
        let mut product = 1.0;
        loop {
            product *= self.unit();
            if product <= limit {
                return count;
            }
            count += 1;
        }
    }

    /// In-place Fisher-Yates shuffle.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.rng.gen_range(0..=i);
            items.swap(i, j);
        }
    }

    /// `k` distinct elements drawn without replacement (`k` is clamped to the
    /// slice length).
    pub fn sample<T: Clone>(&mut self, items: &[T], k: usize) -> Vec<T> {
        let k = k.min(items.len());
        let mut indices: Vec<usize> = (0..items.len()).collect();
        // Partial Fisher-Yates: only the first k slots need settling
        for i in 0..k {
            let j = self.rng.gen_range(i..indices.len());
            indices.swap(i, j);
        }
        indices[..k].iter().map(|&i| items[i].clone()).collect()
    }

    /// Uniformly chosen element, `None` for an empty slice.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.index(items.len());
        items.get(idx)
    }

    /// Index drawn from a categorical distribution. Non-positive weights are
    /// never selected; returns `None` when no weight is positive.
    pub fn weighted_choice(&mut self, weights: &[f64]) -> Option<usize> {
        let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
        if total <= 0.0 {
            return None;
        }
        let mut target = self.uniform(0.0, total);
        let mut last_positive = None;
        for (idx, &weight) in weights.iter().enumerate() {
            if weight <= 0.0 {
                continue;
            }
            if target < weight {
                return Some(idx);
            }
            target -= weight;
            last_positive = Some(idx);
        }
        last_positive
    }

    /// Lower-case hex identifier of `len` characters.
    pub fn hex_id(&mut self, len: usize) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        (0..len)
            .map(|_| HEX[self.rng.gen_range(0..16)] as char)
            .collect()
    }

    /// Random (version 4) UUID drawn from this source.
    pub fn uuid(&mut self) -> Uuid {
        let mut bytes = [0u8; 16];
        self.rng.fill_bytes(&mut bytes);
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }
}

/// Value at percentile `p` (0-100) using the ceiling-index method:
/// index `ceil(p / 100 * n) - 1`, clamped to the valid range. Empty input
/// yields 0.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let rank = (p / 100.0 * n as f64).ceil() as i64 - 1;
    let idx = rank.clamp(0, n as i64 - 1) as usize;
    sorted[idx]
}

/// Arithmetic mean; 0 for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (`n - 1` denominator); 0 for fewer than two
/// values.
pub fn standard_deviation(values: &[f64]) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }
    let avg = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - avg).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Population standard deviation (`n` denominator); 0 for empty input.
pub fn population_standard_deviation(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let avg = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - avg).powi(2)).sum();
    (sum_sq / values.len() as f64).sqrt()
}

/// Outlier cut-off shared by slow-span and metric anomaly detection:
/// `mean + 2 * population standard deviation`. Values at or above the
/// threshold are outliers. `None` when the values do not vary at all.
pub fn outlier_threshold(values: &[f64]) -> Option<f64> {
    let sd = population_standard_deviation(values);
    if values.is_empty() || sd == 0.0 {
        return None;
    }
    Some(mean(values) + 2.0 * sd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_ceiling_index() {
        assert_eq!(percentile(&[10.0, 20.0, 30.0, 40.0, 50.0], 50.0), 30.0);
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 90.0), 4.0);
        assert_eq!(percentile(&[4.0, 1.0, 3.0, 2.0], 25.0), 1.0);
        assert_eq!(percentile(&[5.0, 1.0], 0.0), 1.0);
        assert_eq!(percentile(&[5.0, 1.0], 100.0), 5.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_standard_deviation() {
        assert_eq!(standard_deviation(&[]), 0.0);
        assert_eq!(standard_deviation(&[3.0]), 0.0);
        let sd = standard_deviation(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((sd - 2.138089935).abs() < 1e-6);
        assert_eq!(population_standard_deviation(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.0);
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn test_outlier_threshold() {
        assert_eq!(outlier_threshold(&[10.0, 10.0, 10.0, 10.0, 200.0]), Some(200.0));
        assert_eq!(outlier_threshold(&[10.0, 10.0]), None);
        assert_eq!(outlier_threshold(&[]), None);
    }

    #[test]
    fn test_seeded_sources_reproduce() {
        let mut a = RandomSource::seeded(7);
        let mut b = RandomSource::seeded(7);
        let xs: Vec<f64> = (0..10).map(|_| a.gaussian(0.0, 1.0)).collect();
        let ys: Vec<f64> = (0..10).map(|_| b.gaussian(0.0, 1.0)).collect();
        assert_eq!(xs, ys);
        assert_eq!(a.hex_id(16), b.hex_id(16));
        assert_eq!(a.uuid(), b.uuid());
    }

    #[test]
    fn test_gaussian_moments() {
        let mut rng = RandomSource::seeded(1);
        let draws: Vec<f64> = (0..20_000).map(|_| rng.gaussian(10.0, 2.0)).collect();
        assert!((mean(&draws) - 10.0).abs() < 0.1);
        assert!((standard_deviation(&draws) - 2.0).abs() < 0.1);
        assert!(draws.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_exponential_random_bounds_and_skew() {
        let mut rng = RandomSource::seeded(2);
        let draws: Vec<f64> = (0..10_000)
            .map(|_| rng.exponential_random(10.0, 110.0))
            .collect();
        assert!(draws.iter().all(|v| (10.0..=110.0).contains(v)));
        // Skewed toward min: the median sits well below the midpoint
        assert!(percentile(&draws, 50.0) < 60.0);
        assert_eq!(rng.exponential_random(5.0, 5.0), 5.0);
    }

    #[test]
    fn test_poisson_random() {
        let mut rng = RandomSource::seeded(3);
        assert_eq!(rng.poisson_random(0.0), 0);
        assert_eq!(rng.poisson_random(-1.0), 0);

        let draws: Vec<f64> = (0..20_000).map(|_| rng.poisson_random(4.0) as f64).collect();
        assert!((mean(&draws) - 4.0).abs() < 0.1);

        let large: Vec<f64> = (0..5_000).map(|_| rng.poisson_random(500.0) as f64).collect();
        assert!((mean(&large) - 500.0).abs() < 2.0);
    }

    #[test]
    fn test_shuffle_and_sample() {
        let mut rng = RandomSource::seeded(4);
        let mut items: Vec<u32> = (0..50).collect();
        rng.shuffle(&mut items);
        let mut sorted = items.clone();
        sorted.sort();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());

        let picked = rng.sample(&items, 10);
        assert_eq!(picked.len(), 10);
        let mut unique = picked.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 10);

        assert_eq!(rng.sample(&[1, 2, 3], 10).len(), 3);
        assert!(rng.choose::<u32>(&[]).is_none());
        assert!(rng.choose(&[9]).is_some());
    }

    #[test]
    fn test_weighted_choice() {
        let mut rng = RandomSource::seeded(5);
        assert_eq!(rng.weighted_choice(&[0.0, 0.0]), None);
        assert_eq!(rng.weighted_choice(&[0.0, 1.0, 0.0]), Some(1));

        let mut counts = [0usize; 2];
        for _ in 0..10_000 {
            let idx = rng.weighted_choice(&[0.8, 0.2]).unwrap();
            counts[idx] += 1;
        }
        let share = counts[0] as f64 / 10_000.0;
        assert!((share - 0.8).abs() < 0.02);
    }
}
