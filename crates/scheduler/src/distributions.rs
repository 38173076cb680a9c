//! Empirical distributions fitted to the Google cluster trace, used to
//! estimate how many input blocks a task of a given expected runtime reads.

/// Maps an expected runtime (milliseconds) to a cumulative probability.
/// Log-logistic fit: `F(r) = 1 - mu * r^sigma`, clamped to [0, 1].
#[derive(Debug, Clone, Copy)]
pub struct RuntimeDistribution {
    mu: f64,
    sigma: f64,
}

impl RuntimeDistribution {
    pub fn new(mu: f64, sigma: f64) -> Self {
        Self { mu, sigma }
    }

    /// Parameters fitted to the Google trace runtime CDF.
    pub fn google() -> Self {
        Self::new(0.298, -0.2627)
    }

    pub fn cumulative(&self, runtime_ms: u64) -> f64 {
        let r = runtime_ms.max(1) as f64;
        (1.0 - self.mu * r.powf(self.sigma)).clamp(0.0, 1.0)
    }
}

/// Maps a cumulative probability to a number of input blocks. A fixed
/// share of the mass sits at `min_blocks`; above it the block count is
/// log2-linear up to `max_blocks`.
#[derive(Debug, Clone, Copy)]
pub struct BlockDistribution {
    percent_min: f64,
    min_blocks: u64,
    max_blocks: u64,
}

impl BlockDistribution {
    pub fn new(percent_min: u32, min_blocks: u64, max_blocks: u64) -> Self {
        Self {
            percent_min: percent_min as f64 / 100.0,
            min_blocks,
            max_blocks,
        }
    }

    /// Parameters scaled up from the Google trace block counts.
    pub fn google() -> Self {
        Self::new(10, 1, 167_772_160)
    }

    pub fn inverse(&self, p: f64) -> u64 {
        let p = p.clamp(0.0, 1.0);
        if p <= self.percent_min {
            return self.min_blocks;
        }
        let x = (p - self.percent_min) / (1.0 - self.percent_min);
        let min_log = (self.min_blocks as f64).log2();
        let max_log = (self.max_blocks as f64).log2();
        let blocks = (x * (max_log - min_log) + min_log).exp2().round() as u64;
        blocks.clamp(self.min_blocks, self.max_blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_cdf_is_monotone_and_bounded() {
        let dist = RuntimeDistribution::google();
        let mut last = 0.0;
        for runtime in [1u64, 10, 100, 1_000, 10_000, 100_000] {
            let p = dist.cumulative(runtime);
            assert!((0.0..=1.0).contains(&p), "p={p} out of range");
            assert!(p >= last, "CDF must be non-decreasing");
            last = p;
        }
    }

    #[test]
    fn runtime_cdf_approaches_one() {
        let dist = RuntimeDistribution::google();
        assert!(dist.cumulative(u64::MAX / 2) > 0.99);
    }

    #[test]
    fn block_inverse_floor_mass() {
        let dist = BlockDistribution::google();
        assert_eq!(dist.inverse(0.0), 1);
        assert_eq!(dist.inverse(0.05), 1);
        assert_eq!(dist.inverse(0.10), 1);
    }

    #[test]
    fn block_inverse_spans_range() {
        let dist = BlockDistribution::google();
        assert_eq!(dist.inverse(1.0), 167_772_160);
        let mid = dist.inverse(0.55);
        assert!(mid > 1 && mid < 167_772_160);
    }

    #[test]
    fn block_inverse_is_monotone() {
        let dist = BlockDistribution::google();
        let mut last = 0;
        for i in 0..=20 {
            let blocks = dist.inverse(i as f64 / 20.0);
            assert!(blocks >= last);
            last = blocks;
        }
    }
}
