//! Digital Signal Processing for audio
//!
//! Filters applied to TIA samples before they enter a resampler.

use std::f32::consts::PI;

/// Single-pole high-pass filter
///
/// The TIA only ever produces non-negative levels; this strips the
/// resulting DC bias.
#[derive(Debug, Clone)]
pub struct HighPassFilter {
    /// Feedback coefficient, `RC / (RC + dt)`
    alpha: f32,

    last_in: f32,
    last_out: f32,
}

impl HighPassFilter {
    /// Filter for samples at `sample_rate` Hz with corner frequency `cutoff`
    pub fn new(sample_rate: u32, cutoff: f32) -> Self {
        let rc = 1.0 / (2.0 * PI * cutoff);
        let dt = 1.0 / sample_rate.max(1) as f32;

        HighPassFilter {
            alpha: rc / (rc + dt),
            last_in: 0.0,
            last_out: 0.0,
        }
    }

    pub fn process(&mut self, sample: f32) -> f32 {
        let out = self.alpha * (self.last_out + sample - self.last_in);
        self.last_in = sample;
        self.last_out = out;
        out
    }

    pub fn reset(&mut self) {
        self.last_in = 0.0;
        self.last_out = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_pass_removes_dc() {
        let mut filter = HighPassFilter::new(31440, 10.0);
        let mut last = 1.0;
        for _ in 0..31440 {
            last = filter.process(0.5);
        }
        assert!(last.abs() < 1e-3);
    }

    #[test]
    fn test_high_pass_passes_steps() {
        let mut filter = HighPassFilter::new(31440, 10.0);
        let first = filter.process(1.0);
        assert!(first > 0.99 && first <= 1.0);
    }

    #[test]
    fn test_reset_forgets_history() {
        let mut filter = HighPassFilter::new(48000, 40.0);
        filter.process(1.0);
        filter.reset();
        assert_eq!(filter.process(0.0), 0.0);
    }
}
