//! Circular sample history for FIR convolution

/// Fixed-size ring of samples, oldest sample at `first`
#[derive(Debug, Clone)]
pub struct ConvolutionBuffer {
    /// Sample storage
    data: Vec<f32>,

    /// Index of the oldest sample
    first: usize,
}

impl ConvolutionBuffer {
    /// Create a zero-filled buffer holding `size` samples
    pub fn new(size: usize) -> Self {
        ConvolutionBuffer {
            data: vec![0.0; size],
            first: 0,
        }
    }

    /// Evict the oldest sample and append `value` as the newest
    pub fn shift(&mut self, value: f32) {
        if self.data.is_empty() {
            return;
        }

        self.data[self.first] = value;
        self.first = (self.first + 1) % self.data.len();
    }

    /// Dot product of the history (oldest first) with `kernel`
    pub fn convolute_with(&self, kernel: &[f32]) -> f32 {
        let size = self.data.len();
        let mut result = 0.0;

        for (i, k) in kernel.iter().take(size).enumerate() {
            result += k * self.data[(self.first + i) % size];
        }

        result
    }

    /// Number of samples held
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convolution_starts_silent() {
        let buffer = ConvolutionBuffer::new(4);
        assert_eq!(buffer.convolute_with(&[1.0, 1.0, 1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_convolution_oldest_first() {
        let mut buffer = ConvolutionBuffer::new(3);
        buffer.shift(1.0);
        buffer.shift(2.0);
        buffer.shift(3.0);

        // Oldest sample meets kernel[0]
        assert_eq!(buffer.convolute_with(&[1.0, 0.0, 0.0]), 1.0);
        assert_eq!(buffer.convolute_with(&[0.0, 0.0, 1.0]), 3.0);

        buffer.shift(4.0);
        assert_eq!(buffer.convolute_with(&[1.0, 0.0, 0.0]), 2.0);
        assert_eq!(buffer.convolute_with(&[1.0, 10.0, 100.0]), 2.0 + 30.0 + 400.0);
    }
}
