//! Windowed-sinc (Lanczos) resampler
//!
//! For source rate Fs and target rate Ft the alignment of the two sample
//! grids repeats every D target samples, where D is the denominator of Fs/Ft
//! in lowest terms. One kernel of `2 * a` taps is precomputed for each of
//! those D fractional delays; output sample n uses kernel `n mod D`.

use std::f64::consts::PI;

use super::convolution::ConvolutionBuffer;
use super::dsp::HighPassFilter;
use super::resampler::{write_frame, FragmentSource, FragmentStream, Resampler, ResamplerFormat};
use crate::util::reduced_denominator;

/// Output attenuation that leaves headroom for filter overshoot
pub const CLIPPING_FACTOR: f32 = 0.75;

/// DC removal cutoff applied to source samples (Hz)
pub const HIGH_PASS_CUT_OFF: f32 = 10.0;

/// Normalized sinc, evaluated in double precision
fn sinc(x: f32) -> f32 {
    if x == 0.0 {
        return 1.0;
    }

    let x = x as f64;
    ((PI * x).sin() / PI / x) as f32
}

fn lanczos_kernel(x: f32, a: u32) -> f32 {
    sinc(x) * sinc(x / a as f32)
}

/// Lanczos resampler with a precomputed kernel bank
pub struct LanczosResampler {
    format_from: ResamplerFormat,
    format_to: ResamplerFormat,
    stream: FragmentStream,

    /// D kernels of `kernel_size` taps, stored back to back
    kernels: Vec<f32>,
    kernel_count: usize,
    kernel_size: usize,
    current_kernel: usize,

    /// One history per source channel
    buffers: Vec<ConvolutionBuffer>,
    high_pass: Vec<HighPassFilter>,

    /// Elapsed time in units of 1 / (Fs * Ft)
    time_index: u32,
}

impl LanczosResampler {
    /// Create a resampler with Lanczos parameter `kernel_parameter` (a)
    pub fn new(
        format_from: ResamplerFormat,
        format_to: ResamplerFormat,
        source: Box<dyn FragmentSource>,
        kernel_parameter: u32,
    ) -> Self {
        let kernel_parameter = kernel_parameter.max(1);
        let kernel_count =
            reduced_denominator(format_from.sample_rate, format_to.sample_rate).max(1) as usize;
        let kernel_size = 2 * kernel_parameter as usize;
        let channels = format_from.channels();

        let mut resampler = LanczosResampler {
            format_from,
            format_to,
            stream: FragmentStream::new(source),
            kernels: vec![0.0; kernel_count * kernel_size],
            kernel_count,
            kernel_size,
            current_kernel: 0,
            buffers: (0..channels)
                .map(|_| ConvolutionBuffer::new(kernel_size))
                .collect(),
            high_pass: (0..channels)
                .map(|_| HighPassFilter::new(format_from.sample_rate, HIGH_PASS_CUT_OFF))
                .collect(),
            time_index: 0,
        };

        resampler.precompute_kernels(kernel_parameter);
        resampler
    }

    fn precompute_kernels(&mut self, a: u32) {
        // Kernels are evaluated in units of source samples; the center stays
        // within 0..1 by keeping only the fractional part of the time index.
        let mut time_index: u32 = 0;

        for kernel in self.kernels.chunks_mut(self.kernel_size) {
            let center = time_index as f32 / self.format_to.sample_rate as f32;

            for (j, tap) in kernel.iter_mut().enumerate() {
                *tap = lanczos_kernel(center - j as f32 + a as f32 - 1.0, a) * CLIPPING_FACTOR;
            }

            time_index = ((time_index as u64 + self.format_from.sample_rate as u64)
                % self.format_to.sample_rate as u64) as u32;
        }
    }

    /// Number of precomputed kernels (D)
    pub fn kernel_count(&self) -> usize {
        self.kernel_count
    }

    /// Taps per kernel
    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    /// Kernel `index` of the bank
    pub fn kernel(&self, index: usize) -> &[f32] {
        let start = index * self.kernel_size;
        &self.kernels[start..start + self.kernel_size]
    }

    fn shift_samples(&mut self, count: u32) {
        let channels = self.format_from.channels();

        for _ in 0..count {
            for channel in 0..channels {
                let sample = self.stream.sample(channels, channel);
                let filtered = self.high_pass[channel].process(sample);
                self.buffers[channel].shift(filtered);
            }

            self.stream.skip(1, self.format_from.fragment_size);
        }
    }
}

impl Resampler for LanczosResampler {
    fn fill_fragment(&mut self, fragment: &mut [f32]) {
        if !self.stream.prime() {
            fragment.fill(0.0);
            return;
        }

        let output_frames = fragment.len() / self.format_to.channels();

        for i in 0..output_frames {
            let start = self.current_kernel * self.kernel_size;
            let kernel = &self.kernels[start..start + self.kernel_size];
            self.current_kernel = (self.current_kernel + 1) % self.kernel_count;

            let left = self.buffers[0].convolute_with(kernel);
            let right = self.buffers.get(1).map(|buffer| buffer.convolute_with(kernel));
            write_frame(fragment, i, self.format_to.stereo, left, right);

            self.time_index += self.format_from.sample_rate;

            let to_shift = self.time_index / self.format_to.sample_rate;
            if to_shift == 0 {
                continue;
            }

            self.time_index %= self.format_to.sample_rate;
            self.shift_samples(to_shift);
        }
    }

    fn is_underrun(&self) -> bool {
        self.stream.is_underrun()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::resampler::PCM_SCALE;

    /// Source that replays `samples` in fragments of `fragment_size`
    fn sample_source(samples: Vec<i16>, fragment_size: usize) -> Box<dyn FragmentSource> {
        let mut offset = 0;
        Box::new(move || {
            if offset + fragment_size > samples.len() {
                return None;
            }
            let fragment = samples[offset..offset + fragment_size].to_vec();
            offset += fragment_size;
            Some(fragment)
        })
    }

    #[test]
    fn test_kernel_count_is_reduced_denominator() {
        let from = ResamplerFormat::new(32000, 64, false);
        let to = ResamplerFormat::new(48000, 64, false);
        let resampler = LanczosResampler::new(from, to, sample_source(vec![], 64), 3);
        assert_eq!(resampler.kernel_count(), 3);
        assert_eq!(resampler.kernel_size(), 6);
    }

    #[test]
    fn test_unity_kernel_is_a_scaled_impulse() {
        let from = ResamplerFormat::new(44100, 16, false);
        let to = ResamplerFormat::new(44100, 16, false);
        let resampler = LanczosResampler::new(from, to, sample_source(vec![], 16), 2);
        assert_eq!(resampler.kernel_count(), 1);

        let kernel = resampler.kernel(0);
        for (j, &tap) in kernel.iter().enumerate() {
            if j == 1 {
                assert!((tap - CLIPPING_FACTOR).abs() < 1e-6);
            } else {
                assert!(tap.abs() < 1e-6, "tap {} = {}", j, tap);
            }
        }
    }

    #[test]
    fn test_unity_ratio_is_delayed_filtered_input() {
        let a = 3;
        let fragment_size = 32;
        let input: Vec<i16> = (0..256)
            .map(|n| (((n * 7919) % 2001) as i16 - 1000) * 10)
            .collect();

        let from = ResamplerFormat::new(31440, fragment_size, false);
        let to = ResamplerFormat::new(31440, fragment_size, false);
        let source = sample_source(input.clone(), fragment_size);
        let mut resampler = LanczosResampler::new(from, to, source, a);

        let mut output = vec![0.0f32; 200];
        resampler.fill_fragment(&mut output);

        let mut filter = HighPassFilter::new(31440, HIGH_PASS_CUT_OFF);
        let filtered: Vec<f32> = input
            .iter()
            .map(|&s| filter.process(s as f32 / PCM_SCALE))
            .collect();

        // Output n sees inputs 0..n and the impulse sits a + 1 samples back
        let delay = a as usize + 1;
        for n in 0..output.len() {
            let expected = if n >= delay {
                CLIPPING_FACTOR * filtered[n - delay]
            } else {
                0.0
            };
            assert!(
                (output[n] - expected).abs() < 1e-5,
                "sample {}: {} != {}",
                n,
                output[n],
                expected
            );
        }
    }

    #[test]
    fn test_sine_two_to_three_is_continuous() {
        let rate_from = 32000;
        let rate_to = 48000;
        let frequency = 440.0f64;
        let fragment_size = 100;

        let input: Vec<i16> = (0..32000)
            .map(|n| {
                let t = n as f64 / rate_from as f64;
                ((2.0 * std::f64::consts::PI * frequency * t).sin() * 16000.0) as i16
            })
            .collect();

        let from = ResamplerFormat::new(rate_from, fragment_size, false);
        let to = ResamplerFormat::new(rate_to, 256, false);
        let mut resampler = LanczosResampler::new(from, to, sample_source(input, fragment_size), 3);

        // Several target fragments, crossing many source fragment boundaries
        let mut output = Vec::new();
        for _ in 0..120 {
            let mut fragment = vec![0.0f32; 256];
            resampler.fill_fragment(&mut fragment);
            output.extend_from_slice(&fragment);
        }
        assert!(!resampler.is_underrun());

        // Skip the filter settling time
        let settled = &output[4800..];

        // A 440 Hz sine of amplitude ~0.37 moves at most ~0.021 per 48 kHz sample
        let max_delta = settled
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0f32, f32::max);
        assert!(max_delta < 0.03, "max delta {}", max_delta);

        // Count rising zero crossings to estimate the frequency
        let crossings = settled
            .windows(2)
            .filter(|w| w[0] < 0.0 && w[1] >= 0.0)
            .count();
        let seconds = settled.len() as f64 / rate_to as f64;
        let measured = crossings as f64 / seconds;
        assert!((measured - frequency).abs() < 5.0, "measured {}", measured);
    }

    #[test]
    fn test_stereo_to_mono_averages_channels() {
        let frames = 64;
        let mut input = Vec::with_capacity(frames * 2);
        for _ in 0..frames {
            input.push(8000i16);
            input.push(-8000i16);
        }

        let from = ResamplerFormat::new(1000, 16, true);
        let to = ResamplerFormat::new(1000, 16, false);
        let mut resampler = LanczosResampler::new(from, to, sample_source(input, 32), 2);

        let mut output = vec![1.0f32; 40];
        resampler.fill_fragment(&mut output);
        assert!(output.iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn test_silent_before_first_fragment() {
        let from = ResamplerFormat::new(31440, 8, false);
        let to = ResamplerFormat::new(44100, 32, true);
        let mut resampler = LanczosResampler::new(from, to, sample_source(vec![], 8), 2);

        let mut output = vec![1.0f32; 64];
        resampler.fill_fragment(&mut output);
        assert!(resampler.is_underrun());
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_underrun_replays_stale_fragment() {
        let fragment_size = 8;
        let from = ResamplerFormat::new(31440, fragment_size, false);
        let to = ResamplerFormat::new(31440, 64, false);
        let source = sample_source(vec![16000; fragment_size], fragment_size);
        let mut resampler = LanczosResampler::new(from, to, source, 3);

        let mut output = vec![0.0f32; 64];
        resampler.fill_fragment(&mut output);
        assert!(resampler.is_underrun());

        // The single fragment keeps feeding the filter after the source ran dry
        assert!(output[fragment_size..].iter().all(|&s| s > 0.1), "{:?}", output);
    }
}
