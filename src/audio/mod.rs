//! Audio processing and output
//!
//! The emulation side pushes TIA fragments into an [`AudioQueue`]. The
//! playback side owns an [`AudioSystem`], which pulls fragments through a
//! resampler and applies the volume setting.

mod convolution;
mod dsp;
mod lanczos;
mod queue;
mod resampler;

pub use convolution::ConvolutionBuffer;
pub use dsp::HighPassFilter;
pub use lanczos::{LanczosResampler, CLIPPING_FACTOR, HIGH_PASS_CUT_OFF};
pub use queue::{AudioQueue, QueueSource};
pub use resampler::{FragmentSource, Resampler, ResamplerFormat, SimpleResampler, PCM_SCALE};

use std::sync::Arc;

use log::info;

use crate::settings::{AudioSettings, ResamplingQuality};
use crate::timing::EmulationTiming;

/// Audio sample format (16-bit signed PCM)
pub type Sample = i16;

/// Playback-side audio pipeline
pub struct AudioSystem {
    /// Resampler pulling from the queue
    resampler: Box<dyn Resampler>,

    /// Host output format
    format: ResamplerFormat,

    /// Scratch buffer for PCM conversion
    buffer: Vec<f32>,

    /// Volume (0.0 - 1.0)
    volume: f32,

    /// Output silence when disabled
    enabled: bool,
}

impl AudioSystem {
    /// Create a pipeline draining `queue` at the host rate from `settings`
    pub fn new(queue: Arc<AudioQueue>, timing: &EmulationTiming, settings: &AudioSettings) -> Self {
        let format_from = ResamplerFormat::new(
            timing.audio_sample_rate(),
            queue.fragment_size(),
            queue.is_stereo(),
        );
        let format = ResamplerFormat::new(
            settings.sample_rate,
            settings.fragment_size as usize,
            settings.stereo,
        );
        let source = Box::new(QueueSource::new(
            queue,
            timing.prebuffer_fragment_count() as usize,
        ));

        let resampler: Box<dyn Resampler> = match settings.resampling_quality {
            ResamplingQuality::NearestNeighbour => {
                Box::new(SimpleResampler::new(format_from, format, source))
            }
            ResamplingQuality::Lanczos2 => {
                Box::new(LanczosResampler::new(format_from, format, source, 2))
            }
            ResamplingQuality::Lanczos3 => {
                Box::new(LanczosResampler::new(format_from, format, source, 3))
            }
        };

        info!(
            "Audio: {} Hz -> {} Hz, {:?} resampling, {}",
            format_from.sample_rate,
            format.sample_rate,
            settings.resampling_quality,
            if format.stereo { "stereo" } else { "mono" }
        );

        let mut system = AudioSystem {
            resampler,
            format,
            buffer: Vec::new(),
            volume: 1.0,
            enabled: settings.enabled,
        };
        system.set_volume(settings.volume as f32 / 100.0);
        system
    }

    /// Fill `out` with host-rate float samples
    pub fn fill(&mut self, out: &mut [f32]) {
        if !self.enabled {
            out.fill(0.0);
            return;
        }

        self.resampler.fill_fragment(out);

        for sample in out.iter_mut() {
            *sample *= self.volume;
        }
    }

    /// Fill `out` with host-rate 16-bit PCM
    pub fn fill_pcm(&mut self, out: &mut [Sample]) {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.resize(out.len(), 0.0);

        self.fill(&mut buffer);
        for (dst, &src) in out.iter_mut().zip(buffer.iter()) {
            *dst = (src.clamp(-1.0, 1.0) * 32767.0) as Sample;
        }

        self.buffer = buffer;
    }

    /// Samples per host fragment (interleaved)
    pub fn fragment_len(&self) -> usize {
        self.format.fragment_size * self.format.channels()
    }

    /// Host output format
    pub fn format(&self) -> ResamplerFormat {
        self.format
    }

    /// Set volume (0.0 - 1.0)
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    /// Get current volume
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Mute or unmute output
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether the resampler is waiting for the producer
    pub fn is_underrun(&self) -> bool {
        self.resampler.is_underrun()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_is_clamped() {
        let queue = Arc::new(AudioQueue::new(262, 4, false));
        let timing = EmulationTiming::default();
        let mut audio = AudioSystem::new(queue, &timing, &AudioSettings::default());

        audio.set_volume(1.5);
        assert_eq!(audio.volume(), 1.0);
        audio.set_volume(-0.5);
        assert_eq!(audio.volume(), 0.0);
    }

    #[test]
    fn test_silent_until_prebuffered() {
        let queue = Arc::new(AudioQueue::new(262, 8, false));
        let timing = EmulationTiming::default();
        let mut audio = AudioSystem::new(Arc::clone(&queue), &timing, &AudioSettings::default());

        let mut out = vec![1i16; audio.fragment_len()];
        audio.fill_pcm(&mut out);
        assert!(out.iter().all(|&s| s == 0));
        assert!(audio.is_underrun());
    }

    #[test]
    fn test_plays_queued_fragments() {
        let queue = Arc::new(AudioQueue::new(262, 16, false));
        let timing = EmulationTiming::default();
        let settings = AudioSettings {
            resampling_quality: ResamplingQuality::NearestNeighbour,
            volume: 100,
            ..AudioSettings::default()
        };
        let mut audio = AudioSystem::new(Arc::clone(&queue), &timing, &settings);

        for _ in 0..12 {
            let mut fragment = queue.acquire();
            fragment.fill(16000);
            queue.enqueue(fragment);
        }

        let mut out = vec![0i16; audio.fragment_len()];
        audio.fill_pcm(&mut out);
        assert!(out.iter().all(|&s| (s - 16000).abs() <= 1));
    }
}
