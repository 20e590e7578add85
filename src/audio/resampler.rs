//! Sample rate conversion from the TIA clock domain to the host rate
//!
//! A resampler pulls fixed-size PCM fragments from a [`FragmentSource`] and
//! writes host-rate float samples. Running out of source data never blocks:
//! the underrun is logged and output continues from the stale fragment (or
//! silence when nothing ever arrived).

use log::warn;

/// Divisor normalizing 16-bit PCM to [-1, 1]
pub const PCM_SCALE: f32 = 0x7fff as f32;

/// Sample stream description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResamplerFormat {
    /// Samples (frames) per second
    pub sample_rate: u32,

    /// Frames per fragment
    pub fragment_size: usize,

    /// Two interleaved channels per frame
    pub stereo: bool,
}

impl ResamplerFormat {
    pub fn new(sample_rate: u32, fragment_size: usize, stereo: bool) -> Self {
        ResamplerFormat {
            sample_rate,
            fragment_size,
            stereo,
        }
    }

    /// Channels per frame
    pub fn channels(&self) -> usize {
        if self.stereo {
            2
        } else {
            1
        }
    }
}

/// Producer side of a resampler
pub trait FragmentSource: Send {
    /// Next full source fragment, or `None` if the producer has fallen behind
    fn next_fragment(&mut self) -> Option<Vec<i16>>;

    /// Hand a consumed fragment back for reuse
    fn recycle(&mut self, _fragment: Vec<i16>) {}
}

impl<F> FragmentSource for F
where
    F: FnMut() -> Option<Vec<i16>> + Send,
{
    fn next_fragment(&mut self) -> Option<Vec<i16>> {
        self()
    }
}

/// Host-rate sample generator
pub trait Resampler: Send {
    /// Fill `fragment` completely (interleaved if the target is stereo)
    fn fill_fragment(&mut self, fragment: &mut [f32]);

    /// Whether the last pull from the source came back empty
    fn is_underrun(&self) -> bool;
}

/// Cursor over the fragments delivered by a source
pub(crate) struct FragmentStream {
    source: Box<dyn FragmentSource>,
    current: Option<Vec<i16>>,
    index: usize,
    underrun: bool,
}

impl FragmentStream {
    pub(crate) fn new(source: Box<dyn FragmentSource>) -> Self {
        FragmentStream {
            source,
            current: None,
            index: 0,
            underrun: true,
        }
    }

    /// Retry the source after an underrun. Returns false while no fragment
    /// has ever been received.
    pub(crate) fn prime(&mut self) -> bool {
        if self.underrun {
            if let Some(fragment) = self.source.next_fragment() {
                self.replace(fragment);
                self.index = 0;
                self.underrun = false;
            }
        }

        self.current.is_some()
    }

    /// Move `count` frames forward, pulling the next fragment on exhaustion
    pub(crate) fn skip(&mut self, count: usize, fragment_size: usize) {
        self.index += count;

        if fragment_size == 0 || self.index < fragment_size {
            return;
        }

        self.index %= fragment_size;

        match self.source.next_fragment() {
            Some(fragment) => {
                self.replace(fragment);
                self.underrun = false;
            }
            None => {
                warn!("audio buffer underrun");
                self.underrun = true;
            }
        }
    }

    /// Normalized sample of `channel` at the cursor
    pub(crate) fn sample(&self, channels: usize, channel: usize) -> f32 {
        self.current
            .as_ref()
            .and_then(|fragment| fragment.get(self.index * channels + channel))
            .map(|&s| s as f32 / PCM_SCALE)
            .unwrap_or(0.0)
    }

    pub(crate) fn is_underrun(&self) -> bool {
        self.underrun
    }

    fn replace(&mut self, fragment: Vec<i16>) {
        if let Some(old) = self.current.replace(fragment) {
            self.source.recycle(old);
        }
    }
}

/// Write one output frame, mapping between mono and stereo
#[inline]
pub(crate) fn write_frame(
    fragment: &mut [f32],
    index: usize,
    to_stereo: bool,
    left: f32,
    right: Option<f32>,
) {
    match (right, to_stereo) {
        (Some(right), true) => {
            fragment[2 * index] = left;
            fragment[2 * index + 1] = right;
        }
        (Some(right), false) => fragment[index] = (left + right) / 2.0,
        (None, true) => {
            fragment[2 * index] = left;
            fragment[2 * index + 1] = left;
        }
        (None, false) => fragment[index] = left,
    }
}

/// Nearest-neighbour resampler
pub struct SimpleResampler {
    format_from: ResamplerFormat,
    format_to: ResamplerFormat,
    stream: FragmentStream,
    time_index: u32,
}

impl SimpleResampler {
    pub fn new(
        format_from: ResamplerFormat,
        format_to: ResamplerFormat,
        source: Box<dyn FragmentSource>,
    ) -> Self {
        SimpleResampler {
            format_from,
            format_to,
            stream: FragmentStream::new(source),
            time_index: 0,
        }
    }
}

impl Resampler for SimpleResampler {
    fn fill_fragment(&mut self, fragment: &mut [f32]) {
        if !self.stream.prime() {
            fragment.fill(0.0);
            return;
        }

        let channels = self.format_from.channels();
        let output_frames = fragment.len() / self.format_to.channels();

        for i in 0..output_frames {
            let left = self.stream.sample(channels, 0);
            let right = self
                .format_from
                .stereo
                .then(|| self.stream.sample(channels, 1));
            write_frame(fragment, i, self.format_to.stereo, left, right);

            self.time_index += self.format_from.sample_rate;

            let to_skip = self.time_index / self.format_to.sample_rate;
            self.time_index %= self.format_to.sample_rate;
            self.stream
                .skip(to_skip as usize, self.format_from.fragment_size);
        }
    }

    fn is_underrun(&self) -> bool {
        self.stream.is_underrun()
    }
}
