//! TIA sound generation
//!
//! Two identical tone/noise generators clocked twice per scanline. Each
//! sample is mixed through a non-linear table (the output stage is a
//! resistor network, not a linear DAC) and collected into fragments for the
//! audio queue.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audio::AudioQueue;

/// Colour clocks per audio counter period
const COUNTER_PERIOD: u8 = 228;

const R_MAX: f64 = 30.0;
const R: f64 = 1.0;

fn mixing_table_entry(v: u8, v_max: u8) -> i16 {
    let v = v as f64;
    let v_max = v_max as f64;
    (0x7fff as f64 * v / v_max * (R_MAX + R * v_max) / (R_MAX + R * v)).floor() as i16
}

/// One tone/noise generator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioChannel {
    audc: u8,
    audf: u8,
    audv: u8,

    clock_enable: bool,
    noise_feedback: bool,
    noise_counter_bit4: bool,
    pulse_counter_hold: bool,

    div_counter: u8,
    pulse_counter: u8,
    noise_counter: u8,
}

impl AudioChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn set_audc(&mut self, value: u8) {
        self.audc = value & 0x0f;
    }

    pub fn set_audf(&mut self, value: u8) {
        self.audf = value & 0x1f;
    }

    pub fn set_audv(&mut self, value: u8) {
        self.audv = value & 0x0f;
    }

    pub fn audc(&self) -> u8 {
        self.audc
    }

    pub fn audf(&self) -> u8 {
        self.audf
    }

    pub fn audv(&self) -> u8 {
        self.audv
    }

    /// First half of the audio clock: noise feedback and divider
    pub fn phase0(&mut self) {
        if self.clock_enable {
            self.noise_counter_bit4 = self.noise_counter & 0x01 != 0;

            self.pulse_counter_hold = match self.audc & 0x03 {
                0x02 => (self.noise_counter & 0x1e) != 0x02,
                0x03 => !self.noise_counter_bit4,
                _ => false,
            };

            self.noise_feedback = match self.audc & 0x03 {
                0x00 => {
                    ((self.pulse_counter ^ self.noise_counter) & 0x01) != 0
                        || !(self.noise_counter != 0 || self.pulse_counter != 0x0a)
                        || (self.audc & 0x0c) == 0
                }
                _ => {
                    (((self.noise_counter & 0x04) != 0) ^ ((self.noise_counter & 0x01) != 0))
                        || self.noise_counter == 0
                }
            };
        }

        self.clock_enable = self.div_counter == self.audf;

        if self.div_counter == self.audf || self.div_counter == 0x1f {
            self.div_counter = 0;
        } else {
            self.div_counter += 1;
        }
    }

    /// Second half of the audio clock: shift the counters, return the level
    pub fn phase1(&mut self) -> u8 {
        if self.clock_enable {
            let pulse_feedback = match self.audc >> 2 {
                0x00 => {
                    (((self.pulse_counter & 0x02) != 0) ^ ((self.pulse_counter & 0x01) != 0))
                        && self.pulse_counter != 0x0a
                        && (self.audc & 0x03) != 0
                }
                0x01 => self.pulse_counter & 0x08 == 0,
                0x02 => !self.noise_counter_bit4,
                _ => !((self.pulse_counter & 0x02) != 0 || (self.pulse_counter & 0x0e) == 0),
            };

            self.noise_counter >>= 1;
            if self.noise_feedback {
                self.noise_counter |= 0x10;
            }

            if !self.pulse_counter_hold {
                self.pulse_counter = !(self.pulse_counter >> 1) & 0x07;
                if pulse_feedback {
                    self.pulse_counter |= 0x08;
                }
            }
        }

        (self.pulse_counter & 0x01) * self.audv
    }
}

/// Sound section of the chip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TiaAudio {
    /// Position within the 228 clock audio period
    counter: u8,

    channel0: AudioChannel,
    channel1: AudioChannel,

    #[serde(skip, default = "mixing_table_sum")]
    mixing_table_sum: Vec<i16>,

    #[serde(skip, default = "mixing_table_individual")]
    mixing_table_individual: Vec<i16>,

    #[serde(skip)]
    queue: Option<Arc<AudioQueue>>,

    /// Fragment being filled
    #[serde(skip)]
    fragment: Vec<i16>,

    #[serde(skip)]
    sample_index: usize,
}

fn mixing_table_sum() -> Vec<i16> {
    (0..=0x1e).map(|v| mixing_table_entry(v, 0x1e)).collect()
}

fn mixing_table_individual() -> Vec<i16> {
    (0..=0x0f).map(|v| mixing_table_entry(v, 0x0f)).collect()
}

impl Default for TiaAudio {
    fn default() -> Self {
        TiaAudio::new()
    }
}

impl TiaAudio {
    pub fn new() -> Self {
        TiaAudio {
            counter: 0,
            channel0: AudioChannel::new(),
            channel1: AudioChannel::new(),
            mixing_table_sum: mixing_table_sum(),
            mixing_table_individual: mixing_table_individual(),
            queue: None,
            fragment: Vec::new(),
            sample_index: 0,
        }
    }

    /// Power-on state; the queue stays attached
    pub fn reset(&mut self) {
        self.counter = 0;
        self.channel0.reset();
        self.channel1.reset();
        self.sample_index = 0;
    }

    /// Attach (or detach with `None`) the fragment queue
    pub fn set_audio_queue(&mut self, queue: Option<Arc<AudioQueue>>) {
        self.fragment = match &queue {
            Some(queue) => queue.acquire(),
            None => Vec::new(),
        };
        self.sample_index = 0;
        self.queue = queue;
    }

    pub fn audio_queue(&self) -> Option<&Arc<AudioQueue>> {
        self.queue.as_ref()
    }

    pub fn channel0(&mut self) -> &mut AudioChannel {
        &mut self.channel0
    }

    pub fn channel1(&mut self) -> &mut AudioChannel {
        &mut self.channel1
    }

    pub fn channels(&self) -> (&AudioChannel, &AudioChannel) {
        (&self.channel0, &self.channel1)
    }

    /// Advance by one colour clock
    pub fn tick(&mut self) {
        match self.counter {
            9 | 81 => {
                self.channel0.phase0();
                self.channel1.phase0();
            }
            37 | 149 => self.phase1(),
            _ => {}
        }

        self.counter += 1;
        if self.counter == COUNTER_PERIOD {
            self.counter = 0;
        }
    }

    fn phase1(&mut self) {
        let sample0 = self.channel0.phase1();
        let sample1 = self.channel1.phase1();

        let Some(queue) = &self.queue else {
            return;
        };

        if queue.is_stereo() {
            self.fragment[2 * self.sample_index] = self.mixing_table_individual[sample0 as usize];
            self.fragment[2 * self.sample_index + 1] =
                self.mixing_table_individual[sample1 as usize];
        } else {
            self.fragment[self.sample_index] =
                self.mixing_table_sum[(sample0 + sample1) as usize];
        }

        self.sample_index += 1;
        if self.sample_index >= queue.fragment_size() {
            self.sample_index = 0;
            let full = std::mem::take(&mut self.fragment);
            self.fragment = queue.enqueue(full);
        }
    }
}
