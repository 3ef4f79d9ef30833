//! Reverb effect
//!
//! Freeverb-style Schroeder network:
//! - 8 parallel damped comb filters
//! - 4 series allpass filters for diffusion
//! - Right channel delays offset for stereo spread
//!
//! `room_size` scales the delay lengths, `decay_s` sets the comb feedback so
//! that each comb falls by 60 dB over the requested time.

use super::effect::Effect;
use super::operation::OperationSpec;
use crate::engine::AudioBuffer;
use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Reference sample rate for the delay tables
const REFERENCE_SAMPLE_RATE: f64 = 44100.0;

/// Comb filter delays at 44100 Hz
const COMB_DELAYS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// Allpass filter delays at 44100 Hz
const ALLPASS_DELAYS: [usize; 4] = [556, 441, 341, 225];

/// Right channel offset in samples
const STEREO_SPREAD: usize = 23;

const ALLPASS_GAIN: f32 = 0.5;

/// Input attenuation into the comb bank
const FIXED_GAIN: f32 = 0.015;

/// Wet output scale
const WET_SCALE: f32 = 3.0;

const DAMP_SCALE: f32 = 0.4;

/// Delay scale at room_size 0; room_size 1 gives MIN + SPAN
const ROOM_MIN_SCALE: f64 = 0.5;
const ROOM_SPAN: f64 = 1.0;

/// Upper bound on comb feedback to keep the network stable
const MAX_FEEDBACK: f32 = 0.98;

// ============================================================================
// Filter Components
// ============================================================================

/// Low-pass feedback comb filter
#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    pos: usize,
    filter_state: f32,
    feedback: f32,
    damp1: f32,
    damp2: f32,
}

impl CombFilter {
    fn new(delay: usize, feedback: f32, damping: f32) -> Self {
        Self {
            buffer: vec![0.0; delay.max(1)],
            pos: 0,
            filter_state: 0.0,
            feedback,
            damp1: 1.0 - damping * DAMP_SCALE,
            damp2: damping * DAMP_SCALE,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.pos];
        self.filter_state = output * self.damp1 + self.filter_state * self.damp2;
        self.buffer[self.pos] = input + self.filter_state * self.feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }
}

#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllpassFilter {
    fn new(delay: usize) -> Self {
        Self {
            buffer: vec![0.0; delay.max(1)],
            pos: 0,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.pos];
        let output = delayed - ALLPASS_GAIN * input;
        self.buffer[self.pos] = input + ALLPASS_GAIN * output;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }
}

/// Comb bank and allpass chain for one output channel
#[derive(Debug, Clone)]
struct Tank {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassFilter>,
}

impl Tank {
    fn new(spread: usize, scale: f64, sample_rate: u32, decay_s: f32, damping: f32) -> Self {
        let combs = COMB_DELAYS
            .iter()
            .map(|&d| {
                let delay = (((d + spread) as f64) * scale).round().max(1.0) as usize;
                let delay_s = delay as f32 / sample_rate as f32;
                // RT60: g^(decay / delay) = 10^-3
                let feedback = 10.0_f32.powf(-3.0 * delay_s / decay_s).min(MAX_FEEDBACK);
                CombFilter::new(delay, feedback, damping)
            })
            .collect();
        let allpasses = ALLPASS_DELAYS
            .iter()
            .map(|&d| {
                let rate_scale = sample_rate as f64 / REFERENCE_SAMPLE_RATE;
                AllpassFilter::new((((d + spread) as f64) * rate_scale).round() as usize)
            })
            .collect();
        Self { combs, allpasses }
    }

    fn process(&mut self, input: f32) -> f32 {
        let mut out = 0.0;
        for comb in &mut self.combs {
            out += comb.process(input);
        }
        for allpass in &mut self.allpasses {
            out = allpass.process(out);
        }
        out
    }
}

// ============================================================================
// Reverb
// ============================================================================

#[derive(Debug, Clone)]
pub struct Reverb {
    room_size: f32,
    damping: f32,
    wet: f32,
    decay_s: f32,
    sample_rate: u32,
}

impl Reverb {
    pub fn new(room_size: f32, damping: f32, wet: f32, decay_s: f32, sample_rate: u32) -> Self {
        Self {
            room_size: room_size.clamp(0.0, 1.0),
            damping: damping.clamp(0.0, 1.0),
            wet: wet.clamp(0.0, 1.0),
            decay_s: decay_s.max(0.1),
            sample_rate,
        }
    }

    pub fn from_spec(spec: &OperationSpec, sample_rate: u32) -> Result<Self> {
        Ok(Self::new(
            spec.require_number("room_size")? as f32,
            spec.require_number("damping")? as f32,
            spec.require_number("wet")? as f32,
            spec.require_number("decay_s")? as f32,
            sample_rate,
        ))
    }

    fn tank(&self, spread: usize) -> Tank {
        let scale = self.sample_rate as f64 / REFERENCE_SAMPLE_RATE
            * (ROOM_MIN_SCALE + self.room_size as f64 * ROOM_SPAN);
        Tank::new(spread, scale, self.sample_rate, self.decay_s, self.damping)
    }
}

impl Effect for Reverb {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        let num_channels = buffer.num_channels();
        if num_channels == 0 {
            return;
        }

        let mut tanks: Vec<Tank> = (0..num_channels)
            .map(|ch| self.tank(ch * STEREO_SPREAD))
            .collect();
        let dry = 1.0 - self.wet;
        let wet = self.wet * WET_SCALE;

        for frame in 0..buffer.num_samples() {
            let input = (0..num_channels)
                .map(|ch| buffer.samples[ch][frame])
                .sum::<f32>()
                / num_channels as f32;
            let feed = input * FIXED_GAIN;

            for (ch, tank) in tanks.iter_mut().enumerate() {
                let sample = &mut buffer.samples[ch][frame];
                *sample = *sample * dry + tank.process(feed) * wet;
            }
        }
    }

    fn effect_type(&self) -> &'static str {
        "reverb"
    }
}
