//! Operations and the builtin DSP effects
//!
//! `operation` and `contract` define what a processing step is and which
//! parameter values are legal. The remaining modules are the in-process
//! renderers used by the builtin engine; every effect is built from an
//! [`OperationSpec`] through [`build_effect`].

pub mod contract;
mod delay;
mod dynamics;
mod effect;
mod eq;
mod loudness;
pub mod operation;
mod reverb;
mod stereo;

pub use contract::{
    clamp_to_contract, contract, float_range, validate_chain, validate_spec, ParamSpec, ParamType,
    EQ_FILTERS,
};
pub use delay::Delay;
pub use dynamics::{Compressor, Limiter};
pub use effect::Effect;
pub use eq::{Biquad, FilterType};
pub use loudness::{Gain, LoudnessNormalizer};
pub use operation::{OperationChain, OperationKind, OperationSpec, ParamValue, Stage};
pub use reverb::Reverb;
pub use stereo::StereoWidth;

use crate::error::Result;

/// Build the effect that renders one operation at the given sample rate
pub fn build_effect(spec: &OperationSpec, sample_rate: u32) -> Result<Box<dyn Effect>> {
    let effect: Box<dyn Effect> = match spec.kind() {
        OperationKind::Eq | OperationKind::HighPass | OperationKind::LowPass => {
            Box::new(Biquad::from_spec(spec, sample_rate)?)
        }
        OperationKind::Compression => Box::new(Compressor::from_spec(spec, sample_rate)?),
        OperationKind::Reverb => Box::new(Reverb::from_spec(spec, sample_rate)?),
        OperationKind::Delay => Box::new(Delay::from_spec(spec, sample_rate)?),
        OperationKind::StereoWidth => Box::new(StereoWidth::from_spec(spec)?),
        OperationKind::Gain => Box::new(Gain::from_spec(spec)?),
        OperationKind::Limiter => Box::new(Limiter::from_spec(spec, sample_rate)?),
        OperationKind::LoudnessTarget => Box::new(LoudnessNormalizer::from_spec(spec, sample_rate)?),
    };
    Ok(effect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(OperationSpec::new(OperationKind::HighPass, Stage::CorrectiveEq).with_number("frequency", 80.0), "high_pass" ; "high pass")]
    #[test_case(OperationSpec::new(OperationKind::Gain, Stage::Loudness).with_number("gain_db", 3.0), "gain" ; "gain")]
    #[test_case(OperationSpec::new(OperationKind::StereoWidth, Stage::Stereo).with_number("width", 1.5), "stereo_width" ; "width")]
    #[test_case(OperationSpec::new(OperationKind::Limiter, Stage::Loudness).with_number("ceiling_db", -1.0), "limiter" ; "limiter")]
    fn test_build_effect_dispatch(spec: OperationSpec, expected: &str) {
        let effect = build_effect(&spec, 48000).unwrap();
        assert_eq!(effect.effect_type(), expected);
        assert_eq!(effect.effect_type(), spec.kind().id());
    }

    #[test]
    fn test_build_effect_missing_parameter() {
        let spec = OperationSpec::new(OperationKind::Delay, Stage::TimeBased).with_number("time_ms", 250.0);
        assert!(build_effect(&spec, 48000).is_err());
    }
}
