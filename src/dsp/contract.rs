//! Parameter contract per operation kind
//!
//! The ranges every engine accepts. Chains are checked against this table
//! before anything is dispatched, so an engine never sees an out-of-range
//! gain or a negative time constant.

use crate::dsp::operation::{OperationChain, OperationKind, OperationSpec, ParamValue};
use crate::error::{MixError, Result};

/// Shapes accepted by the `filter` parameter of an EQ band
pub const EQ_FILTERS: &[&str] = &["peak", "low_shelf", "high_shelf"];

/// Allowed values of one parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamType {
    Float { min: f64, max: f64 },
    Enum { options: &'static [&'static str] },
}

/// Contract entry for one parameter
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub param_type: ParamType,
    pub unit: &'static str,
}

const fn float(name: &'static str, min: f64, max: f64, unit: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        param_type: ParamType::Float { min, max },
        unit,
    }
}

const EQ: &[ParamSpec] = &[
    ParamSpec {
        name: "filter",
        param_type: ParamType::Enum {
            options: EQ_FILTERS,
        },
        unit: "",
    },
    float("frequency", 20.0, 20000.0, "Hz"),
    float("gain_db", -24.0, 24.0, "dB"),
    float("q", 0.1, 10.0, ""),
];
const PASS: &[ParamSpec] = &[float("frequency", 20.0, 20000.0, "Hz")];
const COMPRESSION: &[ParamSpec] = &[
    float("threshold_db", -60.0, 0.0, "dB"),
    float("ratio", 1.0, 20.0, ":1"),
    float("attack_ms", 0.1, 100.0, "ms"),
    float("release_ms", 10.0, 1000.0, "ms"),
];
const REVERB: &[ParamSpec] = &[
    float("room_size", 0.0, 1.0, ""),
    float("damping", 0.0, 1.0, ""),
    float("wet", 0.0, 1.0, ""),
    float("decay_s", 0.1, 10.0, "s"),
];
const DELAY: &[ParamSpec] = &[
    float("time_ms", 1.0, 2000.0, "ms"),
    float("feedback", 0.0, 0.95, ""),
    float("mix", 0.0, 1.0, ""),
];
const STEREO_WIDTH: &[ParamSpec] = &[float("width", 0.0, 2.0, "x")];
const GAIN: &[ParamSpec] = &[float("gain_db", -24.0, 24.0, "dB")];
const LIMITER: &[ParamSpec] = &[float("ceiling_db", -12.0, 0.0, "dB")];
const LOUDNESS: &[ParamSpec] = &[
    float("lufs", -30.0, -5.0, "LUFS"),
    float("true_peak_db", -9.0, 0.0, "dB"),
];

/// All parameters an operation kind requires
pub fn contract(kind: OperationKind) -> &'static [ParamSpec] {
    match kind {
        OperationKind::Eq => EQ,
        OperationKind::HighPass | OperationKind::LowPass => PASS,
        OperationKind::Compression => COMPRESSION,
        OperationKind::Reverb => REVERB,
        OperationKind::Delay => DELAY,
        OperationKind::StereoWidth => STEREO_WIDTH,
        OperationKind::Gain => GAIN,
        OperationKind::Limiter => LIMITER,
        OperationKind::LoudnessTarget => LOUDNESS,
    }
}

/// Range of a numeric parameter, if the kind has one by that name
pub fn float_range(kind: OperationKind, name: &str) -> Option<(f64, f64)> {
    contract(kind).iter().find(|p| p.name == name).and_then(|p| match p.param_type {
        ParamType::Float { min, max } => Some((min, max)),
        ParamType::Enum { .. } => None,
    })
}

/// Clamp a value into its contract range (unchanged if the parameter is unknown)
pub fn clamp_to_contract(kind: OperationKind, name: &str, value: f64) -> f64 {
    match float_range(kind, name) {
        Some((min, max)) => value.clamp(min, max),
        None => value,
    }
}

/// Check one spec: every required parameter present, typed and in range,
/// and nothing the contract does not know about.
pub fn validate_spec(spec: &OperationSpec) -> Result<()> {
    let kind = spec.kind();
    let table = contract(kind);
    let invalid = |param: &str, value: String, expected: String| MixError::InvalidParameter {
        operation: kind.id().to_string(),
        param: param.to_string(),
        value,
        expected,
    };

    for name in spec.params().keys() {
        if !table.iter().any(|p| p.name == name) {
            return Err(invalid(
                name,
                spec.params()[name].to_string(),
                "no such parameter".to_string(),
            ));
        }
    }

    for param in table {
        let value = spec.params().get(param.name);
        match (param.param_type, value) {
            (ParamType::Float { min, max }, Some(ParamValue::Number(v))) => {
                if !v.is_finite() || *v < min || *v > max {
                    return Err(invalid(
                        param.name,
                        v.to_string(),
                        format!("{} to {}{}", min, max, param.unit),
                    ));
                }
            }
            (ParamType::Enum { options }, Some(ParamValue::Choice(c))) => {
                if !options.contains(&c.as_str()) {
                    return Err(invalid(param.name, c.clone(), format!("one of {}", options.join(", "))));
                }
            }
            (ParamType::Float { min, max }, other) => {
                return Err(invalid(
                    param.name,
                    other.map_or_else(|| "missing".to_string(), |v| v.to_string()),
                    format!("a number from {} to {}{}", min, max, param.unit),
                ));
            }
            (ParamType::Enum { options }, other) => {
                return Err(invalid(
                    param.name,
                    other.map_or_else(|| "missing".to_string(), |v| v.to_string()),
                    format!("one of {}", options.join(", ")),
                ));
            }
        }
    }

    Ok(())
}

/// Check every spec of a chain, stopping at the first violation
pub fn validate_chain(chain: &OperationChain) -> Result<()> {
    chain.iter().try_for_each(validate_spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::operation::Stage;
    use test_case::test_case;

    fn gain(db: f64) -> OperationSpec {
        OperationSpec::new(OperationKind::Gain, Stage::Loudness).with_number("gain_db", db)
    }

    #[test_case(0.0, true ; "unity")]
    #[test_case(24.0, true ; "upper bound")]
    #[test_case(-24.0, true ; "lower bound")]
    #[test_case(24.5, false ; "too loud")]
    #[test_case(-30.0, false ; "too quiet")]
    #[test_case(f64::NAN, false ; "nan")]
    #[test_case(f64::INFINITY, false ; "infinite")]
    fn test_gain_range(db: f64, ok: bool) {
        assert_eq!(validate_spec(&gain(db)).is_ok(), ok);
    }

    #[test]
    fn test_negative_time_constant_rejected() {
        let spec = OperationSpec::new(OperationKind::Compression, Stage::Dynamics)
            .with_number("threshold_db", -20.0)
            .with_number("ratio", 4.0)
            .with_number("attack_ms", -5.0)
            .with_number("release_ms", 50.0);
        let err = validate_spec(&spec).unwrap_err();
        assert!(matches!(err, MixError::InvalidParameter { ref param, .. } if param == "attack_ms"));
    }

    #[test]
    fn test_missing_and_unknown_parameters() {
        let missing = OperationSpec::new(OperationKind::Limiter, Stage::Loudness);
        assert!(validate_spec(&missing).is_err());

        let unknown = gain(0.0).with_number("wobble", 1.0);
        let err = validate_spec(&unknown).unwrap_err();
        assert!(matches!(err, MixError::InvalidParameter { ref param, .. } if param == "wobble"));
    }

    #[test]
    fn test_eq_filter_choice() {
        let base = OperationSpec::new(OperationKind::Eq, Stage::CreativeEq)
            .with_number("frequency", 1000.0)
            .with_number("gain_db", 3.0)
            .with_number("q", 1.0);
        assert!(validate_spec(&base.clone().with_choice("filter", "peak")).is_ok());
        assert!(validate_spec(&base.clone().with_choice("filter", "notch")).is_err());
        assert!(validate_spec(&base.with_number("filter", 1.0)).is_err());
    }

    #[test]
    fn test_clamp_to_contract() {
        assert_eq!(clamp_to_contract(OperationKind::Compression, "ratio", 40.0), 20.0);
        assert_eq!(clamp_to_contract(OperationKind::StereoWidth, "width", -1.0), 0.0);
        assert_eq!(clamp_to_contract(OperationKind::Gain, "unknown", 99.0), 99.0);
    }
}
