//! Mid/side stereo width

use super::effect::Effect;
use super::operation::OperationSpec;
use crate::engine::AudioBuffer;
use crate::error::Result;

/// Scales the side signal: 0 = mono, 1 = unchanged, 2 = double width.
///
/// Mono buffers pass through untouched.
#[derive(Debug, Clone)]
pub struct StereoWidth {
    width: f32,
}

impl StereoWidth {
    pub fn new(width: f32) -> Self {
        Self {
            width: width.clamp(0.0, 2.0),
        }
    }

    pub fn from_spec(spec: &OperationSpec) -> Result<Self> {
        Ok(Self::new(spec.require_number("width")? as f32))
    }
}

impl Effect for StereoWidth {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        if buffer.num_channels() != 2 {
            return;
        }
        let (left, right) = buffer.samples.split_at_mut(1);
        for (l, r) in left[0].iter_mut().zip(right[0].iter_mut()) {
            let mid = (*l + *r) * 0.5;
            let side = (*l - *r) * 0.5 * self.width;
            *l = mid + side;
            *r = mid - side;
        }
    }

    fn effect_type(&self) -> &'static str {
        "stereo_width"
    }
}
