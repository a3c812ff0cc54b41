use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Subgeneration membership scheme. See `plan.rs` for how each variant
/// assigns packet ids to subgenerations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeType {
    Rand,
    Band,
    Windwrap,
    Bats,
}

/// Immutable session parameters, shared by encoder, recoder buffers and
/// decoders. Cheap to `Clone`: no heap-allocated fields.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Params {
    pub datasize: usize,
    pub size_p: usize,
    pub size_b: usize,
    pub size_g: usize,
    pub size_c: usize,
    /// Binary precode: parity coefficients are all 1 rather than uniform
    /// over GF(2^gfpower).
    pub bpc: bool,
    pub gfpower: u8,
    pub sys: bool,
    pub code_type: CodeType,
    pub seed: u64,
}

impl Params {
    /// Validates field combinations and returns derived counts. This is
    /// the one place malformed parameters are rejected; every downstream
    /// component assumes a `Params` that passed this check.
    pub fn validate(self) -> Result<Self> {
        if self.datasize == 0 {
            return Err(EngineError::InvalidParams("datasize must be > 0".into()));
        }
        if self.size_p == 0 {
            return Err(EngineError::InvalidParams("size_p must be > 0".into()));
        }
        if self.size_b == 0 {
            return Err(EngineError::InvalidParams("size_b must be > 0".into()));
        }
        if self.size_g == 0 || self.size_g < self.size_b {
            return Err(EngineError::InvalidParams(
                "size_g must be >= size_b and > 0".into(),
            ));
        }
        if !(1..=8).contains(&self.gfpower) {
            return Err(EngineError::InvalidParams(
                "gfpower must be in 1..=8".into(),
            ));
        }
        let snum = self.snum();
        if self.size_g > snum + self.size_c {
            return Err(EngineError::InvalidParams(
                "size_g cannot exceed the total packet pool (snum + size_c)".into(),
            ));
        }
        Ok(self)
    }

    /// Number of source packets: `ceil(datasize / size_p)`.
    pub fn snum(&self) -> usize {
        (self.datasize + self.size_p - 1) / self.size_p
    }

    pub fn cnum(&self) -> usize {
        self.size_c
    }

    /// Total intermediate packets (source + precode parity).
    pub fn numpp(&self) -> usize {
        self.snum() + self.cnum()
    }
}
