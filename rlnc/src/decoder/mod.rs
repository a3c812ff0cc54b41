//! Decoder family: GG (iterative + precode), BD (banded + one-round
//! pivot), CBD (compact-band storage of BD), OA (overlap-aware pivot),
//! PP (perpetual / circular-band pivot). See SPEC_FULL §4.7 and
//! DESIGN.md for how each is grounded.

pub(crate) mod dense;
pub(crate) mod gg;

pub use dense::DenseVariant;

use crate::error::Result;
use crate::packet::Packet;
use crate::params::Params;

/// Which concrete decoding algorithm a `Decoder` wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DecoderKind {
    Gg,
    Bd,
    Cbd,
    Oa,
    Pp,
}

/// Shared contract implemented by every decoder variant.
pub trait DecoderOps {
    fn process_packet(&mut self, pkt: Packet) -> Result<()>;
    fn finished(&self) -> bool;
    fn dof(&self) -> usize;
    fn overhead(&self) -> usize;
    fn cost(&self) -> u64;
    fn recover_data(&self) -> Result<Vec<u8>>;
    fn save(&self) -> Vec<u8>;
}

/// A decoder, dispatched by kind. A closed, small set of variants is a
/// better fit for an enum than `dyn DecoderOps` (mirrors the teacher's
/// `FecAlgorithm`/`DecoderCore` enum-dispatch shape).
pub enum Decoder {
    Gg(gg::GgDecoder),
    Dense(dense::DenseDecoder),
}

impl Decoder {
    pub fn create(kind: DecoderKind, params: Params) -> Result<Self> {
        let params = params.validate()?;
        Ok(match kind {
            DecoderKind::Gg => Decoder::Gg(gg::GgDecoder::new(params)),
            DecoderKind::Bd => Decoder::Dense(dense::DenseDecoder::new(params, DenseVariant::Bd)),
            DecoderKind::Cbd => Decoder::Dense(dense::DenseDecoder::new(params, DenseVariant::Cbd)),
            DecoderKind::Oa => Decoder::Dense(dense::DenseDecoder::new(params, DenseVariant::Oa)),
            DecoderKind::Pp => Decoder::Dense(dense::DenseDecoder::new(params, DenseVariant::Pp)),
        })
    }

    pub fn kind(&self) -> DecoderKind {
        match self {
            Decoder::Gg(_) => DecoderKind::Gg,
            Decoder::Dense(d) => d.kind(),
        }
    }

    pub fn process_packet(&mut self, pkt: Packet) -> Result<()> {
        match self {
            Decoder::Gg(d) => d.process_packet(pkt),
            Decoder::Dense(d) => d.process_packet(pkt),
        }
    }

    pub fn finished(&self) -> bool {
        match self {
            Decoder::Gg(d) => d.finished(),
            Decoder::Dense(d) => d.finished(),
        }
    }

    pub fn dof(&self) -> usize {
        match self {
            Decoder::Gg(d) => d.dof(),
            Decoder::Dense(d) => d.dof(),
        }
    }

    pub fn params(&self) -> &Params {
        match self {
            Decoder::Gg(d) => d.params(),
            Decoder::Dense(d) => d.params(),
        }
    }

    /// Received-to-needed ratio: `packets absorbed / snum`. A value above
    /// 1.0 is the price paid for the loss/topology this decoder tolerated.
    pub fn overhead(&self) -> f64 {
        let raw = match self {
            Decoder::Gg(d) => d.overhead(),
            Decoder::Dense(d) => d.overhead(),
        };
        let snum = self.params().snum();
        if snum == 0 {
            0.0
        } else {
            raw as f64 / snum as f64
        }
    }

    /// Field operations per recovered byte, normalized by `snum * size_p`
    /// so it is comparable across parameter sets.
    pub fn cost(&self) -> f64 {
        let raw = match self {
            Decoder::Gg(d) => d.cost(),
            Decoder::Dense(d) => d.cost(),
        };
        let params = self.params();
        let denom = params.snum() * params.size_p;
        if denom == 0 {
            0.0
        } else {
            raw as f64 / denom as f64
        }
    }

    pub fn recover_data(&self) -> Result<Vec<u8>> {
        match self {
            Decoder::Gg(d) => d.recover_data(),
            Decoder::Dense(d) => d.recover_data(),
        }
    }

    pub fn save(&self) -> Vec<u8> {
        match self {
            Decoder::Gg(d) => d.save(),
            Decoder::Dense(d) => d.save(),
        }
    }

    pub fn restore(bytes: &[u8]) -> Result<Self> {
        crate::checkpoint::restore(bytes)
    }
}
