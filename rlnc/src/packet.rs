//! Coded packet type and its wire format.
//!
//! Layout (spec.md §6.2): `gid: i32 LE`, `ucid: i32 LE`, packed
//! coefficients (`ceil(size_g * gfpower / 8)` bytes), then `size_p` symbol
//! bytes. `gid == -1` marks a systematic packet; its coefficient field is
//! still present (zero length is not special-cased) so framing stays
//! uniform regardless of packet kind.

use crate::error::{EngineError, Result};
use crate::gf;

pub const SYSTEMATIC_GID: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub gid: i32,
    pub ucid: i32,
    pub coes: Vec<u8>,
    pub syms: Vec<u8>,
}

impl Packet {
    pub fn is_systematic(&self) -> bool {
        self.gid == SYSTEMATIC_GID
    }

    /// Allocates a zeroed non-systematic packet for `gid`.
    pub fn zeroed(gid: usize, size_g: usize, size_p: usize, gfpower: u8) -> Self {
        Packet {
            gid: gid as i32,
            ucid: -1,
            coes: vec![0u8; gf::packed_len(size_g, gfpower)],
            syms: vec![0u8; size_p],
        }
    }

    /// Serialized length in bytes for the given parameters.
    pub fn length(size_g: usize, size_p: usize, gfpower: u8) -> usize {
        4 + 4 + gf::packed_len(size_g, gfpower) + size_p
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.coes.len() + self.syms.len());
        out.extend_from_slice(&self.gid.to_le_bytes());
        out.extend_from_slice(&self.ucid.to_le_bytes());
        out.extend_from_slice(&self.coes);
        out.extend_from_slice(&self.syms);
        out
    }

    pub fn deserialize(buf: &[u8], size_g: usize, size_p: usize, gfpower: u8) -> Result<Self> {
        let coes_len = gf::packed_len(size_g, gfpower);
        let expected = 8 + coes_len + size_p;
        if buf.len() != expected {
            return Err(EngineError::Framing(format!(
                "packet length {} does not match expected {expected}",
                buf.len()
            )));
        }
        let gid = i32::from_le_bytes(buf[0..4].try_into().unwrap());
        let ucid = i32::from_le_bytes(buf[4..8].try_into().unwrap());
        let coes = buf[8..8 + coes_len].to_vec();
        let syms = buf[8 + coes_len..].to_vec();
        Ok(Packet {
            gid,
            ucid,
            coes,
            syms,
        })
    }
}
