//! Decoder checkpoint format (spec.md §6.3): a packed `Params` section,
//! a decoder-kind tag, then kind-specific fields. Grounded on
//! `original_source/src/decoderGG.c`'s `save_dec_context_GG` /
//! `restore_dec_context_GG` and `decoderBD.c`'s `save_dec_context_BD` /
//! `restore_dec_context_BD`.
//!
//! The original's `restore_dec_context_BD` reads the message matrix
//! using the saved `pktsize` rather than `numpp` (spec.md §9); this
//! implementation never has that ambiguity since the row length is
//! whatever was written, not re-derived from a second field, but the
//! save format still stores `pktsize`-equivalent lengths explicitly
//! rather than recomputing them from `Params` on restore, matching the
//! "save format is authoritative" resolution.
//!
//! There is no existing binary-framing crate in this workspace's
//! dependency stack, so the format is hand-rolled length-prefixed
//! fields, mirroring the original's raw `fwrite`/`fread` structure
//! rather than introducing a new serialization dependency.

use log::debug;

use crate::decoder::dense::{DenseDecoder, DenseVariant};
use crate::decoder::gg::GgDecoder;
use crate::decoder::{Decoder, DecoderKind};
use crate::error::{EngineError, Result};
use crate::params::{CodeType, Params};

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Writer { buf: Vec::new() }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn bool(&mut self, v: bool) {
        self.u8(v as u8);
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn usize(&mut self, v: usize) {
        self.u64(v as u64);
    }

    fn bytes(&mut self, v: &[u8]) {
        self.u32(v.len() as u32);
        self.buf.extend_from_slice(v);
    }

    fn opt_bytes(&mut self, v: &Option<Vec<u8>>) {
        match v {
            Some(b) => {
                self.bool(true);
                self.bytes(b);
            }
            None => self.bool(false),
        }
    }

    fn bool_vec(&mut self, v: &[bool]) {
        self.usize(v.len());
        for &b in v {
            self.bool(b);
        }
    }

    fn usize_vec(&mut self, v: &[usize]) {
        self.usize(v.len());
        for &n in v {
            self.usize(n);
        }
    }

    fn params(&mut self, p: &Params) {
        self.u64(p.datasize as u64);
        self.u64(p.size_p as u64);
        self.u64(p.size_b as u64);
        self.u64(p.size_g as u64);
        self.u64(p.size_c as u64);
        self.bool(p.bpc);
        self.u8(p.gfpower);
        self.bool(p.sys);
        self.u8(match p.code_type {
            CodeType::Rand => 0,
            CodeType::Band => 1,
            CodeType::Windwrap => 2,
            CodeType::Bats => 3,
        });
        self.u64(p.seed);
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(EngineError::Framing("checkpoint truncated".into()));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn bool(&mut self) -> Result<bool> {
        Ok(self.u8()? != 0)
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn usize(&mut self) -> Result<usize> {
        Ok(self.u64()? as usize)
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn opt_bytes(&mut self) -> Result<Option<Vec<u8>>> {
        if self.bool()? {
            Ok(Some(self.bytes()?))
        } else {
            Ok(None)
        }
    }

    fn bool_vec(&mut self) -> Result<Vec<bool>> {
        let len = self.usize()?;
        (0..len).map(|_| self.bool()).collect()
    }

    fn usize_vec(&mut self) -> Result<Vec<usize>> {
        let len = self.usize()?;
        (0..len).map(|_| self.usize()).collect()
    }

    fn params(&mut self) -> Result<Params> {
        let datasize = self.usize()?;
        let size_p = self.usize()?;
        let size_b = self.usize()?;
        let size_g = self.usize()?;
        let size_c = self.usize()?;
        let bpc = self.bool()?;
        let gfpower = self.u8()?;
        let sys = self.bool()?;
        let code_type = match self.u8()? {
            0 => CodeType::Rand,
            1 => CodeType::Band,
            2 => CodeType::Windwrap,
            3 => CodeType::Bats,
            other => return Err(EngineError::Framing(format!("unknown code_type tag {other}"))),
        };
        let seed = self.u64()?;
        Params {
            datasize,
            size_p,
            size_b,
            size_g,
            size_c,
            bpc,
            gfpower,
            sys,
            code_type,
            seed,
        }
        .validate()
    }
}

const KIND_GG: u8 = 0;
const KIND_BD: u8 = 1;
const KIND_CBD: u8 = 2;
const KIND_OA: u8 = 3;
const KIND_PP: u8 = 4;

fn kind_tag(kind: DecoderKind) -> u8 {
    match kind {
        DecoderKind::Gg => KIND_GG,
        DecoderKind::Bd => KIND_BD,
        DecoderKind::Cbd => KIND_CBD,
        DecoderKind::Oa => KIND_OA,
        DecoderKind::Pp => KIND_PP,
    }
}

fn variant_from_tag(tag: u8) -> Result<DenseVariant> {
    match tag {
        KIND_BD => Ok(DenseVariant::Bd),
        KIND_CBD => Ok(DenseVariant::Cbd),
        KIND_OA => Ok(DenseVariant::Oa),
        KIND_PP => Ok(DenseVariant::Pp),
        other => Err(EngineError::Framing(format!("unknown decoder kind tag {other}"))),
    }
}

pub fn save_gg(d: &GgDecoder) -> Vec<u8> {
    let (dof, overhead, operations, finished, pp, subgens, evolving_checks, check_degrees, check_known) =
        d.snapshot();
    let mut w = Writer::new();
    w.params(d.params());
    w.u8(KIND_GG);
    w.usize(dof);
    w.usize(overhead);
    w.u64(operations);
    w.bool(finished);
    w.usize(pp.len());
    for slot in &pp {
        w.opt_bytes(slot);
    }
    w.usize(subgens.len());
    for (dof_miss, erased, rows, fin) in &subgens {
        w.usize(*dof_miss);
        w.bool_vec(erased);
        w.usize(rows.len());
        for row in rows {
            match row {
                Some((coeffs, message)) => {
                    w.bool(true);
                    w.bytes(coeffs);
                    w.bytes(message);
                }
                None => w.bool(false),
            }
        }
        w.bool(*fin);
    }
    w.usize(evolving_checks.len());
    for check in &evolving_checks {
        w.bytes(check);
    }
    w.usize_vec(&check_degrees);
    w.bool_vec(&check_known);
    w.into_bytes()
}

fn restore_gg(r: &mut Reader, params: Params) -> Result<GgDecoder> {
    let dof = r.usize()?;
    let overhead = r.usize()?;
    let operations = r.u64()?;
    let finished = r.bool()?;
    let pp_len = r.usize()?;
    let mut pp = Vec::with_capacity(pp_len);
    for _ in 0..pp_len {
        pp.push(r.opt_bytes()?);
    }
    let subgen_len = r.usize()?;
    let mut subgens = Vec::with_capacity(subgen_len);
    for _ in 0..subgen_len {
        let dof_miss = r.usize()?;
        let erased = r.bool_vec()?;
        let row_len = r.usize()?;
        let mut rows = Vec::with_capacity(row_len);
        for _ in 0..row_len {
            if r.bool()? {
                let coeffs = r.bytes()?;
                let message = r.bytes()?;
                rows.push(Some((coeffs, message)));
            } else {
                rows.push(None);
            }
        }
        let fin = r.bool()?;
        subgens.push((dof_miss, erased, rows, fin));
    }
    let checks_len = r.usize()?;
    let mut evolving_checks = Vec::with_capacity(checks_len);
    for _ in 0..checks_len {
        evolving_checks.push(r.bytes()?);
    }
    let check_degrees = r.usize_vec()?;
    let check_known = r.bool_vec()?;
    Ok(GgDecoder::from_snapshot(
        params,
        dof,
        overhead,
        operations,
        finished,
        pp,
        subgens,
        evolving_checks,
        check_degrees,
        check_known,
    ))
}

pub fn save_dense(d: &DenseDecoder) -> Vec<u8> {
    let (dof, overhead, operations, precode_applied, finished, pivots) = d.snapshot();
    let mut w = Writer::new();
    w.params(d.params());
    w.u8(kind_tag(d.kind()));
    w.usize(dof);
    w.usize(overhead);
    w.u64(operations);
    w.bool(precode_applied);
    w.bool(finished);
    w.usize(pivots.len());
    for pivot in &pivots {
        match pivot {
            Some((coeffs, message)) => {
                w.bool(true);
                w.bytes(coeffs);
                w.bytes(message);
            }
            None => w.bool(false),
        }
    }
    w.into_bytes()
}

fn restore_dense(r: &mut Reader, params: Params, variant: DenseVariant) -> Result<DenseDecoder> {
    let dof = r.usize()?;
    let overhead = r.usize()?;
    let operations = r.u64()?;
    let precode_applied = r.bool()?;
    let finished = r.bool()?;
    let pivot_len = r.usize()?;
    let mut pivots = Vec::with_capacity(pivot_len);
    for _ in 0..pivot_len {
        if r.bool()? {
            let coeffs = r.bytes()?;
            let message = r.bytes()?;
            pivots.push(Some((coeffs, message)));
        } else {
            pivots.push(None);
        }
    }
    Ok(DenseDecoder::from_snapshot(
        params,
        variant,
        dof,
        overhead,
        operations,
        precode_applied,
        finished,
        pivots,
    ))
}

/// Reconstructs whichever decoder variant a checkpoint holds, re-seeding
/// its RNG-derived plan/graph from the restored `Params` (spec.md §6.3:
/// "recovery re-seeds the RNG, reconstructs the plan and graph") before
/// loading the saved running state on top.
pub fn restore(bytes: &[u8]) -> Result<Decoder> {
    let mut r = Reader::new(bytes);
    let params = r.params()?;
    let tag = r.u8()?;
    debug!("restoring decoder checkpoint: {} bytes, kind tag {tag}", bytes.len());
    match tag {
        KIND_GG => Ok(Decoder::Gg(restore_gg(&mut r, params)?)),
        other => {
            let variant = variant_from_tag(other)?;
            Ok(Decoder::Dense(restore_dense(&mut r, params, variant)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;
    use crate::params::CodeType;

    fn params(code_type: CodeType, size_c: usize) -> Params {
        Params {
            datasize: 600,
            size_p: 60,
            size_b: 4,
            size_g: 8,
            size_c,
            bpc: false,
            gfpower: 8,
            sys: false,
            code_type,
            seed: 77,
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn gg_checkpoint_round_trips_mid_stream() {
        let p = params(CodeType::Band, 4);
        let data: Vec<u8> = (0..p.datasize as u32).map(|i| (i % 233) as u8).collect();
        let mut enc = Encoder::new(&data, p).unwrap();
        let mut dec = Decoder::create(DecoderKind::Gg, p).unwrap();
        for _ in 0..(p.numpp() / 2) {
            dec.process_packet(enc.generate_packet()).unwrap();
        }
        let saved = dec.save();
        let mut restored = Decoder::restore(&saved).unwrap();
        assert_eq!(restored.dof(), dec.dof());

        while !dec.finished() {
            let pkt = enc.generate_packet();
            dec.process_packet(pkt.clone()).unwrap();
            restored.process_packet(pkt).unwrap();
        }
        assert!(restored.finished());
        assert_eq!(restored.recover_data().unwrap(), data);
    }

    #[test]
    fn cbd_checkpoint_round_trips_mid_stream() {
        let p = params(CodeType::Band, 0);
        let data: Vec<u8> = (0..p.datasize as u32).map(|i| (i * 3 % 241) as u8).collect();
        let mut enc = Encoder::new(&data, p).unwrap();
        let mut dec = Decoder::create(DecoderKind::Cbd, p).unwrap();
        for _ in 0..(p.numpp() / 2) {
            dec.process_packet(enc.generate_packet()).unwrap();
        }
        let saved = dec.save();
        let mut restored = Decoder::restore(&saved).unwrap();
        assert_eq!(restored.dof(), dec.dof());

        while !dec.finished() {
            let pkt = enc.generate_packet();
            dec.process_packet(pkt.clone()).unwrap();
            restored.process_packet(pkt).unwrap();
        }
        assert!(restored.finished());
        assert_eq!(restored.recover_data().unwrap(), data);
    }
}
