//! Standard recoder buffer: holds received coded packets per
//! subgeneration and re-mixes them into outgoing recoded packets.
//!
//! Grounded on `original_source/src/sncRecoder.c` end to end. The two
//! statics the original kept at file scope (`sc`, `gene_nbr`, needed only
//! to duplicate systematic packets into every subgeneration that
//! contains them) are fields of `RecoderBuffer` here — SPEC_FULL §9/§4.5a
//! calls out the process-wide statics as a defect to fix, not a behavior
//! to replicate.

use crate::gf;
use crate::packet::Packet;
use crate::params::Params;
use crate::plan::Plan;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Recode scheduling policy. The `*Sys` variants opportunistically
/// forward a pending systematic packet before falling back to their
/// non-systematic counterpart (TRIV and NURAND have no `*Sys` variant in
/// the original either).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Triv,
    Rand,
    RandSys,
    Mlpi,
    MlpiSys,
    Nurand,
}

pub struct RecoderBuffer {
    params: Params,
    plan: Plan,
    /// Reverse index: packet id -> subgeneration ids containing it. Only
    /// populated (non-empty entries) when `params.sys` is set.
    packet_neighbors: Vec<Vec<usize>>,
    bufsize: usize,
    gbuf: Vec<Vec<Option<Packet>>>,
    nc: Vec<usize>,
    pn: Vec<usize>,
    nsched: Vec<usize>,
    nemp: usize,
    /// `Some((gid, idx))` when the most recently buffered packet was
    /// systematic and has not yet been scheduled or superseded.
    newsys: Option<(usize, usize)>,
    rng: StdRng,
}

impl RecoderBuffer {
    pub fn new(params: Params, bufsize: usize) -> Self {
        let plan = Plan::build(&params);
        let numpp = params.numpp();
        let packet_neighbors = if params.sys {
            plan.packet_neighbors(numpp)
        } else {
            Vec::new()
        };
        let gnum = plan.gnum;
        RecoderBuffer {
            params,
            plan,
            packet_neighbors,
            bufsize,
            gbuf: (0..gnum).map(|_| (0..bufsize).map(|_| None).collect()).collect(),
            nc: vec![0; gnum],
            pn: vec![0; gnum],
            nsched: vec![0; gnum],
            nemp: 0,
            newsys: None,
            rng: StdRng::seed_from_u64(params.seed ^ 0xb0f0_fade),
        }
    }

    pub fn gnum(&self) -> usize {
        self.plan.gnum
    }

    /// Absorbs a packet. A systematic packet is duplicated, with its
    /// coefficient rewritten to a unit vector, into every subgeneration
    /// containing its source id. A normal packet is stored in an empty
    /// slot, appended while the buffer has room, or folded into every
    /// buffered packet of its subgeneration via the Lun2006
    /// accumulator-update rule once the buffer is full.
    pub fn buffer_packet(&mut self, pkt: Packet) {
        let q = self.params.gfpower;
        let size_g = self.params.size_g;

        if pkt.is_systematic() {
            let ucid = pkt.ucid as usize;
            let mut set_sched = false;
            for &sgid in self.packet_neighbors[ucid].clone().iter() {
                let relative_idx = self.plan.gene[sgid]
                    .pktid
                    .iter()
                    .position(|&id| id == ucid)
                    .expect("packet_neighbors must agree with plan membership");
                let mut coes = vec![0u8; gf::packed_len(size_g, q)];
                gf::write_element(&mut coes, q, relative_idx, 1);
                let copy = Packet {
                    gid: sgid as i32,
                    ucid: pkt.ucid,
                    coes,
                    syms: pkt.syms.clone(),
                };
                let slot = self.pn[sgid];
                self.gbuf[sgid][slot] = Some(copy);
                if !set_sched {
                    self.newsys = Some((sgid, slot));
                    set_sched = true;
                }
                if self.nc[sgid] == 0 {
                    self.nemp += 1;
                }
                if self.nc[sgid] < self.bufsize {
                    self.nc[sgid] += 1;
                }
                self.pn[sgid] = (self.pn[sgid] + 1) % self.bufsize;
            }
            return;
        }

        self.newsys = None;
        let gid = pkt.gid as usize;
        if self.nc[gid] == 0 {
            self.gbuf[gid][0] = Some(pkt);
            self.nc[gid] += 1;
            self.nemp += 1;
        } else if self.nc[gid] < self.bufsize {
            let slot = self.pn[gid];
            self.gbuf[gid][slot] = Some(pkt);
            self.nc[gid] += 1;
        } else {
            // Buffer full: fold the incoming packet into every buffered
            // packet with a random nonzero-or-zero coefficient (Lun2006).
            for i in 0..self.bufsize {
                let co = self.rng.gen_range(0..(1u16 << q)) as u8;
                if co == 0 {
                    continue;
                }
                let nsym = gf::elements_per_region(self.params.size_p, q);
                let buffered = self.gbuf[gid][i].as_mut().expect("full slot must hold a packet");
                gf::mul_add_region(&mut buffered.coes, &pkt.coes, co, q, size_g);
                gf::mul_add_region(&mut buffered.syms, &pkt.syms, co, q, nsym);
            }
        }
        self.pn[gid] = (self.pn[gid] + 1) % self.bufsize;
    }

    /// Produces one recoded packet, or `None` if every subgeneration is
    /// currently empty.
    pub fn recode_packet(&mut self, sched: Schedule) -> Option<Packet> {
        let gid = self.schedule_recode_generation(sched)?;
        let q = self.params.gfpower;
        let size_g = self.params.size_g;

        if gid == self.plan.gnum {
            // Forward the pending systematic packet verbatim (symbols
            // only; the original never recomputes its coefficients).
            let (sgid, idx) = self.newsys.take().expect("gid==gnum implies newsys is set");
            let buffered = self.gbuf[sgid][idx].as_ref().expect("scheduled slot must be occupied");
            return Some(Packet {
                gid: -1,
                ucid: buffered.ucid,
                coes: vec![0u8; gf::packed_len(size_g, q)],
                syms: buffered.syms.clone(),
            });
        }

        let mut coes = vec![0u8; gf::packed_len(size_g, q)];
        let mut syms = vec![0u8; self.params.size_p];
        for i in 0..self.nc[gid] {
            let co = self.rng.gen_range(0..(1u16 << q)) as u8;
            if co == 0 {
                continue;
            }
            let buffered = self.gbuf[gid][i].as_ref().expect("nc[gid] slots must be occupied");
            let nsym = gf::elements_per_region(self.params.size_p, q);
            gf::mul_add_region(&mut coes, &buffered.coes, co, q, size_g);
            gf::mul_add_region(&mut syms, &buffered.syms, co, q, nsym);
        }
        Some(Packet {
            gid: gid as i32,
            ucid: -1,
            coes,
            syms,
        })
    }

    /// Returns `Some(gid)` for a normal generation, `Some(gnum)` to mean
    /// "forward the pending systematic packet", or `None` if nothing is
    /// bufferable yet. Grounded on `schedule_recode_generation` /
    /// `banded_nonuniform_sched`.
    fn schedule_recode_generation(&mut self, sched: Schedule) -> Option<usize> {
        if self.nemp == 0 {
            return None;
        }

        if matches!(sched, Schedule::RandSys | Schedule::MlpiSys) && self.newsys.is_some() {
            return Some(self.plan.gnum);
        }

        match sched {
            Schedule::Triv => {
                let gid = self.rng.gen_range(0..self.plan.gnum);
                self.nsched[gid] += 1;
                Some(gid)
            }
            Schedule::Rand | Schedule::RandSys => {
                let index = self.rng.gen_range(0..self.nemp);
                let mut seen = 0usize;
                let mut gid = 0usize;
                loop {
                    if self.nc[gid] != 0 {
                        if seen == index {
                            break;
                        }
                        seen += 1;
                    }
                    gid += 1;
                }
                self.nsched[gid] += 1;
                Some(gid)
            }
            Schedule::Mlpi | Schedule::MlpiSys => {
                let mut gid = 0usize;
                let mut max = self.nc[0] as isize - self.nsched[0] as isize;
                for j in 1..self.plan.gnum {
                    let v = self.nc[j] as isize - self.nsched[j] as isize;
                    if v > max {
                        max = v;
                        gid = j;
                    }
                }
                self.nsched[gid] += 1;
                Some(gid)
            }
            Schedule::Nurand => Some(self.banded_nonuniform_sched()),
        }
    }

    /// Non-uniform scheduling for banded codes: subgens 0 and `gnum-1`
    /// each get weight `size_g+1`, interior subgens get weight 2, drawn
    /// by rejection sampling until a non-empty subgen is hit. Ported
    /// directly from `banded_nonuniform_sched`.
    fn banded_nonuniform_sched(&mut self) -> usize {
        let m = self.params.numpp();
        let g = self.params.size_g;
        let upperb = 2 * (g + 1) + 2 * (m - g - 1);
        loop {
            let draw = self.rng.gen_range(0..upperb) + 1;
            let selected = if draw <= g + 1 {
                0
            } else if draw > g + 1 + 2 * (m - g - 1) {
                self.plan.gnum - 1
            } else {
                let residual = draw - (g + 1);
                residual / 2 + 1
            };
            if self.nc[selected] != 0 {
                return selected;
            }
        }
    }
}
