//! BATS recoder buffer: a single FIFO ring across all batches, with a
//! sending-batch pointer and a per-batch transmission cap (BTS).
//!
//! Grounded on `original_source/src/sncRecoderBATS.c`. The two statics
//! the original kept at file scope (`s_neq_r`, `s_count`) are fields of
//! `BatsRecoderBuffer` here (SPEC_FULL §9/§4.6a).

use crate::gf;
use crate::packet::Packet;
use crate::params::Params;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct BatsRecoderBuffer {
    params: Params,
    bufsize: usize,
    ring: Vec<Option<Packet>>,
    /// Batch id (`gid`) currently being sent, or `None` if nothing has
    /// been buffered yet.
    sbatchid: Option<i32>,
    s_first: usize,
    r_last: usize,
    /// Whether more than one batch is currently buffered.
    s_neq_r: bool,
    /// Packets sent from the current sending batch so far.
    s_count: usize,
    rng: StdRng,
}

impl BatsRecoderBuffer {
    pub fn new(params: Params, bufsize: usize) -> Self {
        BatsRecoderBuffer {
            rng: StdRng::seed_from_u64(params.seed ^ 0xba75_0000),
            params,
            bufsize,
            ring: (0..bufsize).map(|_| None).collect(),
            sbatchid: None,
            s_first: 0,
            r_last: 0,
            s_neq_r: false,
            s_count: 0,
        }
    }

    pub fn buffer_packet(&mut self, pkt: Packet) {
        let Some(current) = self.sbatchid else {
            self.r_last = 0;
            self.s_first = 0;
            self.sbatchid = Some(pkt.gid);
            self.ring[0] = Some(pkt);
            return;
        };

        if pkt.gid != current {
            self.s_neq_r = true;
        }

        let next_r = (self.r_last + 1) % self.bufsize;
        if next_r == self.s_first {
            // Full: evict the oldest slot.
            let new_sfirst = (self.s_first + 1) % self.bufsize;
            let pos = self.s_first;
            self.ring[pos] = Some(pkt);
            self.r_last = pos;

            let new_first_gid = self.ring[new_sfirst].as_ref().map(|p| p.gid);
            if new_first_gid != Some(current) {
                self.s_first = new_sfirst;
                self.sbatchid = new_first_gid;
                self.s_count = 0;
                self.s_neq_r = false;
            } else {
                self.s_first = new_sfirst;
            }
        } else {
            let pos = next_r;
            self.ring[pos] = Some(pkt);
            self.r_last = pos;
        }
    }

    /// Recodes one packet mixing only same-batch entries starting at
    /// `s_first`, or `None` if the single buffered batch already hit its
    /// BTS cap. Grounded on `snc_recode_packet_bats_im`.
    pub fn recode_packet(&mut self) -> Option<Packet> {
        let sbatchid = self.sbatchid?;
        let size_b = self.params.size_b;

        if self.s_count >= size_b && !self.s_neq_r {
            return None;
        }
        if self.s_count >= size_b && self.s_neq_r {
            let mut switched = false;
            for i in 0..self.bufsize {
                let pos = (self.s_first + i) % self.bufsize;
                if let Some(p) = &self.ring[pos] {
                    if p.gid != sbatchid {
                        self.sbatchid = Some(p.gid);
                        self.s_first = pos;
                        self.s_count = 0;
                        switched = true;
                        break;
                    }
                }
            }
            if switched {
                self.s_neq_r = false;
            }
        }
        let sbatchid = self.sbatchid?;
        let s_pos = self.s_first;
        let q = self.params.gfpower;
        let size_g = self.params.size_g;

        let mut coes = vec![0u8; gf::packed_len(size_g, q)];
        let mut syms = vec![0u8; self.params.size_p];
        for i in 0..self.bufsize {
            let pos = (s_pos + i) % self.bufsize;
            let Some(p) = &self.ring[pos] else { break };
            if p.gid != sbatchid {
                break;
            }
            let co = self.rng.gen_range(0..(1u16 << q)) as u8;
            if co == 0 {
                continue;
            }
            let nsym = gf::elements_per_region(self.params.size_p, q);
            gf::mul_add_region(&mut coes, &p.coes, co, q, size_g);
            gf::mul_add_region(&mut syms, &p.syms, co, q, nsym);
        }
        self.s_count += 1;
        Some(Packet {
            gid: sbatchid,
            ucid: -1,
            coes,
            syms,
        })
    }
}
