//! Encoder: owns the (precoded) source packets and a deterministic RNG,
//! and emits coded packets on demand.

use log::info;

use crate::error::{EngineError, Result};
use crate::gf;
use crate::packet::Packet;
use crate::params::Params;
use crate::plan::Plan;
use crate::precode::Graph;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct Encoder {
    params: Params,
    plan: Plan,
    graph: Option<Graph>,
    pp: Vec<Vec<u8>>,
    rng: StdRng,
    count: usize,
}

impl Encoder {
    /// Splits `data` into `size_p`-byte source packets (zero-padded),
    /// builds the precode parity if `size_c > 0`, and builds the
    /// subgeneration plan.
    pub fn new(data: &[u8], params: Params) -> Result<Self> {
        let params = params.validate()?;
        if data.len() > params.datasize {
            return Err(EngineError::InvalidParams(
                "data longer than params.datasize".into(),
            ));
        }
        let snum = params.snum();
        let mut pp: Vec<Vec<u8>> = Vec::with_capacity(params.numpp());
        for i in 0..snum {
            let start = i * params.size_p;
            let end = (start + params.size_p).min(data.len());
            let mut block = vec![0u8; params.size_p];
            if start < data.len() {
                block[..end - start].copy_from_slice(&data[start..end]);
            }
            pp.push(block);
        }

        let graph = if params.size_c > 0 {
            Some(Graph::build(&params))
        } else {
            None
        };
        if let Some(g) = &graph {
            let parity = g.compute_parity(&pp, params.size_p, params.gfpower);
            pp.extend(parity);
        }

        let plan = Plan::build(&params);
        let rng = StdRng::seed_from_u64(params.seed ^ 0xe0c0_de12);

        info!(
            "encoder ready: snum={} cnum={} gnum={} gfpower={}",
            snum,
            params.cnum(),
            plan.gnum,
            params.gfpower
        );

        Ok(Encoder {
            params,
            plan,
            graph,
            pp,
            rng,
            count: 0,
        })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn graph(&self) -> Option<&Graph> {
        self.graph.as_ref()
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn source_packets(&self) -> &[Vec<u8>] {
        &self.pp
    }

    /// Produces the next coded packet. The first `snum` calls emit
    /// systematic packets when `params.sys` is set (SPEC_FULL §4.4);
    /// afterwards `gid` advances deterministically round-robin over
    /// subgenerations (SPEC_FULL §4.4a) and coefficients are sampled
    /// from the session RNG.
    pub fn generate_packet(&mut self) -> Packet {
        let snum = self.params.snum();
        if self.params.sys && self.count < snum {
            let ucid = self.count;
            self.count += 1;
            return Packet {
                gid: -1,
                ucid: ucid as i32,
                coes: vec![0u8; gf::packed_len(self.params.size_g, self.params.gfpower)],
                syms: self.pp[ucid].clone(),
            };
        }

        let gid = self.count % self.plan.gnum;
        self.count += 1;
        let sg = &self.plan.gene[gid];
        let q = self.params.gfpower;
        let mut coes = vec![0u8; gf::packed_len(sg.pktid.len(), q)];
        let mut syms = vec![0u8; self.params.size_p];
        for (idx, &pktid) in sg.pktid.iter().enumerate() {
            let c = self.rng.gen_range(0..(1u16 << q)) as u8;
            if c == 0 {
                continue;
            }
            gf::write_element(&mut coes, q, idx, c);
            let nsym = gf::elements_per_region(self.params.size_p, q);
            gf::mul_add_region(&mut syms, &self.pp[pktid], c, q, nsym);
        }
        Packet {
            gid: gid as i32,
            ucid: -1,
            coes,
            syms,
        }
    }
}
