//! GG decoder: generation-by-generation Gaussian elimination per
//! subgeneration, coupled to iterative precode recovery.
//!
//! Grounded on `original_source/src/decoderGG.c`. Each subgeneration
//! keeps its own small `size_g x size_g` triangular system (`rows`,
//! keyed by local pivot column, plus an `erased` bitmap for columns
//! already known from elsewhere). A global `recent` work queue drives
//! `perform_iterative_decoding`'s two halves: propagating a freshly
//! known source packet into the checks it neighbours
//! (`evolving_checks`/`check_degrees`), and pushing any freshly known
//! packet id into every subgeneration that references it so that
//! column becomes `erased` there too, cascading further completions.

use std::collections::VecDeque;

use log::{debug, info};

use crate::error::{EngineError, Result};
use crate::gf;
use crate::packet::Packet;
use crate::params::Params;
use crate::plan::Plan;
use crate::precode::Graph;

#[derive(Debug, Clone)]
struct Row {
    coeffs: Vec<u8>,
    message: Vec<u8>,
}

#[derive(Debug, Clone)]
struct SubgenState {
    size_g: usize,
    dof_miss: usize,
    erased: Vec<bool>,
    rows: Vec<Option<Row>>,
    finished: bool,
}

impl SubgenState {
    fn new(size_g: usize) -> Self {
        SubgenState {
            size_g,
            dof_miss: size_g,
            erased: vec![false; size_g],
            rows: vec![None; size_g],
            finished: false,
        }
    }
}

pub struct GgDecoder {
    params: Params,
    plan: Plan,
    graph: Option<Graph>,
    /// Reverse index: packet id -> subgeneration ids containing it.
    nbr: Vec<Vec<usize>>,
    numpp: usize,
    snum: usize,
    cnum: usize,
    pp: Vec<Option<Vec<u8>>>,
    subgens: Vec<SubgenState>,
    /// Running XOR of decoded source-neighbour contributions per check,
    /// excluding the check's own stored value.
    evolving_checks: Vec<Vec<u8>>,
    check_degrees: Vec<usize>,
    check_known: Vec<bool>,
    dof: usize,
    overhead: usize,
    operations: u64,
    finished: bool,
}

impl GgDecoder {
    pub fn new(params: Params) -> Self {
        let plan = Plan::build(&params);
        let numpp = params.numpp();
        let snum = params.snum();
        let cnum = params.cnum();
        let graph = if cnum > 0 {
            Some(Graph::build(&params))
        } else {
            None
        };
        let nbr = plan.packet_neighbors(numpp);
        let subgens = plan.gene.iter().map(|sg| SubgenState::new(sg.pktid.len())).collect();
        let evolving_checks = (0..cnum).map(|_| vec![0u8; params.size_p]).collect();
        let check_degrees = graph
            .as_ref()
            .map(|g| g.l_nbrs_of_r.iter().map(|e| e.len()).collect())
            .unwrap_or_default();
        let check_known = vec![false; cnum];

        GgDecoder {
            params,
            plan,
            graph,
            nbr,
            numpp,
            snum,
            cnum,
            pp: vec![None; numpp],
            subgens,
            evolving_checks,
            check_degrees,
            check_known,
            dof: 0,
            overhead: 0,
            operations: 0,
            finished: false,
        }
    }

    fn q(&self) -> u8 {
        self.params.gfpower
    }

    fn nsym(&self) -> usize {
        gf::elements_per_region(self.params.size_p, self.q())
    }

    fn row_axpy(dst: &mut [u8], src: &[u8], scalar: u8, q: u8) {
        if scalar == 0 {
            return;
        }
        for (d, s) in dst.iter_mut().zip(src.iter()) {
            *d = gf::add(*d, gf::mul(*s, scalar, q));
        }
    }

    fn message_axpy(dst: &mut [u8], src: &[u8], scalar: u8, q: u8, n: usize) {
        if scalar == 0 {
            return;
        }
        gf::mul_add_region(dst, src, scalar, q, n);
    }

    pub fn process_packet(&mut self, pkt: Packet) -> Result<()> {
        self.overhead += 1;
        if self.finished {
            return Ok(());
        }
        let mut queue: VecDeque<usize> = VecDeque::new();
        if pkt.is_systematic() {
            let ucid = pkt.ucid as usize;
            if ucid >= self.numpp {
                return Err(EngineError::Framing(format!("ucid {ucid} out of range")));
            }
            if self.pp[ucid].is_none() {
                self.pp[ucid] = Some(pkt.syms);
                self.dof += 1;
                queue.push_back(ucid);
            }
        } else {
            let gid = pkt.gid as usize;
            if gid >= self.plan.gene.len() {
                return Err(EngineError::Framing(format!("gid {gid} out of range")));
            }
            self.absorb_into_subgen(gid, &pkt.coes, pkt.syms, &mut queue);
        }
        self.drain_queue(queue);
        let was_finished = self.finished;
        self.finished = (0..self.snum).all(|i| self.pp[i].is_some());
        if self.finished && !was_finished {
            info!(
                "GG decoder finished: dof={} overhead={} operations={}",
                self.dof, self.overhead, self.operations
            );
        } else {
            debug!("GG decoder absorbed packet: dof={}/{}", self.dof, self.numpp);
        }
        Ok(())
    }

    /// Gaussian-reduces an incoming coded packet against `gid`'s local
    /// matrix; installs it as a new pivot row if it still carries a new
    /// DoF, cascading into `finish_subgen` once every column is pivoted.
    fn absorb_into_subgen(&mut self, gid: usize, coes: &[u8], syms: Vec<u8>, queue: &mut VecDeque<usize>) {
        if self.subgens[gid].finished {
            return;
        }
        let q = self.q();
        let n = self.nsym();
        let size_g = self.subgens[gid].size_g;
        let pktid = self.plan.gene[gid].pktid.clone();

        let mut coeffs = vec![0u8; size_g];
        for idx in 0..size_g {
            coeffs[idx] = gf::read_element(coes, q, idx);
        }
        let mut message = syms;

        for idx in 0..size_g {
            if coeffs[idx] == 0 {
                continue;
            }
            if let Some(known) = &self.pp[pktid[idx]] {
                let factor = coeffs[idx];
                coeffs[idx] = 0;
                Self::message_axpy(&mut message, known, factor, q, n);
            }
        }

        for col in 0..size_g {
            if coeffs[col] == 0 {
                continue;
            }
            if let Some(row) = self.subgens[gid].rows[col].clone() {
                let factor = coeffs[col];
                Self::row_axpy(&mut coeffs, &row.coeffs, factor, q);
                Self::message_axpy(&mut message, &row.message, factor, q, n);
                self.operations += size_g as u64;
            }
        }

        let Some(lead) = (0..size_g).find(|&c| coeffs[c] != 0) else {
            return;
        };
        let inv = gf::inverse(coeffs[lead], q);
        if inv != 1 {
            for c in coeffs.iter_mut() {
                *c = gf::mul(*c, inv, q);
            }
            let mut scaled = vec![0u8; message.len()];
            gf::mul_add_region(&mut scaled, &message, inv, q, n);
            message = scaled;
        }
        self.subgens[gid].rows[lead] = Some(Row { coeffs, message });
        self.subgens[gid].dof_miss -= 1;

        if self.subgens[gid].dof_miss == 0 {
            self.finish_subgen(gid, queue);
        }
    }

    /// Back-substitutes `gid`'s now-complete system and copies every
    /// recovered packet out into the global `pp` mirror, queuing any
    /// that were not already known.
    fn finish_subgen(&mut self, gid: usize, queue: &mut VecDeque<usize>) {
        let q = self.q();
        let n = self.nsym();
        let size_g = self.subgens[gid].size_g;

        for col in 0..size_g {
            let Some((target_coeffs, target_message)) = self.subgens[gid].rows[col]
                .as_ref()
                .map(|r| (r.coeffs.clone(), r.message.clone()))
            else {
                continue;
            };
            for other in 0..size_g {
                if other == col {
                    continue;
                }
                let factor = match &self.subgens[gid].rows[other] {
                    Some(r) if r.coeffs[col] != 0 => r.coeffs[col],
                    _ => continue,
                };
                let r = self.subgens[gid].rows[other].as_mut().expect("checked above");
                Self::row_axpy(&mut r.coeffs, &target_coeffs, factor, q);
                Self::message_axpy(&mut r.message, &target_message, factor, q, n);
                self.operations += size_g as u64;
            }
        }

        let pktid = self.plan.gene[gid].pktid.clone();
        for (col, &global_id) in pktid.iter().enumerate() {
            let value = self.subgens[gid].rows[col]
                .as_ref()
                .expect("complete subgen has every column pivoted")
                .message
                .clone();
            if self.pp[global_id].is_none() {
                self.pp[global_id] = Some(value);
                self.dof += 1;
                queue.push_back(global_id);
            }
        }
        self.subgens[gid].finished = true;
    }

    /// Drains the work queue to a fixpoint: every freshly known packet
    /// id is propagated through the precode graph (source ids feed
    /// `evolving_checks`/`check_degrees`; check ids flip `check_known`)
    /// and erased from every subgeneration that still references it,
    /// which may itself complete further subgenerations and enqueue
    /// more ids.
    fn drain_queue(&mut self, mut queue: VecDeque<usize>) {
        while let Some(id) = queue.pop_front() {
            if let Some(graph) = self.graph.clone() {
                if id < self.snum {
                    let value = self.pp[id].clone().expect("queued id must be known");
                    let q = self.q();
                    let n = self.nsym();
                    for &c in &graph.r_nbrs_of_l[id] {
                        let edge = graph.l_nbrs_of_r[c]
                            .iter()
                            .find(|e| e.src == id)
                            .expect("reverse index must agree with forward edges");
                        Self::message_axpy(&mut self.evolving_checks[c], &value, edge.coeff, q, n);
                        self.check_degrees[c] -= 1;
                        self.try_resolve_check(c, &mut queue);
                    }
                } else {
                    let c = id - self.snum;
                    self.check_known[c] = true;
                    self.try_resolve_check(c, &mut queue);
                }
            }

            for gid in self.nbr[id].clone() {
                self.erase_in_subgen(gid, id, &mut queue);
            }
        }
    }

    /// If check `c` has exactly one neighbour left unresolved and its
    /// own value is known, recovers that neighbour by dividing the
    /// residual (`pp[check] XOR evolving_checks[c]`) by the neighbour's
    /// edge coefficient.
    fn try_resolve_check(&mut self, c: usize, queue: &mut VecDeque<usize>) {
        if self.check_degrees[c] != 1 || !self.check_known[c] {
            return;
        }
        let Some(graph) = self.graph.clone() else { return };
        let Some(edge) = graph.l_nbrs_of_r[c].iter().find(|e| self.pp[e.src].is_none()).copied() else {
            return;
        };
        let check_value = self.pp[self.snum + c].clone().expect("check_known implies pp[check] is Some");
        let diff: Vec<u8> = check_value
            .iter()
            .zip(self.evolving_checks[c].iter())
            .map(|(a, b)| a ^ b)
            .collect();
        let q = self.q();
        let n = self.nsym();
        let inv = gf::inverse(edge.coeff, q);
        let mut value = vec![0u8; self.params.size_p];
        gf::mul_add_region(&mut value, &diff, inv, q, n);
        self.operations += n as u64;

        if self.pp[edge.src].is_none() {
            self.pp[edge.src] = Some(value);
            self.dof += 1;
            queue.push_back(edge.src);
        }
    }

    /// Cancels a just-learned packet id out of every row of `gid`'s
    /// matrix that still references it, then installs it as a singleton
    /// pivot if that column had not already been pivoted, completing
    /// the subgeneration if that was its last missing column.
    fn erase_in_subgen(&mut self, gid: usize, id: usize, queue: &mut VecDeque<usize>) {
        if self.subgens[gid].finished {
            return;
        }
        let Some(local) = self.plan.gene[gid].pktid.iter().position(|&p| p == id) else {
            return;
        };
        if self.subgens[gid].erased[local] {
            return;
        }
        let value = self.pp[id].clone().expect("erase_in_subgen called only for known ids");
        let q = self.q();
        let n = self.nsym();

        for row in self.subgens[gid].rows.iter_mut().flatten() {
            let factor = row.coeffs[local];
            if factor != 0 {
                row.coeffs[local] = 0;
                gf::mul_add_region(&mut row.message, &value, factor, q, n);
            }
        }
        self.subgens[gid].erased[local] = true;

        if self.subgens[gid].rows[local].is_none() {
            let size_g = self.subgens[gid].size_g;
            let mut coeffs = vec![0u8; size_g];
            coeffs[local] = 1;
            self.subgens[gid].rows[local] = Some(Row { coeffs, message: value });
            self.subgens[gid].dof_miss -= 1;
        }

        if self.subgens[gid].dof_miss == 0 {
            self.finish_subgen(gid, queue);
        }
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn dof(&self) -> usize {
        self.dof
    }

    pub fn overhead(&self) -> usize {
        self.overhead
    }

    pub fn cost(&self) -> u64 {
        self.operations
    }

    pub fn recover_data(&self) -> Result<Vec<u8>> {
        if !self.finished {
            return Err(EngineError::InvalidParams(
                "decoder has not recovered all source packets yet".into(),
            ));
        }
        let mut out = Vec::with_capacity(self.snum * self.params.size_p);
        for i in 0..self.snum {
            out.extend_from_slice(self.pp[i].as_ref().expect("finished implies every source is known"));
        }
        out.truncate(self.params.datasize);
        Ok(out)
    }

    pub fn save(&self) -> Vec<u8> {
        crate::checkpoint::save_gg(self)
    }

    pub(crate) fn params(&self) -> &Params {
        &self.params
    }

    #[allow(clippy::type_complexity)]
    pub(crate) fn snapshot(
        &self,
    ) -> (
        usize,
        usize,
        u64,
        bool,
        Vec<Option<Vec<u8>>>,
        Vec<(usize, Vec<bool>, Vec<Option<(Vec<u8>, Vec<u8>)>>, bool)>,
        Vec<Vec<u8>>,
        Vec<usize>,
        Vec<bool>,
    ) {
        let subgens = self
            .subgens
            .iter()
            .map(|s| {
                (
                    s.dof_miss,
                    s.erased.clone(),
                    s.rows.iter().map(|r| r.as_ref().map(|row| (row.coeffs.clone(), row.message.clone()))).collect(),
                    s.finished,
                )
            })
            .collect();
        (
            self.dof,
            self.overhead,
            self.operations,
            self.finished,
            self.pp.clone(),
            subgens,
            self.evolving_checks.clone(),
            self.check_degrees.clone(),
            self.check_known.clone(),
        )
    }

    #[allow(clippy::type_complexity)]
    pub(crate) fn from_snapshot(
        params: Params,
        dof: usize,
        overhead: usize,
        operations: u64,
        finished: bool,
        pp: Vec<Option<Vec<u8>>>,
        subgens: Vec<(usize, Vec<bool>, Vec<Option<(Vec<u8>, Vec<u8>)>>, bool)>,
        evolving_checks: Vec<Vec<u8>>,
        check_degrees: Vec<usize>,
        check_known: Vec<bool>,
    ) -> Self {
        let mut d = GgDecoder::new(params);
        d.dof = dof;
        d.overhead = overhead;
        d.operations = operations;
        d.finished = finished;
        d.pp = pp;
        d.subgens = subgens
            .into_iter()
            .map(|(dof_miss, erased, rows, fin)| SubgenState {
                size_g: erased.len(),
                dof_miss,
                erased,
                rows: rows
                    .into_iter()
                    .map(|r| r.map(|(coeffs, message)| Row { coeffs, message }))
                    .collect(),
                finished: fin,
            })
            .collect();
        d.evolving_checks = evolving_checks;
        d.check_degrees = check_degrees;
        d.check_known = check_known;
        d
    }
}
