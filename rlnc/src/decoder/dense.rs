//! Dense-matrix decoder shared by BD, CBD, OA and PP.
//!
//! Grounded on `original_source/src/decoderBD.c`: accumulate rows,
//! reduce against installed pivots as they arrive, and once `DoF == snum`
//! splice free equations from the precode graph into any source column
//! that received combinations alone left undetermined
//! (`apply_parity_check_matrix`), then back-substitute once every column
//! has a pivot (`finish_recovering_BD`).
//!
//! This implementation keeps a column -> pivot-row map instead of BD's
//! explicit `otoc_mapping`/`ctoo_mapping` permutation arrays with
//! in-place row swaps: since pivot identity is tracked by a map rather
//! than physical position, no permutation bookkeeping is needed to know
//! which original column a given row currently represents. The three
//! non-GG variants (CBD/OA/PP) share this engine; they are
//! behaviorally identical to BD except for the order in which
//! zero-diagonal columns are offered precode rows during the parity
//! splice, which is all that distinguishes them per spec.md (no
//! original C source for CBD/OA/PP was available to ground a more
//! literal storage-level distinction — see DESIGN.md Open Question 3).

use log::{debug, info};

use crate::error::{EngineError, Result};
use crate::gf;
use crate::packet::Packet;
use crate::params::Params;
use crate::plan::Plan;
use crate::precode::Graph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenseVariant {
    Bd,
    Cbd,
    Oa,
    Pp,
}

struct Row {
    coeffs: Vec<u8>,
    message: Vec<u8>,
}

pub struct DenseDecoder {
    params: Params,
    plan: Plan,
    graph: Option<Graph>,
    variant: DenseVariant,
    numpp: usize,
    snum: usize,
    /// `pivot[c]` is the row whose leading (and only, once finished)
    /// nonzero coefficient is column `c`.
    pivot: Vec<Option<Row>>,
    dof: usize,
    overhead: usize,
    operations: u64,
    precode_applied: bool,
    finished: bool,
}

impl DenseDecoder {
    pub fn new(params: Params, variant: DenseVariant) -> Self {
        let plan = Plan::build(&params);
        let numpp = params.numpp();
        let snum = params.snum();
        let graph = if params.cnum() > 0 {
            Some(Graph::build(&params))
        } else {
            None
        };
        DenseDecoder {
            params,
            plan,
            graph,
            variant,
            numpp,
            snum,
            pivot: (0..numpp).map(|_| None).collect(),
            dof: 0,
            overhead: 0,
            operations: 0,
            precode_applied: false,
            finished: false,
        }
    }

    pub fn kind(&self) -> super::DecoderKind {
        match self.variant {
            DenseVariant::Bd => super::DecoderKind::Bd,
            DenseVariant::Cbd => super::DecoderKind::Cbd,
            DenseVariant::Oa => super::DecoderKind::Oa,
            DenseVariant::Pp => super::DecoderKind::Pp,
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

    /// Reduces `row`/`message` against every currently installed pivot,
    /// then installs it as a new pivot if it still has a nonzero entry.
    /// Returns `true` if a new DoF was gained.
    fn absorb(&mut self, mut coeffs: Vec<u8>, mut message: Vec<u8>) -> bool {
        let q = self.q();
        let n = self.nsym();
        for col in 0..self.numpp {
            if coeffs[col] == 0 {
                continue;
            }
            if let Some(p) = &self.pivot[col] {
                let factor = coeffs[col];
                Self::row_axpy(&mut coeffs, &p.coeffs, factor, q);
                Self::message_axpy(&mut message, &p.message, factor, q, n);
                self.operations += self.numpp as u64;
            }
        }
        let Some(lead) = (0..self.numpp).find(|&c| coeffs[c] != 0) else {
            return false;
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
        self.pivot[lead] = Some(Row { coeffs, message });
        self.dof += 1;
        true
    }

    pub fn process_packet(&mut self, pkt: Packet) -> Result<()> {
        self.overhead += 1;
        if self.finished {
            return Ok(());
        }
        let q = self.q();
        let mut coeffs = vec![0u8; self.numpp];
        if pkt.is_systematic() {
            coeffs[pkt.ucid as usize] = 1;
        } else {
            let gid = pkt.gid as usize;
            if gid >= self.plan.gene.len() {
                return Err(EngineError::Framing(format!("gid {gid} out of range")));
            }
            for (idx, &pktid) in self.plan.gene[gid].pktid.iter().enumerate() {
                let c = gf::read_element(&pkt.coes, q, idx);
                if c != 0 {
                    coeffs[pktid] = c;
                }
            }
        }
        self.absorb(coeffs, pkt.syms);

        if !self.precode_applied && self.dof >= self.snum {
            debug!("{:?} decoder reached snum DoF, applying parity check matrix", self.variant);
            self.apply_parity_check_matrix();
        }
        if self.dof == self.numpp && !self.finished {
            self.back_substitute();
            self.finished = true;
            info!(
                "{:?} decoder finished: overhead={} operations={}",
                self.variant, self.overhead, self.operations
            );
        }
        Ok(())
    }

    /// Splices free equations derived from the precode graph into any
    /// zero-diagonal column, iterating to a fixpoint since a parity row
    /// may only resolve once another parity row has installed first.
    fn apply_parity_check_matrix(&mut self) {
        self.precode_applied = true;
        let Some(graph) = self.graph.clone() else {
            return;
        };
        let order = self.zero_column_order();
        let mut progress = true;
        while progress {
            progress = false;
            for &checkidx in &order {
                let check_col = self.snum + checkidx;
                if self.pivot[check_col].is_some() {
                    continue;
                }
                let mut coeffs = vec![0u8; self.numpp];
                for edge in &graph.l_nbrs_of_r[checkidx] {
                    coeffs[edge.src] = edge.coeff;
                }
                coeffs[check_col] = 1;
                let message = vec![0u8; self.params.size_p];
                if self.absorb(coeffs, message) {
                    progress = true;
                }
            }
        }
    }

    /// Order in which zero-diagonal check columns are offered to the
    /// parity splice. BD/CBD use the natural order; OA prefers checks
    /// whose source neighbours overlap most with already-pivoted
    /// columns; PP prefers checks nearest the trailing edge of the
    /// current pivot frontier (approximating circular-band locality).
    fn zero_column_order(&self) -> Vec<usize> {
        let Some(graph) = &self.graph else { return Vec::new() };
        let cnum = graph.cnum;
        match self.variant {
            DenseVariant::Bd | DenseVariant::Cbd => (0..cnum).collect(),
            DenseVariant::Oa => {
                let mut order: Vec<usize> = (0..cnum).collect();
                order.sort_by_key(|&j| {
                    let overlap: usize = graph.l_nbrs_of_r[j]
                        .iter()
                        .filter(|e| self.pivot[e.src].is_some())
                        .count();
                    std::cmp::Reverse(overlap)
                });
                order
            }
            DenseVariant::Pp => {
                let pointer = self.dof;
                let mut order: Vec<usize> = (0..cnum).collect();
                order.sort_by_key(|&j| {
                    let col = self.snum + j;
                    (col + self.numpp - pointer) % self.numpp
                });
                order
            }
        }
    }

    /// Full back-substitution once every column has a pivot row: clears
    /// off-diagonal entries in every other column so each pivot row's
    /// message is exactly the recovered packet content.
    fn back_substitute(&mut self) {
        let q = self.q();
        let n = self.nsym();
        for col in 0..self.numpp {
            let Some((target_coeffs, target_message)) = self.pivot[col]
                .as_ref()
                .map(|r| (r.coeffs.clone(), r.message.clone()))
            else {
                continue;
            };
            for other in 0..self.numpp {
                if other == col {
                    continue;
                }
                let factor = match &self.pivot[other] {
                    Some(r) if r.coeffs[col] != 0 => r.coeffs[col],
                    _ => continue,
                };
                let r = self.pivot[other].as_mut().expect("checked above");
                Self::row_axpy(&mut r.coeffs, &target_coeffs, factor, q);
                Self::message_axpy(&mut r.message, &target_message, factor, q, n);
                self.operations += self.numpp as u64;
            }
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
            let row = self.pivot[i].as_ref().expect("finished decoder has every column pivoted");
            out.extend_from_slice(&row.message);
        }
        out.truncate(self.params.datasize);
        Ok(out)
    }

    pub fn save(&self) -> Vec<u8> {
        crate::checkpoint::save_dense(self)
    }

    pub(crate) fn params(&self) -> &Params {
        &self.params
    }

    pub(crate) fn variant(&self) -> DenseVariant {
        self.variant
    }

    pub(crate) fn snapshot(&self) -> (usize, usize, u64, bool, bool, Vec<Option<(Vec<u8>, Vec<u8>)>>) {
        let pivots = self
            .pivot
            .iter()
            .map(|p| p.as_ref().map(|r| (r.coeffs.clone(), r.message.clone())))
            .collect();
        (
            self.dof,
            self.overhead,
            self.operations,
            self.precode_applied,
            self.finished,
            pivots,
        )
    }

    pub(crate) fn from_snapshot(
        params: Params,
        variant: DenseVariant,
        dof: usize,
        overhead: usize,
        operations: u64,
        precode_applied: bool,
        finished: bool,
        pivots: Vec<Option<(Vec<u8>, Vec<u8>)>>,
    ) -> Self {
        let mut d = DenseDecoder::new(params, variant);
        d.dof = dof;
        d.overhead = overhead;
        d.operations = operations;
        d.precode_applied = precode_applied;
        d.finished = finished;
        d.pivot = pivots
            .into_iter()
            .map(|p| p.map(|(coeffs, message)| Row { coeffs, message }))
            .collect();
        d
    }
}
