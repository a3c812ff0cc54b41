//! Subgeneration planner: assigns source/parity packet ids to
//! subgenerations according to the session's `CodeType`.

use crate::params::{CodeType, Params};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn align(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

/// `n` distinct ids from `[0, ub)`, ascending. Grounded on
/// `get_random_unique_numbers` in the original: a full Fisher-Yates
/// shuffle of `[0, ub)` followed by taking the first `n` entries and
/// re-sorting, so that coefficients line up with strictly increasing
/// packet ids (simplifies every decoder's column bookkeeping).
fn random_unique_ids(rng: &mut StdRng, n: usize, ub: usize) -> Vec<usize> {
    let mut pool: Vec<usize> = (0..ub).collect();
    for i in (1..ub).rev() {
        let j = rng.gen_range(0..=i);
        pool.swap(i, j);
    }
    let mut ids: Vec<usize> = pool[..n].to_vec();
    ids.sort_unstable();
    ids
}

/// One subgeneration's packet membership, in ascending id order.
#[derive(Debug, Clone)]
pub struct Subgeneration {
    pub gid: usize,
    pub pktid: Vec<usize>,
}

/// The full subgeneration plan for a session: how many subgenerations
/// (`gnum`) and which packet ids each one spans.
#[derive(Debug, Clone)]
pub struct Plan {
    pub gnum: usize,
    pub gene: Vec<Subgeneration>,
}

impl Plan {
    pub fn build(params: &Params) -> Self {
        let numpp = params.numpp();
        let size_g = params.size_g;
        let size_b = params.size_b;
        let mut rng = StdRng::seed_from_u64(params.seed);
        // BAND's `+1` compensates for clamping the last band at `numpp -
        // size_g` instead of letting it run past the end; WINDWRAP never
        // clamps (it wraps instead), so it uses the plain ceil-division
        // gnum that RAND/BATS also use.
        let gnum = match params.code_type {
            CodeType::Band => align(numpp - size_g, size_b) + 1,
            _ => align(numpp, size_b),
        };

        let gene: Vec<Vec<usize>> = match params.code_type {
            CodeType::Band => {
                (0..gnum)
                    .map(|g| {
                        let mut start = g * size_b;
                        if start + size_g > numpp {
                            start = numpp - size_g;
                        }
                        (start..start + size_g).collect()
                    })
                    .collect()
            }
            CodeType::Windwrap => (0..gnum)
                .map(|g| {
                    let start = g * size_b;
                    let mut ids: Vec<usize> =
                        (0..size_g).map(|k| (start + k) % numpp).collect();
                    ids.sort_unstable();
                    ids
                })
                .collect(),
            CodeType::Rand | CodeType::Bats => (0..gnum)
                .map(|_| random_unique_ids(&mut rng, size_g, numpp))
                .collect(),
        };

        let gene = gene
            .into_iter()
            .enumerate()
            .map(|(gid, pktid)| Subgeneration { gid, pktid })
            .collect();

        Plan { gnum, gene }
    }

    /// Reverse index: for each packet id, the subgeneration ids containing
    /// it. Grounded on `build_subgen_nbr_list` in `common.c`.
    pub fn packet_neighbors(&self, numpp: usize) -> Vec<Vec<usize>> {
        let mut nbr = vec![Vec::new(); numpp];
        for sg in &self.gene {
            for &pid in &sg.pktid {
                if !nbr[pid].contains(&sg.gid) {
                    nbr[pid].push(sg.gid);
                }
            }
        }
        nbr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(code_type: CodeType) -> Params {
        Params {
            datasize: 1000,
            size_p: 100,
            size_b: 4,
            size_g: 8,
            size_c: 4,
            bpc: false,
            gfpower: 8,
            sys: true,
            code_type,
            seed: 42,
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn band_covers_every_packet_and_stays_in_range() {
        let p = params(CodeType::Band);
        let plan = Plan::build(&p);
        let numpp = p.numpp();
        let mut covered = vec![false; numpp];
        for sg in &plan.gene {
            assert_eq!(sg.pktid.len(), p.size_g);
            for w in sg.pktid.windows(2) {
                assert!(w[0] < w[1]);
            }
            for &id in &sg.pktid {
                assert!(id < numpp);
                covered[id] = true;
            }
        }
        assert!(covered.iter().all(|&c| c));
    }

    #[test]
    fn windwrap_wraps_and_every_subgen_has_right_size() {
        let p = params(CodeType::Windwrap);
        let plan = Plan::build(&p);
        for sg in &plan.gene {
            assert_eq!(sg.pktid.len(), p.size_g);
            assert!(sg.pktid.iter().all(|&id| id < p.numpp()));
            for w in sg.pktid.windows(2) {
                assert!(w[0] < w[1]);
            }
        }
    }

    #[test]
    fn rand_ids_are_unique_ascending_and_in_range() {
        let p = params(CodeType::Rand);
        let plan = Plan::build(&p);
        for sg in &plan.gene {
            assert_eq!(sg.pktid.len(), p.size_g);
            for w in sg.pktid.windows(2) {
                assert!(w[0] < w[1]);
            }
            assert!(sg.pktid.iter().all(|&id| id < p.numpp()));
        }
    }

    #[test]
    fn plan_is_deterministic_given_seed() {
        let p = params(CodeType::Rand);
        let a = Plan::build(&p);
        let b = Plan::build(&p);
        for (sa, sb) in a.gene.iter().zip(b.gene.iter()) {
            assert_eq!(sa.pktid, sb.pktid);
        }
    }
}
