//! LDPC-style bipartite precode graph: `size_c` check (parity) nodes,
//! each connected to a random subset of the `snum` source nodes.

use crate::gf;
use crate::params::Params;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One edge from a check node to a source node, carrying the GF
/// coefficient used when folding the parity packet.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub src: usize,
    pub coeff: u8,
}

/// Bipartite precode graph. `l_nbrs_of_r[j]` lists the source-node edges
/// of check node `j`; `r_nbrs_of_l[i]` lists the check nodes that depend
/// on source node `i` (needed by the GG decoder's iterative propagation).
#[derive(Debug, Clone)]
pub struct Graph {
    pub snum: usize,
    pub cnum: usize,
    pub l_nbrs_of_r: Vec<Vec<Edge>>,
    pub r_nbrs_of_l: Vec<Vec<usize>>,
}

impl Graph {
    /// Builds a graph reproducible from `params.seed` alone, with each
    /// check node's degree drawn uniformly from `[3, max(3, 2*snum/cnum))`
    /// (see SPEC_FULL §4.2a — the original's `bipartite.c` degree
    /// distribution was not retained in the source pack this crate was
    /// built against).
    pub fn build(params: &Params) -> Self {
        let snum = params.snum();
        let cnum = params.cnum();
        let mut rng = StdRng::seed_from_u64(params.seed ^ 0x5eed_c0de);
        let max_degree = ((2 * snum) / cnum.max(1)).max(3);

        let mut l_nbrs_of_r = Vec::with_capacity(cnum);
        let mut r_nbrs_of_l = vec![Vec::new(); snum];

        for j in 0..cnum {
            let degree = if max_degree <= 3 {
                3.min(snum)
            } else {
                rng.gen_range(3..=max_degree).min(snum)
            };
            let mut pool: Vec<usize> = (0..snum).collect();
            for i in (1..snum).rev() {
                let k = rng.gen_range(0..=i);
                pool.swap(i, k);
            }
            let mut neighbors: Vec<usize> = pool[..degree].to_vec();
            neighbors.sort_unstable();

            let edges: Vec<Edge> = neighbors
                .into_iter()
                .map(|src| {
                    let coeff = if params.bpc {
                        1
                    } else {
                        loop {
                            let c = rng.gen_range(0..(1u16 << params.gfpower)) as u8;
                            if c != 0 {
                                break c;
                            }
                        }
                    };
                    r_nbrs_of_l[src].push(j);
                    Edge { src, coeff }
                })
                .collect();
            l_nbrs_of_r.push(edges);
        }

        Graph {
            snum,
            cnum,
            l_nbrs_of_r,
            r_nbrs_of_l,
        }
    }

    /// Computes parity packet `snum + j` from already-known source
    /// packets `pp[0..snum)`: `pp[snum+j] = sum_i coeff_i * pp[src_i]`.
    pub fn compute_parity(&self, pp: &[Vec<u8>], size_p: usize, gfpower: u8) -> Vec<Vec<u8>> {
        self.l_nbrs_of_r
            .iter()
            .map(|edges| {
                let mut acc = vec![0u8; size_p];
                for edge in edges {
                    let nsym = gf::elements_per_region(size_p, gfpower);
                    gf::mul_add_region(&mut acc, &pp[edge.src], edge.coeff, gfpower, nsym);
                }
                acc
            })
            .collect()
    }
}
