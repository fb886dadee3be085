//! Contraction scheduling: partition the netlist, pick a merge order that
//! bounds intermediate growth, and drive the kernels serially or across a
//! worker pool.

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};

use log::{debug, info, warn};
use rayon::prelude::*;
use rayon::ThreadPool;

use super::error::SimError;
use super::result::NearSingular;
use super::sparams::{self, ScatterMatrix};

/// A live network in the scheduler's working set.
#[derive(Debug, Clone)]
pub(crate) struct LiveNet {
    pub smat: ScatterMatrix,
    /// Provenance per current port: (element slot, original port index).
    pub ports: Vec<(usize, usize)>,
    pub tag: String,
}

/// An unreduced connection between two live-net ports.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RedEdge {
    pub a: (usize, usize),
    pub b: (usize, usize),
    pub seq: u64,
}

/// Residual of an exhaustively reduced netlist.
#[derive(Debug, Clone)]
pub(crate) struct Reduced {
    pub smat: ScatterMatrix,
    pub ports: Vec<(usize, usize)>,
    pub diagnostics: Vec<NearSingular>,
}

/// One connected component of the topology graph; reduces independently.
#[derive(Debug, Clone)]
struct Partition {
    nets: Vec<Option<LiveNet>>,
    edges: Vec<RedEdge>,
}

/// Reduce a netlist to a single residual S-matrix.
///
/// With a pool, disjoint partitions run on separate workers and independent
/// edges inside a partition contract in parallel waves; the merge order is a
/// total order either way, so the residual does not depend on worker count.
pub(crate) fn reduce(
    nf: usize,
    nets: Vec<LiveNet>,
    edges: Vec<RedEdge>,
    pool: Option<&ThreadPool>,
) -> Result<Reduced, SimError> {
    if nets.is_empty() {
        return Err(SimError::DataError("network has no components".into()));
    }
    let parts = split_partitions(nets, edges);
    info!(
        "reducing {} partition(s), {} worker pool",
        parts.len(),
        if pool.is_some() { "with" } else { "no" }
    );

    let reduced: Vec<Reduced> = match pool {
        Some(pool) => pool.install(|| {
            parts
                .into_par_iter()
                .map(|p| reduce_partition_with_retry(p))
                .collect::<Result<Vec<_>, SimError>>()
        })?,
        None => parts
            .into_iter()
            .map(|p| reduce_partition(p, false))
            .collect::<Result<Vec<_>, SimError>>()?,
    };

    // Disconnected residuals stack block-diagonally, partition order fixed by
    // the smallest component id each partition contains.
    let mut iter = reduced.into_iter();
    let mut acc = match iter.next() {
        Some(first) => first,
        None => Reduced {
            smat: ScatterMatrix::zeros(nf, 0),
            ports: Vec::new(),
            diagnostics: Vec::new(),
        },
    };
    for part in iter {
        acc.smat = ScatterMatrix::block_diag(&acc.smat, &part.smat)?;
        acc.ports.extend(part.ports);
        acc.diagnostics.extend(part.diagnostics);
    }
    Ok(acc)
}

/// Split nets and edges into connected components, ordered by the smallest
/// component id each partition contains.
fn split_partitions(nets: Vec<LiveNet>, edges: Vec<RedEdge>) -> Vec<Partition> {
    let n = nets.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for e in &edges {
        let (ra, rb) = (find(&mut parent, e.a.0), find(&mut parent, e.b.0));
        if ra != rb {
            parent[ra.max(rb)] = ra.min(rb);
        }
    }

    let mut group_of_root: HashMap<usize, usize> = HashMap::new();
    let mut members: Vec<Vec<usize>> = Vec::new();
    for slot in 0..n {
        let root = find(&mut parent, slot);
        let g = *group_of_root.entry(root).or_insert_with(|| {
            members.push(Vec::new());
            members.len() - 1
        });
        members[g].push(slot);
    }

    let mut local: Vec<usize> = vec![0; n];
    for group in &members {
        for (pos, &slot) in group.iter().enumerate() {
            local[slot] = pos;
        }
    }

    let mut parts: Vec<Partition> = members
        .iter()
        .map(|group| Partition {
            nets: vec![None; group.len()],
            edges: Vec::new(),
        })
        .collect();
    for (slot, net) in nets.into_iter().enumerate() {
        let root = find(&mut parent, slot);
        parts[group_of_root[&root]].nets[local[slot]] = Some(net);
    }
    for e in edges {
        let root = find(&mut parent, e.a.0);
        parts[group_of_root[&root]].edges.push(RedEdge {
            a: (local[e.a.0], e.a.1),
            b: (local[e.b.0], e.b.1),
            seq: e.seq,
        });
    }
    // Tags still hold the original component ids at this point.
    parts.sort_by_cached_key(|p| {
        p.nets
            .iter()
            .flatten()
            .map(|n| n.tag.clone())
            .min()
            .unwrap_or_default()
    });
    parts
}

fn reduce_partition_with_retry(part: Partition) -> Result<Reduced, SimError> {
    let attempt = catch_unwind(AssertUnwindSafe(|| reduce_partition(part.clone(), true)));
    match attempt {
        Ok(res) => res,
        Err(_) => {
            warn!("worker panicked during partition reduction; retrying serially");
            reduce_partition(part, false)
        }
    }
}

/// Exhaustively contract one partition.
///
/// Each round sorts the remaining edges by the merge key (self-loops first,
/// then smallest combined port count, then insertion order) and contracts a
/// maximal wave of edges whose endpoint nets are pairwise disjoint. The wave
/// sequence is the same with or without workers; `parallel` only picks the
/// execution backend, so residuals and port order never depend on it.
fn reduce_partition(part: Partition, parallel: bool) -> Result<Reduced, SimError> {
    let Partition {
        mut nets,
        mut edges,
    } = part;
    let mut diagnostics = Vec::new();

    while !edges.is_empty() {
        let mut order: Vec<usize> = (0..edges.len()).collect();
        order.sort_by_key(|&i| merge_key(&edges[i], &nets));

        let mut used: HashSet<usize> = HashSet::new();
        let mut wave: Vec<usize> = Vec::new();
        for &i in &order {
            let e = &edges[i];
            if used.contains(&e.a.0) || used.contains(&e.b.0) {
                continue;
            }
            used.insert(e.a.0);
            used.insert(e.b.0);
            wave.push(i);
        }

        let outs: Vec<ContractOut> = if parallel && wave.len() > 1 {
            contract_wave_parallel(&nets, &edges, &wave)?
        } else {
            wave.iter()
                .map(|&i| contract_edge(&nets, &edges[i]))
                .collect::<Result<Vec<_>, SimError>>()?
        };
        debug!("contracted {} edge(s) in one round", outs.len());

        // Fused nets land in their target slots; every remaining edge is then
        // rewritten through the port maps of the nets that disappeared.
        let mut remap: HashMap<usize, (usize, Vec<Option<usize>>)> = HashMap::new();
        for out in outs {
            if !out.diag_bins.is_empty() {
                diagnostics.push(NearSingular {
                    context: out.net.tag.clone(),
                    bins: out.diag_bins,
                });
            }
            if let Some(freed) = out.freed {
                nets[freed] = None;
            }
            remap.insert(out.source_a, (out.target, out.map_a));
            if let Some((source_b, map_b)) = out.map_b {
                remap.insert(source_b, (out.target, map_b));
            }
            nets[out.target] = Some(out.net);
        }

        let wave_set: HashSet<usize> = wave.into_iter().collect();
        let mut idx = 0usize;
        edges.retain(|_| {
            let keep = !wave_set.contains(&idx);
            idx += 1;
            keep
        });
        for e in edges.iter_mut() {
            for end in [&mut e.a, &mut e.b] {
                if let Some((target, map)) = remap.get(&end.0) {
                    end.1 = map[end.1].expect("port is bound by at most one edge");
                    end.0 = *target;
                }
            }
        }
    }

    // Edgeless partitions hold exactly one net by construction.
    let slot = nets
        .iter()
        .position(|n| n.is_some())
        .expect("partition reduced to nothing");
    let net = nets[slot].take().expect("live net");
    Ok(Reduced {
        smat: net.smat,
        ports: net.ports,
        diagnostics,
    })
}

/// Merge-strategy key: self-loops win, then smallest composite, then the
/// order the edges were registered in.
fn merge_key(e: &RedEdge, nets: &[Option<LiveNet>]) -> (u8, usize, u64) {
    let na = nets[e.a.0].as_ref().map_or(0, |n| n.smat.nports());
    if e.a.0 == e.b.0 {
        (0, na, e.seq)
    } else {
        let nb = nets[e.b.0].as_ref().map_or(0, |n| n.smat.nports());
        (1, na + nb, e.seq)
    }
}

/// Result of contracting a single edge: the fused net, the slot it takes,
/// the slot it frees, and the per-source port maps used to rewrite the
/// remaining edges.
struct ContractOut {
    target: usize,
    freed: Option<usize>,
    source_a: usize,
    map_a: Vec<Option<usize>>,
    map_b: Option<(usize, Vec<Option<usize>>)>,
    net: LiveNet,
    diag_bins: Vec<usize>,
}

fn contract_edge(nets: &[Option<LiveNet>], e: &RedEdge) -> Result<ContractOut, SimError> {
    let a = nets[e.a.0].as_ref().expect("edge endpoint is live");
    if e.a.0 == e.b.0 {
        // Self-loop: both ports belong to one live net, contract in place.
        let (k, l) = (e.a.1, e.b.1);
        let c = sparams::innerconnect(&a.smat, k, l)?;
        let ports = drop_ports(&a.ports, &[k, l]);
        let map_a = survivor_map(a.ports.len(), &[k, l], 0);
        Ok(ContractOut {
            target: e.a.0,
            freed: None,
            source_a: e.a.0,
            map_a,
            map_b: None,
            net: LiveNet {
                smat: c.smat,
                ports,
                tag: a.tag.clone(),
            },
            diag_bins: c.near_singular_bins,
        })
    } else {
        let b = nets[e.b.0].as_ref().expect("edge endpoint is live");
        let (pa, pb) = (e.a.1, e.b.1);
        let c = sparams::connect(&a.smat, pa, &b.smat, pb)?;
        let mut ports = drop_ports(&a.ports, &[pa]);
        ports.extend(drop_ports(&b.ports, &[pb]));
        let map_a = survivor_map(a.ports.len(), &[pa], 0);
        let map_b = survivor_map(b.ports.len(), &[pb], a.ports.len() - 1);
        Ok(ContractOut {
            target: e.a.0.min(e.b.0),
            freed: Some(e.a.0.max(e.b.0)),
            source_a: e.a.0,
            map_a,
            map_b: Some((e.b.0, map_b)),
            net: LiveNet {
                smat: c.smat,
                ports,
                tag: format!("{}+{}", a.tag, b.tag),
            },
            diag_bins: c.near_singular_bins,
        })
    }
}

fn contract_wave_parallel(
    nets: &[Option<LiveNet>],
    edges: &[RedEdge],
    wave: &[usize],
) -> Result<Vec<ContractOut>, SimError> {
    let attempt = catch_unwind(AssertUnwindSafe(|| {
        wave.par_iter()
            .map(|&i| contract_edge(nets, &edges[i]))
            .collect::<Result<Vec<_>, SimError>>()
    }));
    match attempt {
        Ok(res) => res,
        Err(_) => {
            warn!("parallel contraction wave panicked; retrying serially");
            wave.iter()
                .map(|&i| contract_edge(nets, &edges[i]))
                .collect()
        }
    }
}

/// Provenance list with the given port positions removed, ascending order
/// preserved.
fn drop_ports(ports: &[(usize, usize)], removed: &[usize]) -> Vec<(usize, usize)> {
    ports
        .iter()
        .enumerate()
        .filter(|(p, _)| !removed.contains(p))
        .map(|(_, &prov)| prov)
        .collect()
}

/// Old-port → new-port map after removing `removed`, with surviving indices
/// shifted by `offset` (nonzero for the B side of a composite).
fn survivor_map(nports: usize, removed: &[usize], offset: usize) -> Vec<Option<usize>> {
    let mut map = Vec::with_capacity(nports);
    let mut next = offset;
    for p in 0..nports {
        if removed.contains(&p) {
            map.push(None);
        } else {
            map.push(Some(next));
            next += 1;
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    fn line(nf: usize, phi: f64, tag: &str, slot: usize) -> LiveNet {
        let smat = ScatterMatrix::from_fn(nf, 2, |_, i, j| {
            if i == j {
                Complex64::default()
            } else {
                Complex64::from_polar(1.0, phi)
            }
        });
        LiveNet {
            smat,
            ports: vec![(slot, 0), (slot, 1)],
            tag: tag.into(),
        }
    }

    fn chain_edges(n: usize) -> Vec<RedEdge> {
        (0..n - 1)
            .map(|i| RedEdge {
                a: (i, 1),
                b: (i + 1, 0),
                seq: i as u64,
            })
            .collect()
    }

    #[test]
    fn chain_of_lines_accumulates_phase() {
        let phis = [0.2, 0.5, 0.9, 1.3];
        let nets: Vec<LiveNet> = phis
            .iter()
            .enumerate()
            .map(|(i, &p)| line(1, p, &format!("w{}", i), i))
            .collect();
        let red = reduce(1, nets, chain_edges(4), None).unwrap();
        assert_eq!(red.smat.nports(), 2);
        assert_eq!(red.ports, vec![(0, 0), (3, 1)]);
        let expect = Complex64::from_polar(1.0, phis.iter().sum());
        assert!((red.smat.at(0, 1, 0) - expect).norm() < 1e-12);
        assert!((red.smat.at(0, 0, 1) - expect).norm() < 1e-12);
    }

    #[test]
    fn disconnected_nets_stack_block_diagonally() {
        let nets = vec![
            line(1, 0.4, "a", 0),
            line(1, 0.7, "b", 1),
            line(1, 1.1, "c", 2),
            line(1, 0.2, "d", 3),
        ];
        // Two chains: 0-1 and 2-3, no edge between them.
        let edges = vec![
            RedEdge {
                a: (0, 1),
                b: (1, 0),
                seq: 0,
            },
            RedEdge {
                a: (2, 1),
                b: (3, 0),
                seq: 1,
            },
        ];
        let red = reduce(1, nets, edges, None).unwrap();
        assert_eq!(red.smat.nports(), 4);
        assert_eq!(red.ports, vec![(0, 0), (1, 1), (2, 0), (3, 1)]);
        let t01 = Complex64::from_polar(1.0, 0.4 + 0.7);
        let t23 = Complex64::from_polar(1.0, 1.1 + 0.2);
        assert!((red.smat.at(0, 1, 0) - t01).norm() < 1e-12);
        assert!((red.smat.at(0, 3, 2) - t23).norm() < 1e-12);
        // Cross-partition entries are exactly zero.
        assert_eq!(red.smat.at(0, 2, 0), Complex64::default());
        assert_eq!(red.smat.at(0, 0, 3), Complex64::default());
    }

    #[test]
    fn partition_order_follows_smallest_component_id() {
        // Insertion order says z-chain first; the block-diagonal stack must
        // follow the smallest component id instead.
        let nets = vec![
            line(1, 0.4, "z_in", 0),
            line(1, 0.7, "z_out", 1),
            line(1, 1.1, "a_in", 2),
            line(1, 0.2, "a_out", 3),
        ];
        let edges = vec![
            RedEdge {
                a: (0, 1),
                b: (1, 0),
                seq: 0,
            },
            RedEdge {
                a: (2, 1),
                b: (3, 0),
                seq: 1,
            },
        ];
        let red = reduce(1, nets, edges, None).unwrap();
        assert_eq!(red.ports, vec![(2, 0), (3, 1), (0, 0), (1, 1)]);
        let t_a = Complex64::from_polar(1.0, 1.1 + 0.2);
        let t_z = Complex64::from_polar(1.0, 0.4 + 0.7);
        assert!((red.smat.at(0, 1, 0) - t_a).norm() < 1e-12);
        assert!((red.smat.at(0, 3, 2) - t_z).norm() < 1e-12);
    }

    #[test]
    fn self_loop_prefers_innerconnect_route() {
        // A 4-port whose ports 1 and 3 are tied together must reduce to the
        // same thing as a direct kernel call.
        let smat = ScatterMatrix::from_fn(2, 4, |t, i, j| {
            Complex64::from_polar(
                0.15 + 0.03 * (i + j) as f64,
                0.3 * t as f64 + (i as f64 - j as f64) * 0.5,
            )
        });
        let direct = sparams::innerconnect(&smat, 1, 3).unwrap();
        let nets = vec![LiveNet {
            smat,
            ports: (0..4).map(|p| (0, p)).collect(),
            tag: "loop".into(),
        }];
        let edges = vec![RedEdge {
            a: (0, 1),
            b: (0, 3),
            seq: 0,
        }];
        let red = reduce(2, nets, edges, None).unwrap();
        assert_eq!(red.smat.nports(), 2);
        assert_eq!(red.ports, vec![(0, 0), (0, 2)]);
        for t in 0..2 {
            for i in 0..2 {
                for j in 0..2 {
                    let err = (red.smat.at(t, i, j) - direct.smat.at(t, i, j)).norm();
                    assert!(err < 1e-12, "bin {} ({},{}) err {}", t, i, j, err);
                }
            }
        }
    }

    #[test]
    fn edge_order_does_not_change_the_residual() {
        let phis = [0.3, 0.8, 0.1, 0.6, 1.0];
        let build = |edge_perm: &[usize]| {
            let nets: Vec<LiveNet> = phis
                .iter()
                .enumerate()
                .map(|(i, &p)| line(1, p, &format!("w{}", i), i))
                .collect();
            let base = chain_edges(5);
            let edges: Vec<RedEdge> = edge_perm
                .iter()
                .enumerate()
                .map(|(seq, &i)| RedEdge {
                    seq: seq as u64,
                    ..base[i]
                })
                .collect();
            reduce(1, nets, edges, None).unwrap()
        };
        let fwd = build(&[0, 1, 2, 3]);
        let rev = build(&[3, 1, 0, 2]);
        assert_eq!(fwd.ports, rev.ports);
        for i in 0..2 {
            for j in 0..2 {
                let err = (fwd.smat.at(0, i, j) - rev.smat.at(0, i, j)).norm();
                assert!(err < 1e-10, "({},{}) err {}", i, j, err);
            }
        }
    }

    #[test]
    fn pool_and_serial_agree() {
        let phis: Vec<f64> = (0..12).map(|i| 0.1 * (i + 1) as f64).collect();
        let mk_nets = || -> Vec<LiveNet> {
            phis.iter()
                .enumerate()
                .map(|(i, &p)| line(8, p, &format!("w{}", i), i))
                .collect()
        };
        let serial = reduce(8, mk_nets(), chain_edges(12), None).unwrap();
        for threads in [1usize, 2, 4] {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .unwrap();
            let par = reduce(8, mk_nets(), chain_edges(12), Some(&pool)).unwrap();
            assert_eq!(par.ports, serial.ports);
            for t in 0..8 {
                for i in 0..2 {
                    for j in 0..2 {
                        let err = (par.smat.at(t, i, j) - serial.smat.at(t, i, j)).norm();
                        assert!(
                            err < 1e-10,
                            "{} threads bin {} ({},{}) err {}",
                            threads,
                            t,
                            i,
                            j,
                            err
                        );
                    }
                }
            }
        }
    }
}
