use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::element::{Element, PortRef, ScatterModel};
use super::error::SimError;
use super::freq::FrequencyGrid;
use super::reduction::{self, LiveNet, RedEdge};
use super::result::{ExternalPort, SimulationResult};

/// Worker-pool configuration for `simulate_network`.
///
/// `proc_count = 0` auto-detects the core count. `close_pool` tears the pool
/// down after every simulation instead of keeping it warm across calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MpConfig {
    pub enabled: bool,
    pub proc_count: usize,
    pub close_pool: bool,
}

impl Default for MpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            proc_count: 0,
            close_pool: false,
        }
    }
}

/// Simulation lifecycle of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimState {
    Unsimulated,
    Simulating,
    Simulated,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    a: (usize, usize),
    b: (usize, usize),
    seq: u64,
}

/// A netlist: components on a shared frequency grid plus port-to-port edges.
///
/// Assembled incrementally, then collapsed to a single residual S-matrix by
/// `simulate_network`. Mutating a simulated network invalidates its cached
/// result and returns it to `Unsimulated`.
pub struct Network {
    id: String,
    freq: FrequencyGrid,
    elements: Vec<Element>,
    slots: HashMap<String, usize>,
    edges: Vec<Edge>,
    bound: HashSet<(usize, usize)>,
    state: SimState,
    counter: u64,
    edge_seq: u64,
    mp: MpConfig,
    pool: Option<Arc<rayon::ThreadPool>>,
    cached: Option<SimulationResult>,
}

impl Network {
    /// New network on the default C-band grid.
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_config(id, None, None)
    }

    pub fn with_grid(id: impl Into<String>, freq: FrequencyGrid) -> Self {
        Self::with_config(id, Some(freq), None)
    }

    pub fn with_config(
        id: impl Into<String>,
        freq: Option<FrequencyGrid>,
        mp: Option<MpConfig>,
    ) -> Self {
        Self {
            id: id.into(),
            freq: freq.unwrap_or_else(FrequencyGrid::c_band),
            elements: Vec::new(),
            slots: HashMap::new(),
            edges: Vec::new(),
            bound: HashSet::new(),
            state: SimState::Unsimulated,
            counter: 0,
            edge_seq: 0,
            mp: mp.unwrap_or_default(),
            pool: None,
            cached: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn freq(&self) -> &FrequencyGrid {
        &self.freq
    }

    pub fn state(&self) -> SimState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.slots.get(id).map(|&slot| &self.elements[slot])
    }

    pub fn component_ids(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().map(|e| e.id())
    }

    /// The result of the most recent `simulate_network`, if still valid.
    pub fn sim_result(&self) -> Option<&SimulationResult> {
        self.cached.as_ref()
    }

    /// Add a component under an automatically derived unique id.
    ///
    /// The model's own label is used when free, otherwise suffixed from a
    /// monotonic counter. Data stored on a different grid is interpolated
    /// onto the network's axis.
    pub fn add_component<M: ScatterModel + ?Sized>(
        &mut self,
        model: &M,
    ) -> Result<String, SimError> {
        self.ensure_mutable()?;
        let id = self.unique_id(model.label());
        self.insert(model, id)
    }

    /// Add a component under a caller-chosen id.
    pub fn add_component_as<M: ScatterModel + ?Sized>(
        &mut self,
        model: &M,
        id: &str,
    ) -> Result<String, SimError> {
        self.ensure_mutable()?;
        if self.slots.contains_key(id) {
            return Err(SimError::DuplicateId(id.to_owned()));
        }
        self.insert(model, id.to_owned())
    }

    /// Add several components at once; observable order is list order.
    pub fn bulk_add_component(
        &mut self,
        models: &[&dyn ScatterModel],
    ) -> Result<Vec<String>, SimError> {
        models.iter().map(|m| self.add_component(*m)).collect()
    }

    /// Register an edge between two component ports. Pure topology; no
    /// reduction happens here.
    pub fn connect(
        &mut self,
        c1: &str,
        p1: impl Into<PortRef>,
        c2: &str,
        p2: impl Into<PortRef>,
    ) -> Result<(), SimError> {
        self.ensure_mutable()?;
        let s1 = self.slot_of(c1)?;
        let s2 = self.slot_of(c2)?;
        let i1 = self.elements[s1].port_index(&p1.into())?;
        let i2 = self.elements[s2].port_index(&p2.into())?;
        if s1 == s2 && i1 == i2 {
            return Err(SimError::InvalidPort {
                k: i1,
                l: i2,
                nports: self.elements[s1].nports(),
            });
        }
        for (slot, port, name) in [(s1, i1, c1), (s2, i2, c2)] {
            if self.bound.contains(&(slot, port)) {
                return Err(SimError::PortAlreadyConnected {
                    component: name.to_owned(),
                    port,
                });
            }
        }
        self.bound.insert((s1, i1));
        self.bound.insert((s2, i2));
        self.edges.push(Edge {
            a: (s1, i1),
            b: (s2, i2),
            seq: self.edge_seq,
        });
        self.edge_seq += 1;
        debug!("{}: edge {}[{}] -- {}[{}]", self.id, c1, i1, c2, i2);
        Ok(())
    }

    /// Collapse the netlist to its residual S-matrix.
    ///
    /// On success the result is cached and the network is `Simulated`. On
    /// error, or when a host interrupt unwinds through the reduction, the
    /// network returns to `Unsimulated` with partial work discarded.
    pub fn simulate_network(&mut self) -> Result<SimulationResult, SimError> {
        if self.state == SimState::Simulating {
            return Err(SimError::ConcurrentMutation);
        }
        self.state = SimState::Simulating;
        self.cached = None;
        let outcome = catch_unwind(AssertUnwindSafe(|| self.run_reduction()));
        match outcome {
            Ok(Ok(result)) => {
                self.state = SimState::Simulated;
                self.cached = Some(result.clone());
                Ok(result)
            }
            Ok(Err(err)) => {
                self.state = SimState::Unsimulated;
                Err(err)
            }
            Err(payload) => {
                self.state = SimState::Unsimulated;
                resume_unwind(payload)
            }
        }
    }

    /// Turn the worker pool on for subsequent simulations.
    pub fn enable_mp(&mut self, proc_count: usize, close_pool: bool) {
        self.mp = MpConfig {
            enabled: true,
            proc_count,
            close_pool,
        };
        self.pool = None;
    }

    pub fn disable_mp(&mut self) {
        self.mp.enabled = false;
        self.pool = None;
    }

    pub fn mp_config(&self) -> &MpConfig {
        &self.mp
    }

    fn ensure_mutable(&mut self) -> Result<(), SimError> {
        match self.state {
            SimState::Simulating => Err(SimError::ConcurrentMutation),
            SimState::Simulated => {
                self.state = SimState::Unsimulated;
                self.cached = None;
                Ok(())
            }
            SimState::Unsimulated => Ok(()),
        }
    }

    fn slot_of(&self, id: &str) -> Result<usize, SimError> {
        self.slots
            .get(id)
            .copied()
            .ok_or_else(|| SimError::UnknownComponent(id.to_owned()))
    }

    fn unique_id(&mut self, label: &str) -> String {
        let base = if label.is_empty() { "component" } else { label };
        if !self.slots.contains_key(base) {
            return base.to_owned();
        }
        loop {
            let candidate = format!("{}_{}", base, self.counter);
            self.counter += 1;
            if !self.slots.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn insert<M: ScatterModel + ?Sized>(
        &mut self,
        model: &M,
        id: String,
    ) -> Result<String, SimError> {
        let smat = model.s_on(&self.freq)?;
        let mut el = Element::new(id.clone(), self.freq.clone(), smat)?;
        for p in 0..el.nports() {
            if let Some(name) = model.port_name(p) {
                el.set_port_name(p, name)?;
            }
        }
        self.slots.insert(id.clone(), self.elements.len());
        self.elements.push(el);
        Ok(id)
    }

    fn run_reduction(&mut self) -> Result<SimulationResult, SimError> {
        let pool = self.acquire_pool()?;
        info!(
            "{}: simulating {} component(s), {} edge(s)",
            self.id,
            self.elements.len(),
            self.edges.len()
        );
        let nets: Vec<LiveNet> = self
            .elements
            .iter()
            .enumerate()
            .map(|(slot, el)| LiveNet {
                smat: el.s().clone(),
                ports: (0..el.nports()).map(|p| (slot, p)).collect(),
                tag: el.id().to_owned(),
            })
            .collect();
        let edges: Vec<RedEdge> = self
            .edges
            .iter()
            .map(|e| RedEdge {
                a: e.a,
                b: e.b,
                seq: e.seq,
            })
            .collect();

        let red = reduction::reduce(self.freq.len(), nets, edges, pool.as_deref());
        if self.mp.close_pool {
            self.pool = None;
        }
        let red = red?;

        let ports: Vec<ExternalPort> = red
            .ports
            .iter()
            .map(|&(slot, port)| ExternalPort {
                element: self.elements[slot].id().to_owned(),
                port,
                name: self.elements[slot].ports().name(port).map(String::from),
            })
            .collect();
        Ok(SimulationResult::new(
            self.id.clone(),
            self.freq.clone(),
            red.smat,
            ports,
            red.diagnostics,
        ))
    }

    fn acquire_pool(&mut self) -> Result<Option<Arc<rayon::ThreadPool>>, SimError> {
        if !self.mp.enabled {
            return Ok(None);
        }
        if let Some(pool) = &self.pool {
            return Ok(Some(Arc::clone(pool)));
        }
        let threads = if self.mp.proc_count == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.mp.proc_count
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| SimError::WorkerFailure(e.to_string()))?;
        let pool = Arc::new(pool);
        if !self.mp.close_pool {
            self.pool = Some(Arc::clone(&pool));
        }
        Ok(Some(pool))
    }
}
