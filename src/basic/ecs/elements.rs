use std::collections::HashMap;

use bevy_ecs::prelude::*;
use derive_more::{Deref, DerefMut};

use crate::basic::element::{Element, PortRef};
use crate::basic::freq::FrequencyGrid;
use crate::basic::network::MpConfig;
use crate::basic::result::SimulationResult;

/// ECS component carrying a circuit element's scattering data.
#[derive(Debug, Component, Deref, DerefMut)]
pub struct ElemModel(pub Element);

/// Registered circuit-element id.
#[derive(Debug, Component, Deref, DerefMut, Clone)]
pub struct ElemId(pub String);

/// Insertion index; fixes the deterministic assembly order of the netlist.
#[derive(Debug, Component, Deref, DerefMut, Clone, Copy)]
pub struct ElemIdx(pub usize);

/// One requested port-to-port connection, by element id and port reference.
#[derive(Debug, Clone)]
pub struct EdgeSpec {
    pub a: (String, PortRef),
    pub b: (String, PortRef),
}

/// All requested connections, in registration order.
#[derive(Debug, Resource, Default, Deref, DerefMut)]
pub struct EdgeSet(pub Vec<EdgeSpec>);

/// The frequency axis the circuit simulates on.
#[derive(Debug, Resource, Deref, DerefMut)]
pub struct SimGrid(pub FrequencyGrid);

/// Worker-pool options applied to the reduction run.
#[derive(Debug, Resource, Default, Deref, DerefMut)]
pub struct SimOptions(pub MpConfig);

/// Maps element ids to their ECS entities.
#[derive(Debug, Resource, Default, Deref, DerefMut)]
pub struct ElemLookup(pub HashMap<String, Entity>);

/// Inserted after each reduction run.
#[derive(Debug, Resource)]
pub struct ReductionResult {
    pub result: Option<SimulationResult>,
    pub converged: bool,
}
