use bevy_app::prelude::*;
use bevy_ecs::prelude::*;
use log::error;

use crate::basic::element::{Element, PortRef};
use crate::basic::network::Network;

use super::elements::*;
use super::plugin::BaseReductionPlugin;

/// A photonic circuit managed as an ECS world.
///
/// Elements live as entities, the edge list and simulation options as
/// resources; each `App::update` runs the reduction and publishes a
/// [`ReductionResult`] resource.
#[derive(Default)]
pub struct PhotonicGrid {
    data_storage: App,
}

/// Access to the ECS world backing a circuit.
pub trait DataOps {
    fn world_mut(&mut self) -> &mut World;
    fn world(&self) -> &World;
}

/// Circuit-level operations: set up the schedules, then run reductions.
pub trait CircuitSim {
    /// Install the reduction plugins and run the startup schedule.
    fn init_circuit(&mut self);

    /// Run one reduction pass over the current netlist.
    fn run_sim(&mut self);
}

impl PhotonicGrid {
    pub fn app(&self) -> &App {
        &self.data_storage
    }

    pub fn app_mut(&mut self) -> &mut App {
        &mut self.data_storage
    }

    /// Spawn a circuit element entity, preserving insertion order.
    pub fn add_element(&mut self, element: Element) -> Entity {
        let id = element.id().to_owned();
        let world = self.world_mut();
        let idx = world
            .get_resource_or_insert_with(ElemLookup::default)
            .len();
        let entity = world
            .spawn((ElemId(id.clone()), ElemIdx(idx), ElemModel(element)))
            .id();
        world.resource_mut::<ElemLookup>().insert(id, entity);
        entity
    }

    /// Queue a port-to-port connection for the next reduction run.
    pub fn connect(
        &mut self,
        c1: &str,
        p1: impl Into<PortRef>,
        c2: &str,
        p2: impl Into<PortRef>,
    ) {
        let spec = EdgeSpec {
            a: (c1.to_owned(), p1.into()),
            b: (c2.to_owned(), p2.into()),
        };
        self.world_mut()
            .get_resource_or_insert_with(EdgeSet::default)
            .push(spec);
    }
}

impl DataOps for PhotonicGrid {
    fn world(&self) -> &World {
        self.app().world()
    }

    fn world_mut(&mut self) -> &mut World {
        self.app_mut().world_mut()
    }
}

impl CircuitSim for PhotonicGrid {
    fn init_circuit(&mut self) {
        self.app_mut().add_plugins(BaseReductionPlugin);
        let world = self.world_mut();
        let mut schedules = world.get_resource_mut::<Schedules>().unwrap();
        let mut startup = schedules.remove(Startup).unwrap();
        startup.run(world);
    }

    fn run_sim(&mut self) {
        self.app_mut().update();
    }
}

/// ECS system driving one reduction over the assembled netlist.
///
/// Rebuilds a [`Network`] from the entity store in insertion order, applies
/// the queued edges, and publishes the outcome.
pub fn ecs_run_reduction(
    mut cmd: Commands,
    grid: Res<SimGrid>,
    opts: Res<SimOptions>,
    edges: Res<EdgeSet>,
    query: Query<(&ElemIdx, &ElemId, &ElemModel)>,
) {
    let mut ordered: Vec<(usize, &ElemId, &ElemModel)> = query
        .iter()
        .map(|(idx, id, model)| (idx.0, id, model))
        .collect();
    ordered.sort_by_key(|(idx, _, _)| *idx);

    let mut net = Network::with_config("circuit", Some(grid.0.clone()), Some(opts.0.clone()));
    let failed = |cmd: &mut Commands| {
        cmd.insert_resource(ReductionResult {
            result: None,
            converged: false,
        });
    };
    for (_, id, model) in &ordered {
        if let Err(err) = net.add_component_as(&model.0, &id.0) {
            error!("cannot register '{}': {}", id.0, err);
            return failed(&mut cmd);
        }
    }
    for spec in edges.iter() {
        if let Err(err) = net.connect(&spec.a.0, spec.a.1.clone(), &spec.b.0, spec.b.1.clone()) {
            error!(
                "cannot connect {}[{}] -- {}[{}]: {}",
                spec.a.0, spec.a.1, spec.b.0, spec.b.1, err
            );
            return failed(&mut cmd);
        }
    }
    match net.simulate_network() {
        Ok(result) => cmd.insert_resource(ReductionResult {
            result: Some(result),
            converged: true,
        }),
        Err(err) => {
            error!("reduction failed: {}", err);
            failed(&mut cmd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::freq::FrequencyGrid;
    use crate::basic::models;
    use crate::basic::network::Network;

    /// The ECS-managed circuit must agree with the plain netlist API.
    #[test]
    fn ecs_reduction_matches_plain_network() {
        let grid = FrequencyGrid::linspace(1.92e14, 1.95e14, 48).unwrap();

        let mut plain = Network::with_grid("mzi", grid.clone());
        plain
            .add_component_as(&models::y_branch(&grid), "y1")
            .unwrap();
        plain
            .add_component_as(&models::waveguide(&grid, 50e-6), "wg1")
            .unwrap();
        plain
            .add_component_as(&models::waveguide(&grid, 150e-6), "wg2")
            .unwrap();
        plain
            .add_component_as(&models::y_branch(&grid), "y2")
            .unwrap();
        plain.connect("y1", 1, "wg1", 0).unwrap();
        plain.connect("y1", 2, "wg2", 0).unwrap();
        plain.connect("wg1", 1, "y2", 1).unwrap();
        plain.connect("wg2", 1, "y2", 2).unwrap();
        let expect = plain.simulate_network().unwrap();

        let mut circuit = PhotonicGrid::default();
        circuit.world_mut().insert_resource(SimGrid(grid.clone()));
        let mut y1 = models::y_branch(&grid);
        y1.set_id("y1".into());
        circuit.add_element(y1);
        let mut wg1 = models::waveguide(&grid, 50e-6);
        wg1.set_id("wg1".into());
        circuit.add_element(wg1);
        let mut wg2 = models::waveguide(&grid, 150e-6);
        wg2.set_id("wg2".into());
        circuit.add_element(wg2);
        let mut y2 = models::y_branch(&grid);
        y2.set_id("y2".into());
        circuit.add_element(y2);
        circuit.connect("y1", 1, "wg1", 0);
        circuit.connect("y1", 2, "wg2", 0);
        circuit.connect("wg1", 1, "y2", 1);
        circuit.connect("wg2", 1, "y2", 2);

        circuit.init_circuit();
        circuit.run_sim();

        let out = circuit
            .world()
            .get_resource::<ReductionResult>()
            .expect("result resource inserted");
        assert!(out.converged);
        let got = out.result.as_ref().unwrap();
        assert_eq!(got.nports(), expect.nports());
        assert_eq!(got.external_ports(), expect.external_ports());
        for t in 0..grid.len() {
            for i in 0..got.nports() {
                for j in 0..got.nports() {
                    let err = (got.s().at(t, i, j) - expect.s().at(t, i, j)).norm();
                    assert!(err < 1e-12, "bin {} ({},{}) err {}", t, i, j, err);
                }
            }
        }
    }

    #[test]
    fn failed_reduction_reports_not_converged() {
        let grid = FrequencyGrid::linspace(1.92e14, 1.95e14, 8).unwrap();
        let mut circuit = PhotonicGrid::default();
        circuit.world_mut().insert_resource(SimGrid(grid.clone()));
        let mut wg = models::waveguide(&grid, 50e-6);
        wg.set_id("wg".into());
        circuit.add_element(wg);
        // Bad edge: unknown component.
        circuit.connect("wg", 1, "ghost", 0);
        circuit.init_circuit();
        circuit.run_sim();
        let out = circuit.world().get_resource::<ReductionResult>().unwrap();
        assert!(!out.converged);
        assert!(out.result.is_none());
    }
}
