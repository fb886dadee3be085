use bevy_app::prelude::*;
use bevy_ecs::prelude::*;

use crate::basic::freq::FrequencyGrid;

use super::elements::{EdgeSet, ElemLookup, SimGrid, SimOptions};
use super::network::ecs_run_reduction;
use super::post_processing::print_result_table;

/// Startup stage for circuit assembly bookkeeping.
#[derive(Debug, SystemSet, Hash, Eq, PartialEq, Clone)]
pub struct CircuitInitStage;

/// Base plugin wiring the reduction run into the app schedules.
///
/// Startup fills in any missing assembly resources (defaulting the grid to
/// the C-band sweep); every update runs one reduction over the current
/// netlist.
pub struct BaseReductionPlugin;

fn init_default_grid(mut cmd: Commands) {
    cmd.insert_resource(SimGrid(FrequencyGrid::c_band()));
}

impl Plugin for BaseReductionPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SimOptions>();
        app.init_resource::<EdgeSet>();
        app.init_resource::<ElemLookup>();
        app.add_systems(
            Startup,
            init_default_grid
                .run_if(not(resource_exists::<SimGrid>))
                .in_set(CircuitInitStage),
        );
        app.add_systems(Update, ecs_run_reduction);
    }
}

/// Prints a per-port-pair summary table after each reduction run.
pub struct ResDisplayPlugin;

impl Plugin for ResDisplayPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, print_result_table.after(ecs_run_reduction));
    }
}

/// An app with the default reduction and display plugins installed.
pub fn default_app() -> App {
    let mut app = App::default();
    app.add_plugins(BaseReductionPlugin);
    app.add_plugins(ResDisplayPlugin);
    app
}
