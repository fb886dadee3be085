mod basic;
pub mod io;
pub mod prelude {
    use crate::basic;
    pub use crate::io::sparams_file;
    pub use basic::element::*;
    pub use basic::error::SimError;
    pub use basic::freq::*;
    pub use basic::models;
    pub use basic::network::*;
    pub use basic::result::*;
    pub use basic::sparams::*;
    pub use basic::*;

    pub use ecs::{
        elements::ReductionResult,
        network::{CircuitSim, DataOps, PhotonicGrid},
        plugin::default_app,
    };
}
