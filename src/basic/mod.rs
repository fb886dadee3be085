pub(crate) mod reduction;

pub mod ecs;
pub mod element;
pub mod error;
pub mod freq;
pub mod models;
pub mod network;
pub mod result;
pub mod sparams;
pub use sparams::{connect, innerconnect};
