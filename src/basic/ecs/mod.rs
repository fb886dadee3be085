pub mod elements;
pub mod network;
pub mod plugin;
pub mod post_processing;
