pub mod catalogue;
pub mod lut;
pub mod sparams_file;
