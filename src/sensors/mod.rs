pub mod generator;
pub mod status;

pub use generator::ReadingGenerator;
