pub mod model;
pub mod topo;
pub mod xml;
pub mod write;
