pub mod ground_grid;
pub mod markers;
pub mod present;
