//! Data loading: land layouts and the markers derived from them.

pub mod layout;

pub use layout::{demo_scene, load_layouts, HandleKind, LandScene, Layout, MarkerRef, Subdivision};
