// src/lib.rs
//! Interactive land layout viewer.
//!
//! Draws subdivision corner and edge handles as GPU-instanced glyphs over a
//! ground grid. Each frame the marker set goes through `marker_core`'s
//! screen-space optimizer, and an adaptive quality controller scales render
//! cost to the measured frame rate.

pub mod app;
pub mod camera;
pub mod config;
pub mod data;
pub mod engine;
pub mod renderer;
pub mod ui;
