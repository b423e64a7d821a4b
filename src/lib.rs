// THEORY:
// This file is the main entry point for the `vistrack` library crate. It exposes
// the single-object tracking engine of an on-board robot camera.
//
// The primary goal is to export the `ObjectTracker` and its `Report` as the
// high-level, per-frame interface. The building blocks (`core_modules`) stay
// public as well, so a controller with its own loop can call the labeler, the
// region grower, the updaters and the correlator directly.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use config::TrackingConfig;
pub use error::TrackError;
pub use pipeline::{ObjectTracker, Report};
