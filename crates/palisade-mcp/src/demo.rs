//! Demo-mode service construction.

pub use palisade_engine::fixtures::demo_service;
