//! Host agent deploying versioned compose applications on behalf of a control plane.

pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod store;
