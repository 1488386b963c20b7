pub mod docker;
pub mod orchestrator;
pub mod process;
pub mod web;
