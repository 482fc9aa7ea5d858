//! Adapters implementing the domain ports.

pub mod host;
pub mod in_memory;
pub mod mqtt;
