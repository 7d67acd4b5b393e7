//! Framer library exports

pub mod plugin;
pub mod registry;
pub mod settings;
