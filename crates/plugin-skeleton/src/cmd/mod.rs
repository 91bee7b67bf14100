//! Command layer - entry points of the plugin-skeleton binary

pub mod info;
pub mod serve;

pub use info::run_info;
pub use serve::run_serve;
