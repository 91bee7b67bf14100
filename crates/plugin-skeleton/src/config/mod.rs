pub mod cli;
pub mod lifecycle;

pub use cli::*;
pub use lifecycle::*;
