//! Process plumbing shared by the plugin binaries: tracing setup and the
//! build version string.

pub mod logging;
pub mod version;
