pub mod cmd;
pub mod config;
pub mod error;
pub mod plugin;
pub mod registration;
pub mod transport;
pub mod wrapper;

// Re-export main types
pub use error::ConstructionError;
pub use error::LifecycleError;
pub use plugin::GenericPlugin;
pub use plugin::MetricCallback;
pub use plugin::PluginCapability;
pub use plugin::PluginDescriptor;
pub use plugin::PluginKind;
pub use registration::RegistrationHandler;
pub use wrapper::LifecycleState;
pub use wrapper::PluginRegistrationWrapper;
