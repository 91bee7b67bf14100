//! Plugin contracts.
//!
//! Every wrapped plugin implements [`GenericPlugin`]. On top of that it
//! implements exactly one plugin-kind service (eviction, reporter or QoS
//! resource) and advertises it from [`GenericPlugin::capability`]; the
//! registration wrapper uses that answer to decide which gRPC service to
//! expose on the plugin sockets.

use std::sync::Arc;

use api_types::eviction::eviction_plugin_server::EvictionPlugin as EvictionPluginService;
use api_types::reporter::reporter_plugin_server::ReporterPlugin as ReporterPluginService;
use api_types::resource::resource_plugin_server::ResourcePlugin as ResourcePluginService;

pub mod capability;
pub mod dummy;
pub mod reporter_stub;

pub use capability::PluginCapability;
pub use capability::PluginDescriptor;
pub use capability::PluginKind;
pub use dummy::DummyEvictionPlugin;
pub use dummy::DummyQrmPlugin;
pub use dummy::DummyReporterPlugin;
pub use reporter_stub::ReporterPluginStub;

/// Receives key lifecycle events as `(metric key, count)` pairs.
pub type MetricCallback = Arc<dyn Fn(&str, i64) + Send + Sync>;

/// Metric callback used when the caller does not provide one.
pub fn noop_metric_callback() -> MetricCallback {
    Arc::new(|_: &str, _: i64| {})
}

/// The minimal contract every wrapped plugin fulfils.
///
/// `start` and `stop` must not block. `start` initializes whatever channels or
/// tasks the plugin needs and must work again after `stop`; `stop` tears them
/// down and must be reentrant: the wrapper calls it before every start and
/// possibly several times in a row.
pub trait GenericPlugin: Send + Sync + 'static {
    fn name(&self) -> String;

    fn start(&self) -> anyhow::Result<()>;

    fn stop(&self) -> anyhow::Result<()>;

    /// Advertises the plugin-kind service this plugin implements.
    ///
    /// Plugins override this with one of [`PluginCapability::eviction`],
    /// [`PluginCapability::reporter`] or [`PluginCapability::qrm`]. Plugins
    /// that keep the default cannot be wrapped.
    fn capability(self: Arc<Self>) -> Option<PluginCapability> {
        None
    }
}

/// A plugin that decides which pods to evict.
pub trait EvictionPlugin: GenericPlugin + EvictionPluginService {}

impl<T> EvictionPlugin for T where T: GenericPlugin + EvictionPluginService {}

/// A plugin that reports node-level content to the agent.
pub trait ReporterPlugin: GenericPlugin + ReporterPluginService {}

impl<T> ReporterPlugin for T where T: GenericPlugin + ReporterPluginService {}

/// A QoS resource manager plugin.
///
/// Unlike the other kinds, a QRM plugin registers with the watcher under the
/// resource it manages, while its socket keeps the plugin name.
pub trait QrmPlugin: GenericPlugin + ResourcePluginService {
    /// Name advertised by `GetInfo`; defaults to [`GenericPlugin::name`].
    fn resource_name(&self) -> String {
        self.name()
    }
}
