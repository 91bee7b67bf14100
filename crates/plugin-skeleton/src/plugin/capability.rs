//! Resolves a wrapped plugin into the service it exposes and the identity it
//! advertises through the registration handshake.

use std::fmt;
use std::sync::Arc;

use api_types::eviction::eviction_plugin_server;
use api_types::eviction::eviction_plugin_server::EvictionPluginServer;
use api_types::reporter::reporter_plugin_server;
use api_types::reporter::reporter_plugin_server::ReporterPluginServer;
use api_types::resource::resource_plugin_server;
use api_types::resource::resource_plugin_server::ResourcePluginServer;
use error_stack::Report;
use tonic::service::Routes;

use crate::error::ConstructionError;
use crate::plugin::EvictionPlugin;
use crate::plugin::GenericPlugin;
use crate::plugin::QrmPlugin;
use crate::plugin::ReporterPlugin;

/// Builds a fresh set of routes holding the plugin-kind service.
pub(crate) type RoutesFactory = Arc<dyn Fn() -> Routes + Send + Sync>;

/// The kind of a wrapped plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginKind {
    Eviction,
    Reporter,
    QosResource,
}

impl PluginKind {
    /// Plugin type string reported by `GetInfo`.
    pub fn plugin_type(self) -> &'static str {
        match self {
            PluginKind::Eviction => api_types::EVICTION_PLUGIN,
            PluginKind::Reporter => api_types::REPORTER_PLUGIN,
            PluginKind::QosResource => api_types::QOS_RESOURCE_PLUGIN,
        }
    }

    /// Versions of the plugin-kind service advertised by `GetInfo`.
    pub fn supported_versions(self) -> Vec<String> {
        match self {
            PluginKind::Eviction | PluginKind::Reporter | PluginKind::QosResource => {
                vec![api_types::BASE_VERSION.to_string()]
            }
        }
    }

    /// Fully qualified name of the gRPC service registered for this kind.
    pub fn service_name(self) -> &'static str {
        match self {
            PluginKind::Eviction => eviction_plugin_server::SERVICE_NAME,
            PluginKind::Reporter => reporter_plugin_server::SERVICE_NAME,
            PluginKind::QosResource => resource_plugin_server::SERVICE_NAME,
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plugin_type())
    }
}

/// The plugin-kind service a plugin implements, ready to be registered on a
/// gRPC server.
///
/// Only constructible through the kind-specific constructors, which require
/// the plugin to implement the matching service.
#[derive(Clone)]
pub struct PluginCapability {
    kind: PluginKind,
    advertised_name: Option<String>,
    routes: RoutesFactory,
}

impl PluginCapability {
    pub fn eviction<P: EvictionPlugin>(plugin: Arc<P>) -> Self {
        Self {
            kind: PluginKind::Eviction,
            advertised_name: None,
            routes: Arc::new(move || Routes::new(EvictionPluginServer::from_arc(plugin.clone()))),
        }
    }

    pub fn reporter<P: ReporterPlugin>(plugin: Arc<P>) -> Self {
        Self {
            kind: PluginKind::Reporter,
            advertised_name: None,
            routes: Arc::new(move || Routes::new(ReporterPluginServer::from_arc(plugin.clone()))),
        }
    }

    /// Registers under [`QrmPlugin::resource_name`].
    pub fn qrm<P: QrmPlugin>(plugin: Arc<P>) -> Self {
        Self {
            kind: PluginKind::QosResource,
            advertised_name: Some(plugin.resource_name()),
            routes: Arc::new(move || Routes::new(ResourcePluginServer::from_arc(plugin.clone()))),
        }
    }

    pub fn kind(&self) -> PluginKind {
        self.kind
    }
}

impl fmt::Debug for PluginCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCapability")
            .field("kind", &self.kind)
            .field("advertised_name", &self.advertised_name)
            .finish_non_exhaustive()
    }
}

/// Identity of a wrapped plugin, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    /// Plugin name; also names the socket files.
    pub name: String,
    /// Name reported to the watcher by `GetInfo`.
    pub advertised_name: String,
    pub kind: PluginKind,
    pub supported_versions: Vec<String>,
}

/// Asks the plugin once and returns its descriptor together with the factory
/// for its plugin-kind routes.
pub(crate) fn resolve<P: GenericPlugin>(
    plugin: Arc<P>,
) -> Result<(PluginDescriptor, RoutesFactory), Report<ConstructionError>> {
    let name = plugin.name();
    let Some(capability) = plugin.capability() else {
        return Err(Report::new(ConstructionError::UnsupportedPluginType { name }));
    };

    let descriptor = PluginDescriptor {
        advertised_name: capability.advertised_name.unwrap_or_else(|| name.clone()),
        name,
        kind: capability.kind,
        supported_versions: capability.kind.supported_versions(),
    };
    Ok((descriptor, capability.routes))
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::plugin::DummyEvictionPlugin;
    use crate::plugin::DummyQrmPlugin;
    use crate::plugin::DummyReporterPlugin;

    struct PlainPlugin;

    impl GenericPlugin for PlainPlugin {
        fn name(&self) -> String {
            "plain".to_string()
        }

        fn start(&self) -> anyhow::Result<()> {
            Ok(())
        }

        fn stop(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn resolves_each_kind() {
        let (eviction, _) = resolve(Arc::new(DummyEvictionPlugin::default())).expect("eviction");
        assert_eq!(eviction.kind, PluginKind::Eviction);
        assert_eq!(eviction.name, "fake-eviction-plugin");
        assert_eq!(eviction.advertised_name, "fake-eviction-plugin");

        let (reporter, _) = resolve(Arc::new(DummyReporterPlugin::default())).expect("reporter");
        assert_eq!(reporter.kind, PluginKind::Reporter);
        assert_eq!(reporter.name, "fake-reporter-plugin");

        let (qrm, _) = resolve(Arc::new(DummyQrmPlugin::named("cpu-plugin"))).expect("qrm");
        assert_eq!(
            qrm,
            PluginDescriptor {
                name: "cpu-plugin".to_string(),
                advertised_name: "cpu-plugin".to_string(),
                kind: PluginKind::QosResource,
                supported_versions: vec!["v1alpha1".to_string()],
            }
        );
    }

    #[test]
    fn qrm_plugin_advertises_its_resource_name() {
        let plugin = DummyQrmPlugin::named("cpu-plugin").with_resource_name("cpu");
        let (descriptor, _) = resolve(Arc::new(plugin)).expect("qrm");
        assert_eq!(descriptor.name, "cpu-plugin");
        assert_eq!(descriptor.advertised_name, "cpu");
        assert_eq!(descriptor.kind, PluginKind::QosResource);
    }

    #[test]
    fn rejects_plugin_without_capability() {
        let Err(err) = resolve(Arc::new(PlainPlugin)) else {
            panic!("plain plugin has no kind");
        };
        assert_eq!(
            err.current_context().to_string(),
            "unsupported plugin type: plain"
        );
    }

    #[test]
    fn kind_maps_to_handshake_type_and_service() {
        assert_eq!(PluginKind::Eviction.plugin_type(), "EvictionPlugin");
        assert_eq!(PluginKind::Reporter.plugin_type(), "ReporterPlugin");
        assert_eq!(PluginKind::QosResource.plugin_type(), "QoSResourcePlugin");
        assert_eq!(
            PluginKind::QosResource.service_name(),
            "resourceplugin.v1alpha1.ResourcePlugin"
        );
        assert_eq!(
            PluginKind::Eviction.service_name(),
            "evictionplugin.v1alpha1.EvictionPlugin"
        );
    }
}
