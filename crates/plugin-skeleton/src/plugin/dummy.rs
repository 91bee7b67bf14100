//! Do-nothing plugins of every kind, used to exercise the wrapper without any
//! business logic behind it.

use std::pin::Pin;
use std::sync::Arc;

use api_types::eviction;
use api_types::eviction::eviction_plugin_server::EvictionPlugin as EvictionPluginService;
use api_types::reporter;
use api_types::reporter::reporter_plugin_server::ReporterPlugin as ReporterPluginService;
use api_types::resource;
use api_types::resource::resource_plugin_server::ResourcePlugin as ResourcePluginService;
use futures::Stream;
use tonic::Request;
use tonic::Response;
use tonic::Result as TonicResult;
use tonic::Status;

use crate::plugin::GenericPlugin;
use crate::plugin::PluginCapability;
use crate::plugin::QrmPlugin;

const FAKE_EVICTION_PLUGIN_NAME: &str = "fake-eviction-plugin";
const FAKE_REPORTER_PLUGIN_NAME: &str = "fake-reporter-plugin";
const FAKE_QRM_PLUGIN_NAME: &str = "fake-qrm-plugin";

/// Stream type used by reporter plugins for `ListAndWatchReportContent`.
pub type ReportContentStream =
    Pin<Box<dyn Stream<Item = Result<reporter::GetReportContentResponse, Status>> + Send>>;

/// Dummy eviction plugin
#[derive(Debug, Clone)]
pub struct DummyEvictionPlugin {
    name: String,
}

impl DummyEvictionPlugin {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for DummyEvictionPlugin {
    fn default() -> Self {
        Self::named(FAKE_EVICTION_PLUGIN_NAME)
    }
}

impl GenericPlugin for DummyEvictionPlugin {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn capability(self: Arc<Self>) -> Option<PluginCapability> {
        Some(PluginCapability::eviction(self))
    }
}

#[tonic::async_trait]
impl EvictionPluginService for DummyEvictionPlugin {
    async fn get_token(
        &self,
        _request: Request<eviction::Empty>,
    ) -> TonicResult<Response<eviction::GetTokenResponse>> {
        Ok(Response::new(eviction::GetTokenResponse {
            token: String::new(),
        }))
    }

    async fn threshold_met(
        &self,
        _request: Request<eviction::GetThresholdMetRequest>,
    ) -> TonicResult<Response<eviction::ThresholdMetResponse>> {
        Err(Status::unimplemented("threshold_met is not implemented"))
    }

    async fn get_top_eviction_pods(
        &self,
        _request: Request<eviction::GetTopEvictionPodsRequest>,
    ) -> TonicResult<Response<eviction::GetTopEvictionPodsResponse>> {
        Err(Status::unimplemented(
            "get_top_eviction_pods is not implemented",
        ))
    }

    async fn get_evict_pods(
        &self,
        _request: Request<eviction::GetEvictPodsRequest>,
    ) -> TonicResult<Response<eviction::GetEvictPodsResponse>> {
        Err(Status::unimplemented("get_evict_pods is not implemented"))
    }
}

/// Dummy reporter plugin
#[derive(Debug, Clone)]
pub struct DummyReporterPlugin {
    name: String,
}

impl DummyReporterPlugin {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for DummyReporterPlugin {
    fn default() -> Self {
        Self::named(FAKE_REPORTER_PLUGIN_NAME)
    }
}

impl GenericPlugin for DummyReporterPlugin {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn capability(self: Arc<Self>) -> Option<PluginCapability> {
        Some(PluginCapability::reporter(self))
    }
}

#[tonic::async_trait]
impl ReporterPluginService for DummyReporterPlugin {
    async fn get_report_content(
        &self,
        _request: Request<reporter::Empty>,
    ) -> TonicResult<Response<reporter::GetReportContentResponse>> {
        Ok(Response::new(reporter::GetReportContentResponse::default()))
    }

    type ListAndWatchReportContentStream = ReportContentStream;

    async fn list_and_watch_report_content(
        &self,
        _request: Request<reporter::Empty>,
    ) -> TonicResult<Response<Self::ListAndWatchReportContentStream>> {
        Err(Status::unimplemented(
            "list_and_watch_report_content is not implemented",
        ))
    }
}

/// Dummy QoS resource plugin
#[derive(Debug, Clone)]
pub struct DummyQrmPlugin {
    name: String,
    resource_name: Option<String>,
}

impl DummyQrmPlugin {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_name: None,
        }
    }

    /// Registers under `resource_name` instead of the plugin name.
    pub fn with_resource_name(mut self, resource_name: impl Into<String>) -> Self {
        self.resource_name = Some(resource_name.into());
        self
    }
}

impl Default for DummyQrmPlugin {
    fn default() -> Self {
        Self::named(FAKE_QRM_PLUGIN_NAME)
    }
}

impl GenericPlugin for DummyQrmPlugin {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn capability(self: Arc<Self>) -> Option<PluginCapability> {
        Some(PluginCapability::qrm(self))
    }
}

impl QrmPlugin for DummyQrmPlugin {
    fn resource_name(&self) -> String {
        self.resource_name.clone().unwrap_or_else(|| self.name())
    }
}

#[tonic::async_trait]
impl ResourcePluginService for DummyQrmPlugin {
    async fn get_resource_plugin_options(
        &self,
        _request: Request<resource::Empty>,
    ) -> TonicResult<Response<resource::ResourcePluginOptions>> {
        Ok(Response::new(resource::ResourcePluginOptions::default()))
    }

    async fn get_topology_hints(
        &self,
        _request: Request<resource::ResourceRequest>,
    ) -> TonicResult<Response<resource::ResourceHintsResponse>> {
        Err(Status::unimplemented("get_topology_hints is not implemented"))
    }

    async fn allocate(
        &self,
        _request: Request<resource::ResourceRequest>,
    ) -> TonicResult<Response<resource::ResourceAllocationResponse>> {
        Err(Status::unimplemented("allocate is not implemented"))
    }

    async fn get_resources_allocation(
        &self,
        _request: Request<resource::GetResourcesAllocationRequest>,
    ) -> TonicResult<Response<resource::GetResourcesAllocationResponse>> {
        Ok(Response::new(
            resource::GetResourcesAllocationResponse::default(),
        ))
    }

    async fn remove_pod(
        &self,
        _request: Request<resource::RemovePodRequest>,
    ) -> TonicResult<Response<resource::RemovePodResponse>> {
        Ok(Response::new(resource::RemovePodResponse {}))
    }

    async fn pre_start_container(
        &self,
        _request: Request<resource::PreStartContainerRequest>,
    ) -> TonicResult<Response<resource::PreStartContainerResponse>> {
        Ok(Response::new(resource::PreStartContainerResponse {}))
    }
}
