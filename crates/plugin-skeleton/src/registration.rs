//! Registration handshake answered on every plugin socket.

use std::sync::Mutex;
use std::sync::PoisonError;

use api_types::registration::registration_server::Registration;
use api_types::registration::InfoRequest;
use api_types::registration::PluginInfo;
use api_types::registration::RegistrationStatus;
use api_types::registration::RegistrationStatusResponse;
use tonic::Request;
use tonic::Response;
use tonic::Result as TonicResult;
use tracing::error;
use tracing::info;

use crate::plugin::PluginDescriptor;

/// Answers the host watcher's `GetInfo` and `NotifyRegistrationStatus` calls.
#[derive(Debug)]
pub struct RegistrationHandler {
    descriptor: PluginDescriptor,
    last_status: Mutex<Option<RegistrationStatus>>,
}

impl RegistrationHandler {
    pub fn new(descriptor: PluginDescriptor) -> Self {
        Self {
            descriptor,
            last_status: Mutex::new(None),
        }
    }

    pub fn plugin_info(&self) -> PluginInfo {
        PluginInfo {
            r#type: self.descriptor.kind.plugin_type().to_string(),
            name: self.descriptor.advertised_name.clone(),
            endpoint: String::new(),
            supported_versions: self.descriptor.supported_versions.clone(),
        }
    }

    /// The most recent registration outcome reported by the watcher.
    pub fn last_status(&self) -> Option<RegistrationStatus> {
        self.last_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[tonic::async_trait]
impl Registration for RegistrationHandler {
    async fn get_info(&self, _request: Request<InfoRequest>) -> TonicResult<Response<PluginInfo>> {
        info!(
            "{} plugin of type {} GetInfo called",
            self.descriptor.name, self.descriptor.kind
        );
        Ok(Response::new(self.plugin_info()))
    }

    async fn notify_registration_status(
        &self,
        request: Request<RegistrationStatus>,
    ) -> TonicResult<Response<RegistrationStatusResponse>> {
        let status = request.into_inner();
        // Retrying is up to the watcher, we only record the outcome.
        if !status.plugin_registered {
            error!(
                "{} of type {} registration failed: {}",
                self.descriptor.name, self.descriptor.kind, status.error
            );
        }
        *self
            .last_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(status);

        Ok(Response::new(RegistrationStatusResponse {}))
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::plugin::PluginKind;

    fn handler() -> RegistrationHandler {
        RegistrationHandler::new(PluginDescriptor {
            name: "cpu-plugin".to_string(),
            advertised_name: "cpu".to_string(),
            kind: PluginKind::QosResource,
            supported_versions: vec!["v1alpha1".to_string()],
        })
    }

    #[test(tokio::test)]
    async fn get_info_reports_descriptor() {
        let info = handler()
            .get_info(Request::new(InfoRequest {}))
            .await
            .expect("get_info")
            .into_inner();

        assert_eq!(
            info,
            PluginInfo {
                r#type: "QoSResourcePlugin".to_string(),
                name: "cpu".to_string(),
                endpoint: String::new(),
                supported_versions: vec!["v1alpha1".to_string()],
            }
        );
    }

    #[test(tokio::test)]
    async fn notify_always_acknowledges() {
        let handler = handler();
        assert!(handler.last_status().is_none());

        let failed = RegistrationStatus {
            plugin_registered: false,
            error: "version mismatch".to_string(),
        };
        handler
            .notify_registration_status(Request::new(failed.clone()))
            .await
            .expect("failed registration is still acknowledged");
        assert_eq!(handler.last_status(), Some(failed));

        let ok = RegistrationStatus {
            plugin_registered: true,
            error: String::new(),
        };
        handler
            .notify_registration_status(Request::new(ok.clone()))
            .await
            .expect("successful registration is acknowledged");
        assert_eq!(handler.last_status(), Some(ok));
    }
}
