//! Shared gRPC contract definitions
//!
//! This crate holds the wire contracts exposed on every plugin socket: the
//! registration handshake consumed by the host-side plugin watcher, and the
//! three plugin-kind services (eviction, reporter, QoS resource) that wrapped
//! plugins implement.

#![allow(clippy::doc_markdown)]

/// Registration handshake (`pluginregistration.Registration`).
pub mod registration {
    tonic::include_proto!("pluginregistration");
}

/// Eviction plugin service (`evictionplugin.v1alpha1.EvictionPlugin`).
pub mod eviction {
    tonic::include_proto!("evictionplugin.v1alpha1");
}

/// Reporter plugin service (`reporterplugin.v1alpha1.ReporterPlugin`).
pub mod reporter {
    tonic::include_proto!("reporterplugin.v1alpha1");
}

/// QoS resource plugin service (`resourceplugin.v1alpha1.ResourcePlugin`).
pub mod resource {
    tonic::include_proto!("resourceplugin.v1alpha1");
}

/// Plugin type advertised by eviction plugins.
pub const EVICTION_PLUGIN: &str = "EvictionPlugin";
/// Plugin type advertised by reporter plugins.
pub const REPORTER_PLUGIN: &str = "ReporterPlugin";
/// Plugin type advertised by QoS resource manager plugins.
pub const QOS_RESOURCE_PLUGIN: &str = "QoSResourcePlugin";

/// Version shared by every plugin-kind service in this crate.
pub const BASE_VERSION: &str = "v1alpha1";
