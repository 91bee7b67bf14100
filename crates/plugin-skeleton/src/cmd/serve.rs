use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use utils::version;

use crate::config::LifecycleConfig;
use crate::config::ServeArgs;
use crate::plugin::DummyEvictionPlugin;
use crate::plugin::DummyQrmPlugin;
use crate::plugin::DummyReporterPlugin;
use crate::plugin::GenericPlugin;
use crate::plugin::MetricCallback;
use crate::plugin::PluginKind;
use crate::wrapper::PluginRegistrationWrapper;

pub async fn run_serve(serve_args: ServeArgs) -> Result<()> {
    tracing::info!("Starting plugin-skeleton {}", &**version::VERSION);

    let config = match &serve_args.config {
        Some(path) => LifecycleConfig::from_yaml_file(path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to load lifecycle config: {e:?}"))?,
        None => LifecycleConfig::default(),
    };
    tracing::info!("lifecycle config: {config:?}");

    let kind = PluginKind::from(serve_args.kind);
    let name = serve_args.name.clone();
    let dirs = serve_args.registration_dirs.clone();
    let wrapper = match kind {
        PluginKind::Eviction => wrap(
            name.map_or_else(DummyEvictionPlugin::default, DummyEvictionPlugin::named),
            &dirs,
            config,
        )?,
        PluginKind::Reporter => wrap(
            name.map_or_else(DummyReporterPlugin::default, DummyReporterPlugin::named),
            &dirs,
            config,
        )?,
        PluginKind::QosResource => wrap(
            name.map_or_else(DummyQrmPlugin::default, DummyQrmPlugin::named),
            &dirs,
            config,
        )?,
    };

    wrapper
        .start()
        .map_err(|e| anyhow::anyhow!("Failed to start plugin: {e:?}"))?;

    wait_for_shutdown_signal().await?;

    wrapper
        .stop()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to stop plugin: {e:?}"))?;
    tracing::info!("plugin {} stopped", wrapper.name());

    Ok(())
}

fn wrap<P: GenericPlugin>(
    plugin: P,
    dirs: &[PathBuf],
    config: LifecycleConfig,
) -> Result<PluginRegistrationWrapper> {
    PluginRegistrationWrapper::with_config(
        Arc::new(plugin),
        dirs,
        Some(log_metric_callback()),
        config,
    )
    .map_err(|e| anyhow::anyhow!("Failed to wrap plugin: {e:?}"))
}

/// Emits every lifecycle metric as a structured `metrics` event.
fn log_metric_callback() -> MetricCallback {
    Arc::new(|key: &str, value: i64| {
        tracing::info!(target: "metrics", metric = key, value, "plugin lifecycle event");
    })
}

async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::signal;
    use tokio::signal::unix::SignalKind;

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }

    Ok(())
}
