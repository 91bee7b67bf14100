//! Registration wrapper: keeps a plugin served on one Unix socket per
//! registration directory for as long as it is not stopped.

mod control;
mod crash;
mod server;
mod socket;

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use api_types::registration::registration_server::RegistrationServer;
use api_types::registration::RegistrationStatus;
use error_stack::Report;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::config::LifecycleConfig;
use crate::error::panic_message;
use crate::error::ConstructionError;
use crate::error::LifecycleError;
use crate::plugin::capability;
use crate::plugin::capability::RoutesFactory;
use crate::plugin::noop_metric_callback;
use crate::plugin::GenericPlugin;
use crate::plugin::MetricCallback;
use crate::plugin::PluginDescriptor;
use crate::registration::RegistrationHandler;
use crate::wrapper::control::ControlSignals;
use crate::wrapper::control::Signal;
use crate::wrapper::server::BoundServer;
use crate::wrapper::server::ServeContext;

pub use server::METRIC_PLUGIN_CRASH_LOOP;
pub use server::METRIC_PLUGIN_RESTART;

pub const METRIC_PLUGIN_START_FAILED: &str = "plugin_start_failed";
pub const METRIC_PLUGIN_STOP_FAILED: &str = "plugin_stop_failed";

/// Where the supervisor currently is in the plugin lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum LifecycleState {
    Idle,
    Starting,
    Serving,
    Stopping,
    PermanentlyStopped,
}

/// Serves a [`GenericPlugin`] to the host watcher.
///
/// Every start cycle binds `<dir>/<name>.sock` for each registration
/// directory and exposes the plugin-kind service plus the registration
/// handshake on it. Failed cycles are retried at a fixed interval until
/// [`PluginRegistrationWrapper::stop`] is called.
pub struct PluginRegistrationWrapper {
    shared: Arc<Shared>,
    loop_task: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    plugin: Arc<dyn GenericPlugin>,
    descriptor: PluginDescriptor,
    routes: RoutesFactory,
    registration: Arc<RegistrationHandler>,
    metric_callback: MetricCallback,
    config: LifecycleConfig,
    control: ControlSignals,
    inner: tokio::sync::Mutex<Inner>,
}

/// Everything a start or stop cycle touches; only accessed under the cycle
/// lock.
struct Inner {
    state: LifecycleState,
    sockets: Vec<PathBuf>,
    servers: Vec<BoundServer>,
}

impl PluginRegistrationWrapper {
    /// Wraps `plugin` with the default lifecycle timings.
    ///
    /// Fails when the plugin does not advertise any supported plugin kind.
    pub fn new<P: GenericPlugin>(
        plugin: Arc<P>,
        registration_dirs: &[PathBuf],
        metric_callback: Option<MetricCallback>,
    ) -> Result<Self, Report<ConstructionError>> {
        Self::with_config(
            plugin,
            registration_dirs,
            metric_callback,
            LifecycleConfig::default(),
        )
    }

    pub fn with_config<P: GenericPlugin>(
        plugin: Arc<P>,
        registration_dirs: &[PathBuf],
        metric_callback: Option<MetricCallback>,
        config: LifecycleConfig,
    ) -> Result<Self, Report<ConstructionError>> {
        let (descriptor, routes) = capability::resolve(plugin.clone())?;
        let sockets = socket::socket_paths(registration_dirs, &descriptor.name);
        if sockets.is_empty() {
            warn!(
                "no registration directory configured for plugin {}",
                descriptor.name
            );
        }

        info!(
            "wrapping {} plugin {} with sockets {:?}",
            descriptor.kind, descriptor.name, sockets
        );

        let registration = Arc::new(RegistrationHandler::new(descriptor.clone()));
        let shared = Shared {
            plugin,
            descriptor,
            routes,
            registration,
            metric_callback: metric_callback.unwrap_or_else(noop_metric_callback),
            config,
            control: ControlSignals::new(),
            inner: tokio::sync::Mutex::new(Inner {
                state: LifecycleState::Idle,
                sockets,
                servers: Vec::new(),
            }),
        };

        Ok(Self {
            shared: Arc::new(shared),
            loop_task: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.descriptor.name
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.shared.descriptor
    }

    /// Socket paths the plugin is (or will be) served on.
    pub async fn sockets(&self) -> Vec<PathBuf> {
        self.shared.inner.lock().await.sockets.clone()
    }

    pub async fn state(&self) -> LifecycleState {
        self.shared.inner.lock().await.state
    }

    /// Last registration outcome reported by the host watcher, if any.
    pub fn registration_status(&self) -> Option<RegistrationStatus> {
        self.shared.registration.last_status()
    }

    /// Launches the supervisor loop in the background and returns
    /// immediately. Calling it while the loop runs does nothing.
    ///
    /// Fails outside a tokio runtime.
    pub fn start(&self) -> Result<(), Report<LifecycleError>> {
        if self.shared.control.is_stopped() {
            return Err(Report::new(LifecycleError::AlreadyStopped {
                plugin: self.shared.descriptor.name.clone(),
            }));
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return Err(Report::new(LifecycleError::NoRuntime {
                plugin: self.shared.descriptor.name.clone(),
            }));
        };

        let mut task = self.loop_task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!("plugin {} is already running", self.shared.descriptor.name);
            return Ok(());
        }

        info!("starting plugin {}", self.shared.descriptor.name);
        *task = Some(runtime.spawn(self.shared.clone().run()));
        Ok(())
    }

    /// Asks the supervisor loop for a full stop and start cycle.
    ///
    /// Requests made while a cycle is in flight collapse into one.
    pub fn restart(&self) -> Result<(), Report<LifecycleError>> {
        if !self.shared.control.request_restart() {
            return Err(Report::new(LifecycleError::AlreadyStopped {
                plugin: self.shared.descriptor.name.clone(),
            }));
        }
        info!("restart requested for plugin {}", self.shared.descriptor.name);
        Ok(())
    }

    /// Runs one stop cycle, then ends the supervisor loop for good.
    ///
    /// Calling it again returns `Ok` without doing anything.
    pub async fn stop(&self) -> Result<(), Report<LifecycleError>> {
        let result = {
            let mut inner = self.shared.inner.lock().await;
            if inner.state == LifecycleState::PermanentlyStopped {
                debug!("plugin {} already stopped", self.shared.descriptor.name);
                Ok(())
            } else {
                info!("stopping plugin {}", self.shared.descriptor.name);
                inner.state = LifecycleState::Stopping;
                let result = self.shared.stop_cycle_locked(&mut inner).await;
                inner.state = LifecycleState::PermanentlyStopped;
                self.shared.control.request_stop();
                result
            }
        };

        if let Err(err) = &result {
            error!(
                "stop plugin {} failed: {err:?}",
                self.shared.descriptor.name
            );
            (self.shared.metric_callback)(METRIC_PLUGIN_STOP_FAILED, 1);
        }

        let task = self
            .loop_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            match task.await {
                Ok(()) => {}
                Err(e) if e.is_panic() => error!(
                    "supervisor loop of plugin {} panicked: {}",
                    self.shared.descriptor.name,
                    panic_message(e.into_panic().as_ref())
                ),
                Err(e) => warn!(
                    "supervisor loop of plugin {} ended abnormally: {e}",
                    self.shared.descriptor.name
                ),
            }
        }

        result
    }
}

impl Drop for PluginRegistrationWrapper {
    fn drop(&mut self) {
        self.shared.control.request_stop();
    }
}

impl Shared {
    /// Supervisor loop: start, serve until signalled, stop, start again.
    async fn run(self: Arc<Self>) {
        let name = self.descriptor.name.clone();

        loop {
            loop {
                match self.start_cycle().await {
                    Ok(()) => break,
                    Err(err) => {
                        if self.control.is_stopped() {
                            return;
                        }
                        error!("start plugin {name} failed: {err:?}");
                        (self.metric_callback)(METRIC_PLUGIN_START_FAILED, 1);
                        info!("restart plugin {name} in {:?}", self.config.retry_interval);
                        if !self.control.sleep(self.config.retry_interval).await {
                            return;
                        }
                    }
                }
            }

            match self.control.wait().await {
                Signal::Stop => {
                    info!("supervisor loop of plugin {name} exits");
                    return;
                }
                Signal::Restart => info!("restarting plugin {name}"),
            }

            loop {
                match self.stop_cycle().await {
                    Ok(()) => break,
                    Err(err) => {
                        if self.control.is_stopped() {
                            return;
                        }
                        error!("stop plugin {name} failed: {err:?}");
                        (self.metric_callback)(METRIC_PLUGIN_STOP_FAILED, 1);
                        if !self.control.sleep(self.config.retry_interval).await {
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn start_cycle(&self) -> Result<(), Report<LifecycleError>> {
        let mut inner = self.inner.lock().await;
        if inner.state == LifecycleState::PermanentlyStopped {
            return Err(self.already_stopped());
        }
        if inner.sockets.is_empty() {
            return Err(Report::new(LifecycleError::EmptySockets {
                plugin: self.descriptor.name.clone(),
            }));
        }

        inner.state = LifecycleState::Starting;

        // Stop-before-start gives the plugin a clean slate.
        if let Err(err) = self.stop_plugin() {
            debug!(
                "stop before start of plugin {} failed: {err:?}",
                self.descriptor.name
            );
        }

        if let Err(err) = self.start_plugin() {
            inner.state = LifecycleState::Idle;
            return Err(err);
        }

        if let Err(err) = self.serve_all(&mut inner).await {
            if let Err(rollback) = self.stop_cycle_locked(&mut inner).await {
                warn!(
                    "rollback of plugin {} failed: {rollback:?}",
                    self.descriptor.name
                );
            }
            inner.state = LifecycleState::Idle;
            return Err(err);
        }

        inner.state = LifecycleState::Serving;
        info!(
            "plugin {} is serving on {} socket(s)",
            self.descriptor.name,
            inner.servers.len()
        );
        Ok(())
    }

    async fn serve_all(&self, inner: &mut Inner) -> Result<(), Report<LifecycleError>> {
        socket::prepare(&self.descriptor.name, &mut inner.sockets)?;

        let ctx = self.serve_context();
        for socket in inner.sockets.clone() {
            let server = server::bind(&ctx, &socket).await?;
            inner.servers.push(server);
        }
        Ok(())
    }

    /// Plugin-kind service plus the handshake, wired to this supervisor.
    fn serve_context(&self) -> ServeContext {
        ServeContext {
            plugin_name: self.descriptor.name.clone(),
            routes: (self.routes)().add_service(RegistrationServer::from_arc(
                self.registration.clone(),
            )),
            metric_callback: self.metric_callback.clone(),
            control: self.control.clone(),
            config: self.config.clone(),
        }
    }

    async fn stop_cycle(&self) -> Result<(), Report<LifecycleError>> {
        let mut inner = self.inner.lock().await;
        if inner.state == LifecycleState::PermanentlyStopped {
            return Err(self.already_stopped());
        }
        inner.state = LifecycleState::Stopping;
        self.stop_cycle_locked(&mut inner).await?;
        inner.state = LifecycleState::Idle;
        Ok(())
    }

    /// Stops every server, removes the socket files and stops the plugin.
    ///
    /// A panic anywhere in the cycle comes back as
    /// [`LifecycleError::StopPanicked`].
    async fn stop_cycle_locked(&self, inner: &mut Inner) -> Result<(), Report<LifecycleError>> {
        match AssertUnwindSafe(self.stop_steps(inner)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(Report::new(LifecycleError::StopPanicked {
                plugin: self.descriptor.name.clone(),
                message: panic_message(payload.as_ref()),
            })),
        }
    }

    async fn stop_steps(&self, inner: &mut Inner) -> Result<(), Report<LifecycleError>> {
        for server in &mut inner.servers {
            debug!(
                "stopping gRPC server of plugin {} at {}",
                self.descriptor.name,
                server.socket().display()
            );
            server.stop(self.config.server_stop_grace).await;
        }
        inner.servers.clear();

        socket::remove_sockets(&self.descriptor.name, &inner.sockets)?;
        self.stop_plugin()
    }

    fn start_plugin(&self) -> Result<(), Report<LifecycleError>> {
        match std::panic::catch_unwind(AssertUnwindSafe(|| self.plugin.start())) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Report::new(LifecycleError::PluginStart {
                plugin: self.descriptor.name.clone(),
            })
            .attach_printable(format!("{e:#}"))),
            Err(payload) => Err(Report::new(LifecycleError::StartPanicked {
                plugin: self.descriptor.name.clone(),
                message: panic_message(payload.as_ref()),
            })),
        }
    }

    fn stop_plugin(&self) -> Result<(), Report<LifecycleError>> {
        match std::panic::catch_unwind(AssertUnwindSafe(|| self.plugin.stop())) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Report::new(LifecycleError::PluginStop {
                plugin: self.descriptor.name.clone(),
            })
            .attach_printable(format!("{e:#}"))),
            Err(payload) => Err(Report::new(LifecycleError::StopPanicked {
                plugin: self.descriptor.name.clone(),
                message: panic_message(payload.as_ref()),
            })),
        }
    }

    fn already_stopped(&self) -> Report<LifecycleError> {
        Report::new(LifecycleError::AlreadyStopped {
            plugin: self.descriptor.name.clone(),
        })
    }
}
