//! One gRPC server per plugin socket.

use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use error_stack::Report;
use error_stack::ResultExt;
use futures::Stream;
use tokio::net::UnixListener;
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::service::Routes;
use tonic::transport::Server;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::config::LifecycleConfig;
use crate::error::LifecycleError;
use crate::plugin::MetricCallback;
use crate::transport;
use crate::wrapper::control::ControlSignals;
use crate::wrapper::crash::CrashWindow;

pub const METRIC_PLUGIN_RESTART: &str = "plugin_restart";
pub const METRIC_PLUGIN_CRASH_LOOP: &str = "plugin_crash_loop";

/// Everything a serving task needs besides its socket.
#[derive(Clone)]
pub(crate) struct ServeContext {
    pub(crate) plugin_name: String,
    pub(crate) routes: Routes,
    pub(crate) metric_callback: MetricCallback,
    pub(crate) control: ControlSignals,
    pub(crate) config: LifecycleConfig,
}

/// A gRPC server bound to one socket, alive until [`BoundServer::stop`].
#[derive(Debug)]
pub(crate) struct BoundServer {
    socket: PathBuf,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl BoundServer {
    pub(crate) fn socket(&self) -> &Path {
        &self.socket
    }

    /// Stops the server; calling it again is a no-op.
    ///
    /// In-flight calls get `grace` to finish before the serving task is
    /// aborted.
    pub(crate) async fn stop(&mut self, grace: Duration) {
        self.shutdown.cancel();
        let Some(mut task) = self.task.take() else {
            return;
        };

        if tokio::time::timeout(grace, &mut task).await.is_err() {
            warn!(
                "gRPC server at socket {} did not drain within {grace:?}, aborting",
                self.socket.display()
            );
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for BoundServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Binds `socket`, serves the context routes on it in the background and
/// checks the socket accepts connections.
///
/// The server is stopped again if the dial check fails.
pub(crate) async fn bind(
    ctx: &ServeContext,
    socket: &Path,
) -> Result<BoundServer, Report<LifecycleError>> {
    let listener = UnixListener::bind(socket).change_context_lazy(|| LifecycleError::Bind {
        plugin: ctx.plugin_name.clone(),
        socket: socket.to_path_buf(),
    })?;

    let listener = Arc::new(listener);
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(serve(
        ctx.clone(),
        socket.to_path_buf(),
        move || incoming(listener.clone()),
        shutdown.clone(),
    ));
    let mut server = BoundServer {
        socket: socket.to_path_buf(),
        shutdown,
        task: Some(task),
    };

    if let Err(e) = transport::uds_channel(socket, ctx.config.dial_timeout).await {
        server.stop(ctx.config.server_stop_grace).await;
        return Err(Report::new(LifecycleError::DialCheck {
            plugin: ctx.plugin_name.clone(),
            socket: socket.to_path_buf(),
        })
        .attach_printable(format!("{e:#}")));
    }

    info!("serve {} successfully on {}", ctx.plugin_name, socket.display());
    Ok(server)
}

/// Serving task of one socket.
///
/// Each round serves the connections yielded by a fresh `incoming()` stream.
/// A round that ends before `shutdown` is cancelled is a crash, whether the
/// server failed or its incoming stream simply ran dry, and re-enters the
/// loop. Too many crashes in a row hand over to the supervisor with a restart
/// request.
pub(super) async fn serve<F, S>(
    ctx: ServeContext,
    socket: PathBuf,
    mut incoming: F,
    shutdown: CancellationToken,
) where
    F: FnMut() -> S,
    S: Stream<Item = io::Result<UnixStream>> + Send + 'static,
{
    let mut crashes = CrashWindow::new(
        Instant::now(),
        ctx.config.crash_reset_window,
        ctx.config.crash_threshold,
    );

    loop {
        info!(
            "starting gRPC server for {} at socket {}",
            ctx.plugin_name,
            socket.display()
        );

        let token = shutdown.clone();
        let result = Server::builder()
            .add_routes(ctx.routes.clone())
            .serve_with_incoming_shutdown(Box::pin(incoming()), async move {
                token.cancelled().await;
            })
            .await;

        // a listener that stops yielding connections ends the server with Ok
        let cause = match result {
            _ if shutdown.is_cancelled() => break,
            Ok(()) => "incoming connections ended".to_string(),
            Err(err) => err.to_string(),
        };

        error!(
            "gRPC server for {} crashed with error: {cause} at socket {}",
            ctx.plugin_name,
            socket.display()
        );
        (ctx.metric_callback)(METRIC_PLUGIN_RESTART, 1);

        if crashes.record(Instant::now()) {
            error!(
                "gRPC server for {} at socket {} crashed {} times in a row, requesting restart",
                ctx.plugin_name,
                socket.display(),
                crashes.consecutive()
            );
            (ctx.metric_callback)(METRIC_PLUGIN_CRASH_LOOP, 1);
            if !ctx.control.request_restart() {
                info!("plugin {} already stopped, skip restart", ctx.plugin_name);
            }
            break;
        }
    }

    info!(
        "gRPC server for {} at socket {} exited",
        ctx.plugin_name,
        socket.display()
    );
}

/// Connections accepted on a shared listener.
fn incoming(listener: Arc<UnixListener>) -> impl Stream<Item = io::Result<UnixStream>> {
    futures::stream::unfold(listener, |listener| async move {
        let accepted = listener.accept().await.map(|(stream, _)| stream);
        Some((accepted, listener))
    })
}
