//! A reporter plugin serving canned content, for exercising the consumers of
//! reporter plugins end to end.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use api_types::reporter::reporter_plugin_server::ReporterPlugin as ReporterPluginService;
use api_types::reporter::Empty;
use api_types::reporter::GetReportContentResponse;
use api_types::reporter::ReportContent;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Request;
use tonic::Response;
use tonic::Result as TonicResult;
use tonic::Status;
use tracing::error;
use tracing::info;

use crate::plugin::dummy::ReportContentStream;
use crate::plugin::GenericPlugin;
use crate::plugin::PluginCapability;

const UPDATE_BUFFER: usize = 16;

#[derive(Debug, Default)]
struct StubState {
    started: bool,
    stop: Option<CancellationToken>,
}

/// Reporter plugin that reports the content it was created with, and streams
/// every later [`ReporterPluginStub::update`] to open watchers.
#[derive(Debug)]
pub struct ReporterPluginStub {
    name: String,
    content: Vec<ReportContent>,
    updates: broadcast::Sender<Vec<ReportContent>>,
    state: Mutex<StubState>,
}

impl ReporterPluginStub {
    pub fn new(content: Vec<ReportContent>, name: impl Into<String>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);
        Self {
            name: name.into(),
            content,
            updates,
            state: Mutex::new(StubState::default()),
        }
    }

    /// Pushes new content to every open `ListAndWatchReportContent` stream.
    ///
    /// Returns the number of watchers that received it.
    pub fn update(&self, content: Vec<ReportContent>) -> usize {
        self.updates.send(content).unwrap_or(0)
    }

    pub fn is_started(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .started
    }

    fn stop_token(&self) -> Option<CancellationToken> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stop
            .clone()
    }
}

impl GenericPlugin for ReporterPluginStub {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn start(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.started {
            return Ok(());
        }

        state.stop = Some(CancellationToken::new());
        state.started = true;
        Ok(())
    }

    fn stop(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(stop) = state.stop.take() {
            stop.cancel();
        }
        state.started = false;
        Ok(())
    }

    fn capability(self: Arc<Self>) -> Option<PluginCapability> {
        Some(PluginCapability::reporter(self))
    }
}

#[tonic::async_trait]
impl ReporterPluginService for ReporterPluginStub {
    async fn get_report_content(
        &self,
        _request: Request<Empty>,
    ) -> TonicResult<Response<GetReportContentResponse>> {
        Ok(Response::new(GetReportContentResponse {
            content: self.content.clone(),
        }))
    }

    type ListAndWatchReportContentStream = ReportContentStream;

    async fn list_and_watch_report_content(
        &self,
        _request: Request<Empty>,
    ) -> TonicResult<Response<Self::ListAndWatchReportContentStream>> {
        info!("plugin {} ListAndWatchReportContent", self.name);

        let Some(stop) = self.stop_token() else {
            return Err(Status::failed_precondition(format!(
                "plugin {} is not started",
                self.name
            )));
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let mut updates = self.updates.subscribe();
        let initial = GetReportContentResponse {
            content: self.content.clone(),
        };
        let name = self.name.clone();

        tokio::spawn(async move {
            if tx.send(Ok(initial)).is_err() {
                return;
            }

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tx.closed() => break,
                    update = updates.recv() => {
                        let content = match update {
                            Ok(content) => content,
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                error!("plugin {name} watcher lagged, skipped {skipped} updates");
                                continue;
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        };
                        if let Err(e) = tx.send(Ok(GetReportContentResponse { content })) {
                            error!("plugin {name} ListAndWatchReportContent send response failed, {e}");
                            break;
                        }
                    }
                }
            }
        });

        let stream = tokio_stream::wrappers::UnboundedReceiverStream::new(rx);
        Ok(Response::new(Box::pin(stream)))
    }
}
