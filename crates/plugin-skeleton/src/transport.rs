use std::path::Path;
use std::time::Duration;

use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tonic::transport::Channel;
use tonic::transport::Endpoint;
use tonic::transport::Uri;
use tower::service_fn;

/// create Unix Domain Socket client connection
///
/// The whole dial, including the HTTP/2 handshake, is bounded by `timeout`.
pub async fn uds_channel(socket_path: &Path, timeout: Duration) -> anyhow::Result<Channel> {
    let socket_path = socket_path.to_path_buf();

    // Note: The HTTP URL is a placeholder since we're using Unix socket connector
    let endpoint = Endpoint::from_static("http://tonic").connect_timeout(timeout);
    let connect = endpoint.connect_with_connector(service_fn(move |_: Uri| {
        let socket_path = socket_path.clone();
        async move {
            match UnixStream::connect(socket_path).await {
                Ok(stream) => Ok(TokioIo::new(stream)),
                Err(e) => Err(Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
            }
        }
    }));

    let channel = tokio::time::timeout(timeout, connect)
        .await
        .map_err(|_| anyhow::anyhow!("dial timed out after {timeout:?}"))??;

    Ok(channel)
}
