use core::error::Error;
use std::path::PathBuf;

/// Errors returned synchronously when wrapping a plugin.
#[derive(Debug, derive_more::Display)]
pub enum ConstructionError {
    #[display("unsupported plugin type: {name}")]
    UnsupportedPluginType { name: String },
}

impl Error for ConstructionError {}

/// Errors raised while running the plugin lifecycle.
///
/// Everything except [`LifecycleError::AlreadyStopped`] and
/// [`LifecycleError::NoRuntime`] is transient from the supervisor's point of
/// view and gets retried.
#[derive(Debug, derive_more::Display)]
pub enum LifecycleError {
    #[display("{plugin} plugin got empty sockets")]
    EmptySockets { plugin: String },
    #[display("prepare registration directory {} for {plugin} failed", dir.display())]
    SocketDirectory { plugin: String, dir: PathBuf },
    #[display("start wrapped plugin {plugin} failed")]
    PluginStart { plugin: String },
    #[display("start plugin {plugin} panicked: {message}")]
    StartPanicked { plugin: String, message: String },
    #[display("stop wrapped plugin {plugin} failed")]
    PluginStop { plugin: String },
    #[display("listen for {plugin} at socket {} failed", socket.display())]
    Bind { plugin: String, socket: PathBuf },
    #[display("dial check for {plugin} at socket {} failed", socket.display())]
    DialCheck { plugin: String, socket: PathBuf },
    #[display("cleanup failed for {plugin}")]
    Cleanup { plugin: String },
    #[display("stop plugin {plugin} panicked: {message}")]
    StopPanicked { plugin: String, message: String },
    #[display("plugin {plugin} has been stopped permanently")]
    AlreadyStopped { plugin: String },
    #[display("plugin {plugin} can only be started within a tokio runtime")]
    NoRuntime { plugin: String },
}

impl Error for LifecycleError {}

/// Renders a panic payload for logs and error messages.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn lifecycle_error_display_formatting() {
        let bind = LifecycleError::Bind {
            plugin: "cpu-plugin".to_string(),
            socket: PathBuf::from("/tmp/x/cpu-plugin.sock"),
        };
        assert_eq!(
            bind.to_string(),
            "listen for cpu-plugin at socket /tmp/x/cpu-plugin.sock failed"
        );

        let empty = LifecycleError::EmptySockets {
            plugin: "cpu-plugin".to_string(),
        };
        assert_eq!(empty.to_string(), "cpu-plugin plugin got empty sockets");

        let panicked = LifecycleError::StartPanicked {
            plugin: "cpu-plugin".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(panicked.to_string(), "start plugin cpu-plugin panicked: boom");

        let unsupported = ConstructionError::UnsupportedPluginType {
            name: "plain".to_string(),
        };
        assert_eq!(unsupported.to_string(), "unsupported plugin type: plain");
    }

    #[test]
    fn panic_message_handles_common_payloads() {
        let static_str: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(static_str.as_ref()), "boom");

        let owned: Box<dyn std::any::Any + Send> = Box::new("bang".to_string());
        assert_eq!(panic_message(owned.as_ref()), "bang");

        let other: Box<dyn std::any::Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }
}
