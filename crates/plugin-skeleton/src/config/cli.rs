use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use utils::version;

use crate::plugin::PluginKind;

#[derive(Parser)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = utils::logging::LOG_PATH_ENV_VAR,
        value_hint = clap::ValueHint::FilePath,
        help = "Write logs to a daily rolling file instead of stderr, e.g. /var/log/plugin.log"
    )]
    pub log_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve a dummy plugin behind the registration wrapper
    Serve(ServeArgs),
    /// Query the registration handshake of a plugin socket
    Info(InfoArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Eviction,
    Reporter,
    Qrm,
}

impl From<KindArg> for PluginKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Eviction => PluginKind::Eviction,
            KindArg::Reporter => PluginKind::Reporter,
            KindArg::Qrm => PluginKind::QosResource,
        }
    }
}

#[derive(Parser, Clone, Debug)]
pub struct ServeArgs {
    #[arg(long, value_enum, help = "Kind of plugin to serve")]
    pub kind: KindArg,

    #[arg(long, help = "Plugin name, defaults to the dummy plugin name of the kind")]
    pub name: Option<String>,

    #[arg(
        long = "registration-dir",
        env = "PLUGIN_REGISTRATION_DIRS",
        value_delimiter = ',',
        value_hint = clap::ValueHint::DirPath,
        help = "Directory scanned by the host plugin watcher, repeat for several"
    )]
    pub registration_dirs: Vec<PathBuf>,

    #[arg(
        long,
        env = "PLUGIN_LIFECYCLE_CONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "YAML file overriding lifecycle timings"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
pub struct InfoArgs {
    #[arg(long, value_hint = clap::ValueHint::FilePath, help = "Plugin socket to query")]
    pub socket: PathBuf,

    #[arg(long, default_value = "5", help = "Dial timeout in seconds")]
    pub timeout_secs: u64,
}
