use anyhow::Result;
use clap::Parser;
use plugin_skeleton::cmd::run_info;
use plugin_skeleton::cmd::run_serve;
use plugin_skeleton::config::Cli;
use plugin_skeleton::config::Commands;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();
    let _guard = utils::logging::init(cli.log_path.as_ref())?;

    match cli.command {
        Commands::Serve(serve_args) => run_serve(serve_args).await,
        Commands::Info(info_args) => run_info(info_args).await,
    }
}
