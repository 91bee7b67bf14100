use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use api_types::registration::registration_client::RegistrationClient;
use api_types::registration::InfoRequest;

use crate::config::InfoArgs;
use crate::transport;

pub async fn run_info(info_args: InfoArgs) -> Result<()> {
    let timeout = Duration::from_secs(info_args.timeout_secs);
    let channel = transport::uds_channel(&info_args.socket, timeout)
        .await
        .with_context(|| format!("dial {} failed", info_args.socket.display()))?;

    let info = RegistrationClient::new(channel)
        .get_info(InfoRequest {})
        .await
        .context("GetInfo failed")?
        .into_inner();

    println!("type: {}", info.r#type);
    println!("name: {}", info.name);
    println!("supported versions: {}", info.supported_versions.join(", "));
    if !info.endpoint.is_empty() {
        println!("endpoint: {}", info.endpoint);
    }

    Ok(())
}
