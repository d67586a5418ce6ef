use anyhow::Context as _;
use clap::Parser as _;
use erp_mcp_server::{Cli, LogFormat};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    let config = cli.resolve().context("load configuration")?;
    tracing::info!(
        account_id = %config.options.account_id,
        record_types = config.record_types.len(),
        "starting erp-mcp-server"
    );
    erp_mcp_server::run(config).await.context("serve")?;
    Ok(())
}

/// stdout carries the protocol, so logs always go to stderr.
fn init_tracing(log_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
