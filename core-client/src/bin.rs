use clap::Parser;
use fhe_challenge_client::*;

// CLI
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments and configuration file
    let config = CmdConfig::parse();
    let _guard = if config.logs {
        // Logging configuration
        setup_logging(config.file_conf.as_deref())?
    } else {
        None
    };

    let res = execute_cmd(&config).await?;
    println!("{}", serde_json::to_string_pretty(&res)?);
    Ok(())
}
