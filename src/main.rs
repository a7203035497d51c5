use askdb::agent::Agent;
use askdb::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;
    let agent = Agent::from_config(&config)
        .map_err(|e| format!("failed to start agent: {e}"))?;

    askdb::server::serve(agent, config.port).await?;

    Ok(())
}
