use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use recap_gateway::api::{ApiServer, ApiState};
use recap_gateway::{
    CallIntelligence, Config, OpenAiIntelligence, Pipeline, SupabaseStore, Synthesizer,
    TextToSpeech, TwilioClient,
};

/// Recap - call recording transcription and voice callback gateway
#[derive(Parser)]
#[command(name = "recap", version, about)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "RECAP_PORT", default_value = "8080")]
    port: u16,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook server (default)
    Serve,
    /// Probe the transcription API for remaining quota
    CheckQuota,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "recap_gateway=info,tower_http=warn",
        1 => "recap_gateway=debug,tower_http=info",
        _ => "recap_gateway=trace,tower_http=debug",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    match cli.command {
        Some(Command::CheckQuota) => check_quota(&config).await,
        Some(Command::Serve) | None => serve(config, cli.port).await,
    }
}

/// Build the adapter stack and run the webhook server
async fn serve(config: Config, port: u16) -> anyhow::Result<()> {
    let telephony = Arc::new(TwilioClient::new(
        config.telephony.account_sid,
        config.telephony.auth_token,
        config.telephony.phone_number,
    )?);

    let intelligence = Arc::new(OpenAiIntelligence::new(config.openai_api_key.clone())?);

    let store = Arc::new(SupabaseStore::new(
        config.storage.url,
        config.storage.service_key,
        config.storage.bucket,
        config.storage.table,
    )?);

    let synthesizer = Arc::new(Synthesizer::new(
        TextToSpeech::new(config.openai_api_key)?,
        store.clone(),
    ));

    let pipeline = Arc::new(Pipeline::new(telephony, intelligence, store, synthesizer));

    tracing::info!(port, "recap gateway ready");

    ApiServer::new(Arc::new(ApiState { pipeline }), port)
        .run()
        .await?;

    Ok(())
}

/// Run the low-cost quota probe and report via exit status
async fn check_quota(config: &Config) -> anyhow::Result<()> {
    let intelligence = OpenAiIntelligence::new(config.openai_api_key.clone())?;

    if intelligence.check_quota().await {
        println!("API quota available");
        Ok(())
    } else {
        anyhow::bail!("API quota exhausted; check account billing and limits")
    }
}
