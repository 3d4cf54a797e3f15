use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use s3ftps::{
    invoke, EngineOptions, Invocation, S3Store, Secret, SftpConnector, Status, SyncConfig,
    SyncEngine, WireRequest,
};

#[derive(Parser)]
#[command(name = "s3ftps")]
#[command(about = "Synchronize files between an SFTP endpoint and an S3-compatible bucket", version)]
#[command(after_help = "Store credentials and trust settings come from --config and the environment:
  AWS_REGION, AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_SESSION_TOKEN,
  S3FTPS_STORE_ENDPOINT, S3FTPS_CONNECT_TIMEOUT_SECS, S3FTPS_DEADLINE_SECS,
  S3FTPS_DELETE_REMOTE, S3FTPS_HOST_FINGERPRINTS, S3FTPS_INSECURE_ACCEPT_ANY_HOST_KEY

Exit status: 0 success, 2 some items failed, 1 the run failed.")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print the full outcome as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct EndpointArgs {
    /// Remote host, optionally host:port
    #[arg(long)]
    host: String,

    #[arg(short, long)]
    user: String,

    #[arg(long, env = "S3FTPS_PASSWORD", hide_env_values = true)]
    password: String,

    /// Expected server key blob, base64
    #[arg(long)]
    host_key: Option<String>,

    #[arg(short, long)]
    bucket: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy files from a remote directory into the bucket
    Get {
        #[command(flatten)]
        endpoint: EndpointArgs,

        /// Remote directory to pull from; also the key prefix in the bucket
        #[arg(long)]
        download_path: String,
    },

    /// Send objects under a prefix to the remote, then move them to the sent prefix
    Put {
        #[command(flatten)]
        endpoint: EndpointArgs,

        /// Prefix holding objects to send; also the remote directory
        #[arg(long)]
        upload_path: String,

        /// Prefix objects are moved to once sent
        #[arg(long)]
        sent_path: String,
    },

    /// Run a JSON wire request read from a file, or stdin with "-"
    Invoke {
        #[arg(short, long, default_value = "-")]
        request: String,
    },
}

impl EndpointArgs {
    fn into_wire(self, operation: &str) -> WireRequest {
        WireRequest {
            operation: Some(operation.to_string()),
            host: Some(self.host),
            user: Some(self.user),
            password: Some(Secret::new(self.password)),
            host_key: self.host_key,
            bucket: Some(self.bucket),
            ..WireRequest::default()
        }
    }
}

fn read_request(source: &str) -> Result<WireRequest> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("reading {source}"))?
    };
    serde_json::from_str(&raw).context("request is not a valid JSON object")
}

fn print_outcome(outcome: &Invocation, json: bool) -> Result<()> {
    let line = match (&outcome.report, &outcome.error) {
        (Some(report), _) => report.summary(),
        (None, Some(error)) => error.clone(),
        (None, None) => String::new(),
    };
    let status = match outcome.status {
        Status::Success => "✓ Success".green().bold(),
        Status::PartialFailure => "⚠ PartialFailure".yellow().bold(),
        Status::Failed => "✗ Failed".red().bold(),
    };
    eprintln!("{} {}", status, line.bright_white());

    if let Some(report) = &outcome.report {
        for failure in &report.failed {
            eprintln!("  {} {}: {}", "•".red(), failure.item, failure.message);
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("s3ftps=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::load(cli.config.as_deref())?;

    let (wire, json) = match cli.command {
        Commands::Get {
            endpoint,
            download_path,
        } => {
            let mut wire = endpoint.into_wire("get");
            wire.download_path = Some(download_path);
            (wire, cli.json)
        }
        Commands::Put {
            endpoint,
            upload_path,
            sent_path,
        } => {
            let mut wire = endpoint.into_wire("put");
            wire.upload_path = Some(upload_path);
            wire.sent_path = Some(sent_path);
            (wire, cli.json)
        }
        Commands::Invoke { request } => (read_request(&request)?, true),
    };

    let engine = SyncEngine::new(
        Arc::new(SftpConnector::new(
            config.trust.clone(),
            config.connect_timeout(),
        )),
        Arc::new(S3Store::new(config.store.clone())?),
        EngineOptions {
            delete_remote_after_get: config.delete_remote_after_get,
        },
    );

    let outcome = invoke(&engine, wire, config.deadline()).await;
    print_outcome(&outcome, json)?;

    Ok(match outcome.status {
        Status::Success => ExitCode::SUCCESS,
        Status::PartialFailure => ExitCode::from(2),
        Status::Failed => ExitCode::FAILURE,
    })
}
