//! `earmark` command line.
//!
//! `earmark acquire --request req.json` runs one acquisition and prints the
//! response; `earmark inspect diagnostics.txt` shows what would be extracted
//! from saved `ffmpeg` output. Logs go to stderr, controlled by `RUST_LOG`.

use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use earmark_config::Config;
use earmark_pipeline::Pipeline;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::io::AsyncReadExt;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Display, Error)]
enum CliError {
    #[display("cannot read {_0}")]
    Read(#[error(not(source))] String),
    #[display("{_0} is not valid JSON")]
    Json(#[error(not(source))] String),
    #[display("configuration error")]
    Config,
    #[display("cannot start the pipeline")]
    Pipeline,
    #[display("cannot parse diagnostics")]
    Inspect,
    #[display("cannot write output")]
    Output,
}

type Result<T> = std::result::Result<T, exn::Exn<CliError>>;

#[derive(Parser)]
#[command(version, about = "Acquire, decrypt and publish Audible audiobooks")]
struct Cli {
    /// Configuration file (TOML, YAML or JSON), layered over the defaults and
    /// the user config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one acquisition request and print the JSON response.
    Acquire {
        /// Request JSON file, or `-` for stdin.
        #[arg(long)]
        request: String,
    },
    /// Parse saved ffmpeg diagnostics and print the extracted metadata.
    Inspect { diagnostics: PathBuf },
}

async fn read_input(source: &str) -> Result<String> {
    let mut text = String::new();
    if source == "-" {
        tokio::io::stdin().read_to_string(&mut text).await.or_raise(|| CliError::Read("stdin".into()))?;
    } else {
        text = tokio::fs::read_to_string(source).await.or_raise(|| CliError::Read(source.to_string()))?;
    }
    Ok(text)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value).or_raise(|| CliError::Output)?;
    println!("{text}");
    Ok(())
}

async fn acquire(config: Option<&Path>, request: &str) -> Result<bool> {
    let config = Config::load(config).or_raise(|| CliError::Config)?;
    let body = read_input(request).await?;
    let body: serde_json::Value = serde_json::from_str(&body).or_raise(|| CliError::Json(request.to_string()))?;
    let pipeline = Pipeline::from_config(config).await.or_raise(|| CliError::Pipeline)?;
    let response = pipeline.handle(body).await;
    print_json(&response)?;
    Ok(response.is_success())
}

async fn inspect(diagnostics: &Path) -> Result<bool> {
    let text = tokio::fs::read_to_string(diagnostics)
        .await
        .or_raise(|| CliError::Read(diagnostics.display().to_string()))?;
    let metadata = earmark_extract::parse_tool_metadata(&text).or_raise(|| CliError::Inspect)?;
    print_json(&metadata)?;
    Ok(true)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let outcome = match &cli.command {
        Command::Acquire { request } => acquire(cli.config.as_deref(), request).await,
        Command::Inspect { diagnostics } => inspect(diagnostics).await,
    };
    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(error = ?err, "earmark failed");
            eprintln!("error: {}", *err);
            ExitCode::FAILURE
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_arguments() {
        let cli = Cli::try_parse_from(["earmark", "acquire", "--request", "-", "--config", "earmark.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("earmark.toml")));
        assert!(matches!(cli.command, Command::Acquire { request } if request == "-"));
    }

    #[test]
    fn test_acquire_needs_a_request() {
        assert!(Cli::try_parse_from(["earmark", "acquire"]).is_err());
    }

    #[tokio::test]
    async fn test_inspect_missing_file() {
        let err = inspect(Path::new("/nonexistent/diagnostics.txt")).await.unwrap_err();
        assert!(matches!(&*err, CliError::Read(_)));
    }
}
