//! Backtask CLI tool
//!
//! Enqueues one task for the `processtask` function, the same way the
//! hosted `enqueue` function does.

use clap::Parser;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "backtask")]
#[command(author, version, about = "Enqueue a processtask task on Cloud Tasks", long_about = None)]
struct Cli {
    /// GCP project that owns the queue and the function
    #[arg(env = "PROJECT_ID")]
    project_id: String,

    /// Service account Cloud Tasks mints the OIDC token for
    #[arg(env = "SERVICE_ACCOUNT_EMAIL")]
    service_account_email: String,

    /// Apply the retry and rate limits of the processtask function to the queue first
    #[arg(long)]
    configure_queue: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout only carries the result
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    commands::enqueue::execute(
        &cli.project_id,
        &cli.service_account_email,
        cli.configure_queue,
    )
    .await?;

    println!("Enqueued");
    Ok(())
}
