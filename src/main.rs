//! cloudcost - Pivoted multi-period cloud cost reports

use anyhow::Context;
use clap::Parser;
use cloudcost::{
    cli::{Cli, Command},
    report::run_report,
};
use cloudcost_core::backend::BillingBackend;
use cloudcost_provider_ledger::LedgerBackend;
use cloudcost_terminal::get_formatter;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn open_backend(cli: &Cli) -> anyhow::Result<LedgerBackend> {
    let backend = match &cli.ledger {
        Some(path) => LedgerBackend::open(path)
            .await
            .with_context(|| format!("failed to open ledger {}", path.display()))?,
        None => LedgerBackend::from_env()
            .await
            .context("no ledger given, use --ledger or set CLOUDCOST_LEDGER")?,
    };
    Ok(backend)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --verbose overrides RUST_LOG
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("cloudcost=info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cloudcost=warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let backend = open_backend(&cli).await?;

    match &cli.command {
        Command::Parameters => {
            let formatter = get_formatter(cli.json, false);
            println!("{}", formatter.format_parameters(backend.parameters()));
        }
        Command::Report(args) => {
            info!("Running cost report");
            let backend = backend.with_page_size(args.page_size);
            let show_progress = !cli.json && is_terminal::is_terminal(std::io::stderr());
            let today = chrono::Utc::now().date_naive();

            let report = run_report(&backend, args, today, show_progress)
                .await
                .context("report failed")?;

            let formatter = get_formatter(cli.json, args.diff);
            if !cli.json {
                println!("Costs for {}", report.description);
            }
            println!("{}", formatter.format_pivot(&report.result));
        }
    }

    Ok(())
}
