mod cli;
mod config;
mod output;

use anyhow::Result;
use clap::Parser;

use linkrot_engine::LinkChecker;

use crate::cli::{Cli, Format, Verbosity};

// High fetch concurrency fragments glibc malloc badly; mimalloc holds up.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let cli = Cli::parse();

    let (config_path, explicit) = match &cli.config {
        Some(path) => (path.clone(), true),
        None => (config::DEFAULT_CONFIG_PATH.to_string(), false),
    };
    let file = config::load(&config_path, explicit)?;

    let verbosity = config::effective_verbosity(&cli, &file)?;
    init_tracing(verbosity);

    let format = config::effective_format(&cli, &file)?;
    let options = config::build_options(&cli, &file)?;

    let mut checker = LinkChecker::new();
    if format == Format::Text {
        let show_all = matches!(verbosity, Verbosity::Debug | Verbosity::Info);
        checker.on_link(move |link| output::print_link(link, show_all));
        checker.on_retry(|info| {
            tracing::info!(
                url = %info.url,
                seconds = info.seconds_until_retry,
                "retry scheduled"
            );
        });
    }

    let result = checker.check(options).await?;

    match format {
        Format::Text => output::print_summary(&result),
        Format::Json => output::write_json(std::io::stdout().lock(), &result)?,
        Format::Csv => output::write_csv(std::io::stdout().lock(), &result)?,
    }

    if !result.passed {
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(verbosity: Verbosity) {
    let default_filter = match verbosity {
        Verbosity::Debug => "debug",
        Verbosity::Info => "info",
        Verbosity::Warning => "warn",
        Verbosity::Error => "error",
        Verbosity::None => "off",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}
