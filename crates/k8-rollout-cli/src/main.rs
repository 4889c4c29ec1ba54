mod opt;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

use k8_rollout::{HttpExecutor, NotifyStatus, Pipeline, RolloutConfig, RolloutError};

use self::opt::RolloutOpt;

#[tokio::main]
async fn main() -> ExitCode {
    let opt = RolloutOpt::parse();
    let logger = init_logger(opt.debug);

    let config = match opt.into_config() {
        Ok(config) => config,
        Err(err) => return report_failure(&err),
    };
    // the config file may ask for debug output the command line did not
    if let (true, Some(handle)) = (config.debug, &logger) {
        let _ = handle.reload(default_filter(true));
    }

    match run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report_failure(&err),
    }
}

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// `RUST_LOG` wins; otherwise `info`, or `debug` when asked for.
///
/// Returns a handle to adjust the level later, unless `RUST_LOG` pinned it.
fn init_logger(debug: bool) -> Option<FilterHandle> {
    let from_env = EnvFilter::try_from_default_env().ok();
    let pinned = from_env.is_some();
    let (filter, handle) =
        reload::Layer::new(from_env.unwrap_or_else(|| default_filter(debug)));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .ok()?;
    (!pinned).then_some(handle)
}

fn default_filter(debug: bool) -> EnvFilter {
    EnvFilter::new(if debug { "debug" } else { "info" })
}

async fn run(config: &RolloutConfig) -> Result<()> {
    let executor = HttpExecutor::new(config.debug, config.timeout)
        .context("unable to set up HTTP client")?;
    let pipeline = Pipeline::from_config(config, Arc::new(executor))?;

    let report = pipeline.run().await?;

    for artifact in &report.artifacts {
        info!(
            file = %artifact.file,
            name = %artifact.name,
            kind = %artifact.kind,
            replaced = artifact.outcome.replaced,
            "deployed"
        );
    }
    match &report.notify {
        NotifyStatus::Sent => info!("deployment webhook delivered"),
        NotifyStatus::Skipped => info!("no webhook configured"),
        NotifyStatus::Failed(err) => warn!(%err, "deployment webhook not delivered"),
    }
    println!(
        "deployed {} artifact(s) to {}: {}",
        report.artifacts.len(),
        config.namespace,
        report.images.join(", ")
    );
    Ok(())
}

fn report_failure(err: &anyhow::Error) -> ExitCode {
    eprintln!("Error: {err:?}");
    if let Some(body) = err
        .downcast_ref::<RolloutError>()
        .and_then(RolloutError::response_body)
        .filter(|body| !body.is_empty())
    {
        eprintln!("Response body: {body}");
    }
    ExitCode::FAILURE
}
