use args::{parse_args, Args};
use bear_deploy::{
    deploy::{DeployError, DeploymentReport, DeploymentUnit},
    deployer::Deployer,
};
use log::{error, info, SetLoggerError};
use logger::init_logger;
use std::{io, process, time::Duration};
use thiserror::Error;

mod args;
mod logger;

#[derive(Debug, Error)]
pub enum MainError {
    #[error("You have to pass at least one site configuration.")]
    NoSites,
    #[error("Timezone offsets cannot be determined for the logs.")]
    FailedLoggerTimezones,
    #[error("The logger cannot be initialized: {0}")]
    Logger(#[from] SetLoggerError),
    #[error(transparent)]
    Deploy(#[from] DeployError),
    #[error("Cannot wait for the interrupt signal: {0}")]
    Signal(#[from] io::Error),
    #[error("{0} deployments failed.")]
    DeploymentsFailed(usize),
    #[error("Timed out after {0:?}.")]
    Timeout(Duration),
}

/// Count a deployment that failed or could not start, the other sites still run.
fn is_failure(result: Result<DeploymentReport, DeployError>) -> bool {
    match result {
        Ok(report) => !report.is_success(),
        Err(err) => {
            error!("Cannot deploy: {err}.");
            true
        }
    }
}

/// Deploy every site once, returns an error if any of them failed.
async fn deploy_once(units: &[DeploymentUnit], args: &Args) -> Result<(), MainError> {
    let sha = args.sha.as_deref();
    let mut failures = 0;

    for unit in units {
        if args.live && is_failure(unit.deploy_live(None, sha).await) {
            failures += 1;
        }
        if let Some(branch) = &args.stage {
            if is_failure(unit.deploy_stage(branch, sha).await) {
                failures += 1;
            }
        }
    }

    if failures > 0 {
        Err(MainError::DeploymentsFailed(failures))
    } else {
        Ok(())
    }
}

/// Deploy the sites on every notification, until interrupted.
async fn listen(units: &[DeploymentUnit]) -> Result<(), MainError> {
    for unit in units {
        unit.start_listening().await?;
    }

    tokio::signal::ctrl_c().await?;
    info!("Received interrupt, stopping.");

    Ok(())
}

async fn run(args: Args) -> Result<(), MainError> {
    if args.sites.is_empty() {
        return Err(MainError::NoSites);
    }

    let is_manual = args.live || args.stage.is_some();
    let deployer = if is_manual {
        Deployer::detached()
    } else {
        Deployer::new(&args.port)
    };
    let units: Vec<DeploymentUnit> = args
        .sites
        .iter()
        .map(|site| deployer.site(site.as_str()))
        .collect();

    let work = async {
        if is_manual {
            deploy_once(&units, &args).await
        } else {
            listen(&units).await
        }
    };

    match args.timeout.clone().map(Duration::from) {
        Some(timeout) => tokio::time::timeout(timeout, work)
            .await
            .map_err(|_| MainError::Timeout(timeout))?,
        None => work.await,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = parse_args();
    if args.version {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return;
    }

    if let Err(err) = init_logger(&args) {
        eprintln!("{err}");
        process::exit(1);
    }

    if let Err(err) = run(args).await {
        error!("{err}");
        process::exit(1);
    }
}
