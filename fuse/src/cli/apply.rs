use std::{path::PathBuf, time::Duration};

use clap::Args;
use log::{info, warn};

use super::Result;
use crate::{
    cancel::CancellationToken,
    config::{Config, CLUSTER_RELEASE_TIMEOUT_ENV},
    rollout::RolloutController,
};

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Manifest to apply, only its deployments are waited for
    #[arg(long = "configuration", short = 'f')]
    pub configuration: PathBuf,

    /// How long the deployments may take to become ready before they are rolled back, e.g. `90s`
    /// or `5m`
    #[arg(
        long = "rollout-timeout",
        short = 't',
        env = CLUSTER_RELEASE_TIMEOUT_ENV,
        default_value = "2m",
        value_parser = humantime::parse_duration,
    )]
    pub rollout_timeout: Duration,
}

pub fn apply(config: Config, args: ApplyArgs, token: &CancellationToken) -> Result<bool> {
    let ApplyArgs {
        configuration,
        rollout_timeout,
    } = args;

    if configuration.as_os_str().is_empty() {
        return Err("configuration is a mandatory parameter".into());
    }
    let path = std::path::absolute(&configuration)?;
    info!("Using file {}", path.display());

    let config = config.with_rollout_timeout(rollout_timeout);
    let kubectl = config.kubectl();
    let mut controller = RolloutController::new(&kubectl, config.rollout(), token.clone());

    let success = controller.run(&path, config.rollout_timeout)?;
    if success {
        info!("Rollout of {} completed", path.display());
    } else {
        warn!("Rollout of {} failed", path.display());
    }
    Ok(success)
}
