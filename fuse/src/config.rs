use std::time::Duration;

use crate::{kubectl::Kubectl, rollout::RolloutConfig};

/// Names the kubectl context used for every command when set and non-empty.
pub const CLUSTER_CONTEXT_ENV: &str = "CLUSTER_CONTEXT";

/// Default for `apply --rollout-timeout`, e.g. `5m` or `90s`.
pub const CLUSTER_RELEASE_TIMEOUT_ENV: &str = "CLUSTER_RELEASE_TIMEOUT";

pub const DEFAULT_ROLLOUT_TIMEOUT: Duration = Duration::from_secs(120);

/// How long to wait between two readiness checks of a rollout.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How long to wait between two deletions from the registry.
pub const DELETE_DELAY: Duration = Duration::from_millis(100);

/// Settings shared by all commands, built once from the command line and the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub cluster_context: Option<String>,
    pub rollout_timeout: Duration,
    pub poll_interval: Duration,
}

impl Config {
    pub fn new(cluster_context: Option<String>) -> Self {
        Self {
            cluster_context: cluster_context.filter(|context| !context.is_empty()),
            rollout_timeout: DEFAULT_ROLLOUT_TIMEOUT,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_rollout_timeout(self, rollout_timeout: Duration) -> Self {
        Self {
            rollout_timeout,
            ..self
        }
    }

    pub fn rollout(&self) -> RolloutConfig {
        RolloutConfig {
            poll_interval: self.poll_interval,
        }
    }

    pub fn kubectl(&self) -> Kubectl {
        Kubectl::new(self.cluster_context.clone())
    }
}
