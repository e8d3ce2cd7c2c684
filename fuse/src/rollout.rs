//! Applies a manifest, waits for its deployments to become ready and rolls them back when they do
//! not make it in time.

use std::{
    path::Path,
    time::{Duration, Instant},
};

use log::{info, warn};

use crate::{
    cancel::CancellationToken,
    config::POLL_INTERVAL,
    kubectl::{decode_file, Cluster, ClusterCli, Deployment, Kind},
    Error, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutState {
    Init,
    Applying,
    Monitoring,
    Succeeded,
    TimedOut,
    Cancelled,
    Finalizing,
    Done(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    Succeeded,
    TimedOut,
    Cancelled,
}

impl MonitorOutcome {
    pub fn is_success(self) -> bool {
        self == MonitorOutcome::Succeeded
    }
}

impl From<MonitorOutcome> for RolloutState {
    fn from(value: MonitorOutcome) -> Self {
        match value {
            MonitorOutcome::Succeeded => RolloutState::Succeeded,
            MonitorOutcome::TimedOut => RolloutState::TimedOut,
            MonitorOutcome::Cancelled => RolloutState::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolloutConfig {
    pub poll_interval: Duration,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
        }
    }
}

struct Deadline(Instant);

impl Deadline {
    fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    fn has_passed(&self) -> bool {
        Instant::now() >= self.0
    }
}

pub struct RolloutController<'a> {
    cluster: Cluster<'a>,
    config: RolloutConfig,
    token: CancellationToken,
    state: RolloutState,
}

impl<'a> RolloutController<'a> {
    pub fn new(cli: &'a dyn ClusterCli, config: RolloutConfig, token: CancellationToken) -> Self {
        Self {
            cluster: Cluster::new(cli),
            config,
            token,
            state: RolloutState::Init,
        }
    }

    pub fn state(&self) -> RolloutState {
        self.state
    }

    /// Reads the deployments from the manifest at `path`. Fails when there are none.
    pub fn load_spec(&self, path: &Path) -> Result<Vec<Deployment>> {
        let deployments = decode_file(path)?.deployments();
        if deployments.is_empty() {
            return Err(Error::NoDeploymentsFound(path.to_owned()));
        }
        Ok(deployments)
    }

    pub fn apply(&mut self, path: &Path) -> Result<()> {
        self.state = RolloutState::Applying;
        info!("Applying {}...", path.display());

        let output = self.cluster.apply(path)?;
        for line in String::from_utf8_lossy(&output).lines() {
            info!("{line}");
        }
        Ok(())
    }

    /// Polls the deployments until they are all ready, the timeout elapses or the rollout is
    /// cancelled. A timeout wins over a snapshot that became ready in the same tick.
    pub fn monitor(&mut self, specs: &[Deployment], timeout: Duration) -> Result<MonitorOutcome> {
        self.state = RolloutState::Monitoring;
        info!(
            "Waiting up to {} for {} deployment(s) to become ready...",
            humantime::format_duration(timeout),
            specs.len()
        );

        let deadline = Deadline::after(timeout);
        let outcome = loop {
            if self.token.sleep(self.config.poll_interval).is_err() {
                warn!("Stopped waiting for the rollout to complete");
                break MonitorOutcome::Cancelled;
            }

            let mut snapshot = Vec::with_capacity(specs.len());
            for spec in specs {
                match self.cluster.deployment(spec.namespace(), spec.name()) {
                    Ok(Some(deployment)) => {
                        info!("{}: {}", deployment.key(), deployment.status_line());
                        snapshot.push(deployment);
                    }
                    Ok(None) => warn!("Deployment {} not found", spec.key()),
                    Err(error @ Error::Parse(_)) => return Err(error),
                    Err(error) => warn!("Failed to fetch deployment {}: {error}", spec.key()),
                }
            }

            if deadline.has_passed() {
                warn!(
                    "Deployments did not become ready within {}",
                    humantime::format_duration(timeout)
                );
                break MonitorOutcome::TimedOut;
            }

            if snapshot.len() < specs.len() {
                continue;
            }

            if snapshot.iter().all(Deployment::is_ready) {
                info!("All deployments are ready");
                break MonitorOutcome::Succeeded;
            }
        };

        self.state = outcome.into();
        Ok(outcome)
    }

    /// Emits the logs of every pod of the deployments and, unless the rollout succeeded, undoes
    /// every deployment that has a previous revision to return to.
    pub fn finalize(&mut self, specs: &[Deployment], success: bool) -> Result<bool> {
        self.state = RolloutState::Finalizing;

        for spec in specs {
            for pod in self.cluster.pods(spec.namespace(), &spec.pod_selector())? {
                let logs = self.cluster.pod_logs(pod.namespace(), pod.name())?;
                info!("Logs of pod {}:", pod.key());
                for line in logs.lines() {
                    info!("  {line}");
                }
            }
        }

        if !success {
            for spec in specs {
                let replica_sets = self.cluster.replica_sets(spec.namespace(), &spec.selector())?;
                if replica_sets.len() > 1 {
                    warn!("Rolling back deployment {}...", spec.key());
                    self.cluster
                        .rollback(spec.namespace(), Kind::Deployment, spec.name())?;
                } else {
                    warn!(
                        "No rollback history available for deployment {}",
                        spec.key()
                    );
                }
            }
        }

        self.state = RolloutState::Done(success);
        Ok(success)
    }

    /// Runs the whole rollout. Returns whether the deployments became ready, in which case nothing
    /// was rolled back.
    pub fn run(&mut self, path: &Path, timeout: Duration) -> Result<bool> {
        let specs = self.load_spec(path)?;
        self.apply(path)?;
        let outcome = self.monitor(&specs, timeout)?;
        self.finalize(&specs, outcome.is_success())
    }
}
