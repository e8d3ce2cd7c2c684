use clap::Args;
use log::info;

use super::Result;
use crate::{
    config::Config,
    kubectl::{Cluster, ClusterCli, DEFAULT_NAMESPACE},
};

#[derive(Debug, Args)]
pub struct ExecArgs {
    /// Deployment selectors, e.g. `app=web`. Every selector is looked up on its own.
    #[arg(long = "deployments", value_delimiter = ',', required = true)]
    pub deployments: Vec<String>,

    /// Command to execute through `sh -c`
    #[arg(long = "command")]
    pub command: String,

    #[arg(long = "namespace", short = 'n', default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,
}

pub fn exec(config: &Config, args: ExecArgs) -> Result<()> {
    let ExecArgs {
        deployments,
        command,
        namespace,
    } = args;

    if command.is_empty() {
        return Err("no command provided".into());
    }
    if deployments.is_empty() {
        return Err("no deployment selectors provided".into());
    }

    run_in_pods(&config.kubectl(), &namespace, &deployments, &command)
}

/// Runs `command` in every container of the pods of the deployments matching each selector,
/// stopping at the first failure.
fn run_in_pods(
    cli: &dyn ClusterCli,
    namespace: &str,
    selectors: &[String],
    command: &str,
) -> Result<()> {
    let cluster = Cluster::new(cli);

    let mut pods = Vec::new();
    for selector in selectors {
        for deployment in cluster.deployments(namespace, std::slice::from_ref(selector))? {
            pods.extend(cluster.pods(namespace, &deployment.pod_selector())?);
        }
    }
    info!("Found {} pod(s)", pods.len());

    for pod in &pods {
        for container in &pod.spec.containers {
            let output = cluster.exec(namespace, pod.name(), &container.name, command)?;
            println!("==> Pod: {}, Container: {}:", pod.key(), container.name);
            println!("{output}");
        }
    }

    Ok(())
}
