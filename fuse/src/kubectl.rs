use std::{ffi::OsStr, path::Path};

use log::{debug, warn};

use crate::{process, Error, Result};

mod resource;
pub use resource::*;

mod decode;
pub use decode::*;

const KUBECTL: &str = "kubectl";

/// What a cluster CLI invocation produced. On success `output` is standard output only. On failure
/// it holds everything the command printed, standard error included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOutput {
    pub output: Vec<u8>,
    pub success: bool,
}

impl CliOutput {
    pub fn success(output: impl Into<Vec<u8>>) -> Self {
        Self {
            output: output.into(),
            success: true,
        }
    }

    pub fn failure(output: impl Into<Vec<u8>>) -> Self {
        Self {
            output: output.into(),
            success: false,
        }
    }
}

/// Runs cluster CLI commands. Implementations never fail outright, a command that could not be
/// started is reported as an unsuccessful [`CliOutput`].
///
/// A successful run yields standard output alone, standard error is logged at `warn` so it cannot
/// corrupt decoded output. A failed run yields standard output and standard error combined.
pub trait ClusterCli {
    fn run(&self, args: &[String]) -> CliOutput;
}

/// Runs the `kubectl` binary found on the `PATH`.
#[derive(Debug, Clone, Default)]
pub struct Kubectl {
    context: Option<String>,
}

impl Kubectl {
    /// Every invocation is prefixed with `--context=<context>` when a context is given.
    pub fn new(context: Option<String>) -> Self {
        Self {
            context: context.filter(|context| !context.is_empty()),
        }
    }

    fn command(&self, args: &[String]) -> process::Command {
        let mut command = process::command!(KUBECTL);
        if let Some(context) = &self.context {
            command = process::args!(command, format!("--context={context}"));
        }
        command.args(args.iter().map(OsStr::new))
    }
}

impl ClusterCli for Kubectl {
    fn run(&self, args: &[String]) -> CliOutput {
        match self.command(args).try_output() {
            Ok(output) if output.success() => {
                let process::Output { output, .. } = output;
                // Warnings printed by kubectl would corrupt the YAML on stdout.
                if !output.stderr.is_empty() {
                    warn!("{}", String::from_utf8_lossy(&output.stderr).trim_end());
                }
                CliOutput::success(output.stdout)
            }
            Ok(output) => {
                let combined = output.combined();
                let error = process::Error {
                    kind: process::ErrorKind::NonZeroExitStatus(output.exit_code()),
                    command: output.command,
                };
                debug!("{error}");
                CliOutput::failure(combined)
            }
            Err(error) => CliOutput::failure(error.to_string()),
        }
    }
}

fn namespace_arg(namespace: &str) -> String {
    format!("--namespace={}", namespace_or_default(namespace))
}

/// `--selector=a=b,c=d`, `None` for an empty selector so that everything is listed.
fn selector_arg(selector: &[String]) -> Option<String> {
    (!selector.is_empty()).then(|| format!("--selector={}", selector.join(",")))
}

fn strings<const N: usize>(args: [&str; N]) -> Vec<String> {
    args.into_iter().map(str::to_owned).collect()
}

/// Typed queries and mutations on top of a [`ClusterCli`].
#[derive(Clone, Copy)]
pub struct Cluster<'a> {
    cli: &'a dyn ClusterCli,
}

impl<'a> Cluster<'a> {
    pub fn new(cli: &'a dyn ClusterCli) -> Self {
        Self { cli }
    }

    /// Runs the command and returns its output, failing with [`Error::ExternalCall`] when the
    /// command did not succeed.
    pub fn run_plain(&self, args: &[String]) -> Result<Vec<u8>> {
        let CliOutput { output, success } = self.cli.run(args);
        if success {
            Ok(output)
        } else {
            Err(Error::external_call(args, &output))
        }
    }

    pub fn run_and_decode(&self, args: &[String]) -> Result<ResourceList> {
        decode(&self.run_plain(args)?)
    }

    fn get(&self, namespace: &str, what: &str, selector: &[String]) -> Result<ResourceList> {
        let mut args = vec![namespace_arg(namespace), "get".to_owned(), what.to_owned()];
        args.extend(selector_arg(selector));
        args.extend(strings(["-o", "yaml"]));
        self.run_and_decode(&args)
    }

    /// `kubectl apply -f <path> -o name`, returns the names of the applied resources.
    pub fn apply(&self, path: &Path) -> Result<Vec<u8>> {
        let path = path.to_string_lossy();
        self.run_plain(&strings(["apply", "-f", &*path, "-o", "name"]))
    }

    pub fn rollback(&self, namespace: &str, kind: Kind, name: &str) -> Result<Vec<u8>> {
        self.run_plain(&[
            namespace_arg(namespace),
            "rollout".to_owned(),
            "undo".to_owned(),
            format!("{kind}/{name}"),
        ])
    }

    pub fn namespaces(&self) -> Result<Vec<Namespace>> {
        Ok(self
            .run_and_decode(&strings(["get", "namespaces", "-o", "yaml"]))?
            .namespaces())
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        let what = format!("{}/{name}", Kind::Deployment);
        Ok(self
            .get(namespace, &what, &[])?
            .deployments()
            .into_iter()
            .next())
    }

    pub fn deployments(&self, namespace: &str, selector: &[String]) -> Result<Vec<Deployment>> {
        Ok(self.get(namespace, "deployments", selector)?.deployments())
    }

    pub fn replica_sets(&self, namespace: &str, selector: &[String]) -> Result<Vec<ReplicaSet>> {
        Ok(self.get(namespace, "replicasets", selector)?.replica_sets())
    }

    pub fn pods(&self, namespace: &str, selector: &[String]) -> Result<Vec<Pod>> {
        Ok(self.get(namespace, "pods", selector)?.pods())
    }

    pub fn pod_logs(&self, namespace: &str, pod: &str) -> Result<String> {
        let output = self.run_plain(&[namespace_arg(namespace), "logs".to_owned(), pod.to_owned()])?;
        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    /// Runs `command` through `sh -c` in a container of the pod.
    pub fn exec(&self, namespace: &str, pod: &str, container: &str, command: &str) -> Result<String> {
        let mut args = vec![namespace_arg(namespace)];
        args.extend(strings(["exec", pod, "-c", container, "--", "sh", "-c", command]));
        let output = self.run_plain(&args)?;
        Ok(String::from_utf8_lossy(&output).into_owned())
    }
}


#[cfg(test)]
mod tests {
    use super::{fake::FakeCli, *};

    const DEPLOYMENT: &str = "\
kind: Deployment
metadata:
  name: web
  namespace: prod
  generation: 1
spec:
  replicas: 1
status:
  observedGeneration: 1
  updatedReplicas: 1
  availableReplicas: 1
";

    #[test]
    fn context_prefixes_every_command() {
        let args = strings(["get", "pods"]);
        assert_eq!(
            Kubectl::new(Some("staging".to_owned())).command(&args).to_string(),
            "kubectl --context=staging get pods"
        );
        assert_eq!(
            Kubectl::new(Some(String::new())).command(&args).to_string(),
            "kubectl get pods"
        );
        assert_eq!(Kubectl::new(None).command(&args).to_string(), "kubectl get pods");
    }

    #[test]
    fn queries_render_expected_arguments() {
        let cli = FakeCli::new(|_| CliOutput::success(""));
        let cluster = Cluster::new(&cli);
        let selector = ["app=web".to_owned(), "tier=front".to_owned()];

        cluster.apply(Path::new("/tmp/manifest.yaml")).unwrap();
        cluster.rollback("prod", Kind::Deployment, "web").unwrap();
        cluster.namespaces().unwrap();
        cluster.replica_sets("prod", &selector).unwrap();
        cluster.replica_sets("", &[]).unwrap();
        cluster.deployments("prod", &[]).unwrap();
        cluster.pods("prod", &selector[..1]).unwrap();
        cluster.pod_logs("prod", "web-1").unwrap();
        cluster.exec("prod", "web-1", "app", "echo hi").unwrap();

        assert_eq!(
            cli.calls(),
            [
                "apply -f /tmp/manifest.yaml -o name",
                "--namespace=prod rollout undo deployment/web",
                "get namespaces -o yaml",
                "--namespace=prod get replicasets --selector=app=web,tier=front -o yaml",
                "--namespace=default get replicasets -o yaml",
                "--namespace=prod get deployments -o yaml",
                "--namespace=prod get pods --selector=app=web -o yaml",
                "--namespace=prod logs web-1",
                "--namespace=prod exec web-1 -c app -- sh -c echo hi",
            ]
        );
    }

    #[test]
    fn deployment_is_decoded() {
        let cli = FakeCli::new(|_| CliOutput::success(DEPLOYMENT));
        let cluster = Cluster::new(&cli);

        let deployment = cluster.deployment("prod", "web").unwrap().unwrap();
        assert_eq!(deployment.key(), "prod/web");
        assert!(deployment.is_ready());
        assert_eq!(cli.calls(), ["--namespace=prod get deployment/web -o yaml"]);
    }

    #[test]
    fn empty_output_is_no_deployment() {
        let cli = FakeCli::new(|_| CliOutput::success(""));
        assert_eq!(Cluster::new(&cli).deployment("prod", "web").unwrap(), None);
    }

    #[test]
    fn failure_becomes_external_call_error() {
        let cli = FakeCli::new(|_| CliOutput::failure("Error from server (NotFound)\n"));
        let error = Cluster::new(&cli).pod_logs("prod", "web-1").unwrap_err();
        match error {
            Error::ExternalCall { command, output } => {
                assert_eq!(command, "--namespace=prod logs web-1");
                assert_eq!(output, "Error from server (NotFound)");
            }
            error => panic!("unexpected error: {error}"),
        }
    }

    #[test]
    fn unparsable_output_is_parse_error() {
        let cli = FakeCli::new(|_| CliOutput::success("kind: [oops"));
        assert!(matches!(
            Cluster::new(&cli).pods("prod", &[]),
            Err(Error::Parse(_))
        ));
    }
}
