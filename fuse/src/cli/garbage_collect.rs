use std::time::Duration;

use clap::Args;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use constcat::concat;
use itertools::Itertools;
use log::info;

use super::Result;
use crate::{
    cancel::CancellationToken,
    config::{Config, DELETE_DELAY},
    garbage::{self, GarbageDetectInfo},
    kubectl::{Cluster, ClusterCli, DEFAULT_NAMESPACE},
    registry::{HttpRegistry, Registry},
    Error,
};

const REGISTRY_URL_FLAG: &str = "registry-url";

const MISSING_REGISTRY_URL: &str = concat!(REGISTRY_URL_FLAG, " is a mandatory parameter");

#[derive(Debug, Args)]
pub struct GarbageCollectArgs {
    /// Registry URL to use, e.g. `https://example.com:5000/`
    #[arg(long = REGISTRY_URL_FLAG, short = 'r')]
    pub registry_url: Option<String>,

    /// Namespace to list ReplicaSets in
    #[arg(long = "namespace", short = 'n', default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Report the garbage without deleting anything
    #[arg(long = "dry-run", short = 'd')]
    pub dry_run: bool,

    /// Skip repositories that cannot be found in the registry instead of failing
    #[arg(long = "ignore-missing", short = 'i')]
    pub ignore_missing: bool,

    /// Tag protecting the images it points at, can be repeated
    #[arg(long = "keep-tag", short = 'k')]
    pub keep_tags: Vec<String>,
}

pub fn garbage_collect(
    config: &Config,
    args: GarbageCollectArgs,
    token: &CancellationToken,
) -> Result<()> {
    let registry_url = args
        .registry_url
        .as_deref()
        .filter(|url| !url.is_empty())
        .ok_or_else(|| Error::Validation(MISSING_REGISTRY_URL.to_owned()))?;
    let registry = HttpRegistry::new(registry_url)?;
    registry.ping()?;

    collect(&config.kubectl(), &registry, &args, token, DELETE_DELAY)?;
    Ok(())
}

/// Detects the garbage of the images deployed in `args.namespace` and deletes it unless running
/// dry. Returns the number of deleted digests.
fn collect(
    cli: &dyn ClusterCli,
    registry: &dyn Registry,
    args: &GarbageCollectArgs,
    token: &CancellationToken,
    delay: Duration,
) -> Result<usize> {
    let GarbageCollectArgs {
        namespace,
        dry_run,
        ignore_missing,
        keep_tags,
        ..
    } = args;

    info!("Using namespace {namespace}");
    let replica_sets = Cluster::new(cli).replica_sets(namespace, &[])?;
    info!("Found {} ReplicaSets", replica_sets.len());

    let images: Vec<&str> = replica_sets
        .iter()
        .flat_map(|replica_set| replica_set.images())
        .collect();

    info!("Detecting garbage, dry-run is {dry_run}");
    let info = garbage::detect(&images, keep_tags, registry, *ignore_missing)?;
    println!("{}", report(&info));

    if *dry_run {
        info!(
            "Dry run, keeping {} garbage digest(s)",
            info.garbage_digest_count()
        );
        return Ok(0);
    }

    info!("Deleting garbage...");
    let deleted = garbage::delete(&info, registry, token, delay)?;
    info!("Deleted {deleted} digest(s)");
    Ok(deleted)
}

fn report(info: &GarbageDetectInfo) -> Table {
    let mut table = Table::new();
    table
        .load_preset(comfy_table::presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            ["repository", "deployed tags", "garbage tags", "garbage digests"]
                .into_iter()
                .map(|name| Cell::new(name).add_attribute(Attribute::Bold)),
        );

    for item in &info.items {
        table.add_row([
            item.repository.clone(),
            item.deployed_tags.iter().join(", "),
            item.garbage_tags.iter().join(", "),
            item.garbage_digests.iter().join("\n"),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::{
        garbage::GarbageDetectItem,
        kubectl::{fake::FakeCli, CliOutput},
        registry::ImageDigest,
    };

    const REPLICA_SETS: &str = "\
kind: List
items:
- kind: ReplicaSet
  metadata:
    name: web-1
  spec:
    template:
      spec:
        containers:
        - name: app
          image: example.com:5000/sample/repo1:3
- kind: ReplicaSet
  metadata:
    name: web-2
  spec:
    template:
      spec:
        containers:
        - name: app
          image: example.com:5000/sample/repo1:4
";

    /// Serves the digests of `sample/repo1` and records deletions.
    #[derive(Default)]
    struct SampleRegistry {
        deleted: RefCell<Vec<String>>,
    }

    impl Registry for SampleRegistry {
        fn image_digest_list(&self, repository: &str) -> crate::Result<Vec<ImageDigest>> {
            let digest = |name: &str, tags: &[&str]| ImageDigest {
                name: name.to_owned(),
                path: repository.to_owned(),
                tags: tags.iter().map(|tag| (*tag).to_owned()).collect(),
            };
            match repository {
                "sample/repo1" => Ok(vec![
                    digest("sha256:repo1-1", &["3"]),
                    digest("sha256:repo1-2", &["4"]),
                    digest("sha256:repo1-3", &["5"]),
                    digest("sha256:repo1-4", &["6", "latest"]),
                ]),
                _ => Err(Error::Registry("call failed".to_owned())),
            }
        }

        fn delete_image_digest(&self, repository: &str, digest: &str) -> crate::Result<()> {
            self.deleted
                .borrow_mut()
                .push(format!("{repository}@{digest}"));
            Ok(())
        }
    }

    fn args(dry_run: bool) -> GarbageCollectArgs {
        GarbageCollectArgs {
            registry_url: None,
            namespace: "prod".to_owned(),
            dry_run,
            ignore_missing: false,
            keep_tags: Vec::new(),
        }
    }

    fn replica_set_cli() -> FakeCli {
        FakeCli::new(|_| CliOutput::success(REPLICA_SETS))
    }

    #[test]
    fn report_lists_every_repository() {
        let info = GarbageDetectInfo {
            items: vec![
                GarbageDetectItem {
                    repository: "sample/repo1".to_owned(),
                    deployed_tags: vec!["3".to_owned(), "4".to_owned()],
                    garbage_digests: vec!["sha256:repo1-3".to_owned()],
                    garbage_tags: vec!["5".to_owned(), "latest".to_owned()],
                },
                GarbageDetectItem {
                    repository: "sample/repo2".to_owned(),
                    deployed_tags: vec!["v26".to_owned()],
                    ..Default::default()
                },
            ],
        };

        let rendered = report(&info).to_string();
        assert!(rendered.contains("sample/repo1"));
        assert!(rendered.contains("3, 4"));
        assert!(rendered.contains("5, latest"));
        assert!(rendered.contains("sha256:repo1-3"));
        assert!(rendered.contains("sample/repo2"));
    }

    #[test]
    fn missing_registry_url_is_rejected() {
        let args = GarbageCollectArgs {
            registry_url: Some(String::new()),
            namespace: DEFAULT_NAMESPACE.to_owned(),
            dry_run: true,
            ignore_missing: false,
            keep_tags: Vec::new(),
        };
        let error = garbage_collect(&Config::new(None), args, &CancellationToken::new())
            .unwrap_err();
        assert_eq!(error.to_string(), "registry-url is a mandatory parameter");
    }

    #[test]
    fn dry_run_detects_without_deleting() {
        let cli = replica_set_cli();
        let registry = SampleRegistry::default();

        let deleted = collect(
            &cli,
            &registry,
            &args(true),
            &CancellationToken::new(),
            Duration::ZERO,
        )
        .unwrap();

        assert_eq!(deleted, 0);
        assert!(registry.deleted.borrow().is_empty());
        assert_eq!(cli.calls(), ["--namespace=prod get replicasets -o yaml"]);
    }

    #[test]
    fn collection_deletes_every_garbage_digest() {
        let cli = replica_set_cli();
        let registry = SampleRegistry::default();

        let deleted = collect(
            &cli,
            &registry,
            &args(false),
            &CancellationToken::new(),
            Duration::ZERO,
        )
        .unwrap();

        assert_eq!(deleted, 2);
        assert_eq!(
            *registry.deleted.borrow(),
            ["sample/repo1@sha256:repo1-3", "sample/repo1@sha256:repo1-4"]
        );
    }

    #[test]
    fn kept_tags_survive_collection() {
        let registry = SampleRegistry::default();
        let args = GarbageCollectArgs {
            keep_tags: vec!["latest".to_owned()],
            ..args(false)
        };

        let deleted = collect(
            &replica_set_cli(),
            &registry,
            &args,
            &CancellationToken::new(),
            Duration::ZERO,
        )
        .unwrap();

        assert_eq!(deleted, 1);
        assert_eq!(*registry.deleted.borrow(), ["sample/repo1@sha256:repo1-3"]);
    }

    #[test]
    fn failed_listing_deletes_nothing() {
        let cli = FakeCli::new(|_| CliOutput::failure("connection refused"));
        let registry = SampleRegistry::default();

        assert!(collect(
            &cli,
            &registry,
            &args(false),
            &CancellationToken::new(),
            Duration::ZERO,
        )
        .is_err());
        assert!(registry.deleted.borrow().is_empty());
    }
}
