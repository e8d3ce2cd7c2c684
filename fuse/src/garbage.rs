//! Finds registry manifests that no ReplicaSet references anymore.

use std::time::Duration;

use image_reference::ImageReference;
use itertools::Itertools;
use log::{info, warn};

use crate::{
    cancel::CancellationToken,
    registry::{ImageDigest, Registry},
    Error, Result,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GarbageDetectItem {
    pub repository: String,
    pub deployed_tags: Vec<String>,
    pub garbage_digests: Vec<String>,
    pub garbage_tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GarbageDetectInfo {
    pub items: Vec<GarbageDetectItem>,
}

impl GarbageDetectInfo {
    pub fn garbage_digest_count(&self) -> usize {
        self.items.iter().map(|item| item.garbage_digests.len()).sum()
    }
}

/// Removes duplicates while keeping the first occurrence of every value in place.
pub fn unique<T: AsRef<str>>(values: &[T]) -> Vec<&str> {
    values.iter().map(|value| value.as_ref()).unique().collect()
}

/// Fetches the digests of `repository`, or the reason why they cannot be used.
fn usable_digests(registry: &dyn Registry, repository: &str) -> Result<Vec<ImageDigest>, String> {
    let digests = registry
        .image_digest_list(repository)
        .map_err(|error| error.to_string())?;

    // A registry answering for another repository is as good as no answer.
    if let Some(digest) = digests.iter().find(|digest| digest.path != repository) {
        return Err(format!("registry answered for {:?}", digest.path));
    }
    Ok(digests)
}

/// Detects, for every repository referenced by `deployed`, the digests none of whose tags is
/// deployed or listed in `keep_tags`.
///
/// A repository whose digests cannot be fetched fails the detection, unless `ignore_missing` is
/// set in which case it is reported without garbage.
pub fn detect<T: AsRef<str>>(
    deployed: &[T],
    keep_tags: &[String],
    registry: &dyn Registry,
    ignore_missing: bool,
) -> Result<GarbageDetectInfo> {
    let references = unique(deployed)
        .into_iter()
        .map(ImageReference::decode)
        .collect::<Result<Vec<_>, _>>()?;

    let mut items: Vec<GarbageDetectItem> = Vec::new();
    for ImageReference {
        repository, tag, ..
    } in references
    {
        match items.iter_mut().find(|item| item.repository == repository) {
            Some(item) => item.deployed_tags.push(tag),
            None => items.push(GarbageDetectItem {
                repository,
                deployed_tags: vec![tag],
                ..Default::default()
            }),
        }
    }

    for item in &mut items {
        let digests = match usable_digests(registry, &item.repository) {
            Ok(digests) => digests,
            Err(reason) if ignore_missing => {
                warn!("Skipping repository {}: {reason}", item.repository);
                continue;
            }
            Err(reason) => {
                return Err(Error::UnknownImage {
                    repository: item.repository.clone(),
                    reason,
                })
            }
        };

        for ImageDigest { name, tags, .. } in digests {
            let is_used = tags
                .iter()
                .any(|tag| item.deployed_tags.contains(tag) || keep_tags.contains(tag));
            if !is_used {
                item.garbage_digests.push(name);
                item.garbage_tags.extend(tags);
            }
        }
    }

    Ok(GarbageDetectInfo { items })
}

/// Deletes every garbage digest, waiting `delay` after each deletion to not overload the
/// registry. Stops at the first failure. Returns the number of deleted digests.
pub fn delete(
    info: &GarbageDetectInfo,
    registry: &dyn Registry,
    token: &CancellationToken,
    delay: Duration,
) -> Result<usize> {
    let mut deleted = 0;
    for item in &info.items {
        for digest in &item.garbage_digests {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            registry.delete_image_digest(&item.repository, digest)?;
            info!("Deleted {}@{digest}", item.repository);
            deleted += 1;
            token.sleep(delay)?;
        }
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::HashMap};

    use super::*;

    #[derive(Default)]
    struct FakeRegistry {
        digests: HashMap<String, Vec<ImageDigest>>,
        deleted: RefCell<Vec<String>>,
        fail_deletion_of: Option<String>,
    }

    impl FakeRegistry {
        fn with(mut self, repository: &str, digests: &[(&str, &[&str])]) -> Self {
            self.digests.insert(
                repository.to_owned(),
                digests
                    .iter()
                    .map(|(name, tags)| ImageDigest {
                        name: (*name).to_owned(),
                        path: repository.to_owned(),
                        tags: tags.iter().map(|tag| (*tag).to_owned()).collect(),
                    })
                    .collect(),
            );
            self
        }
    }

    impl Registry for FakeRegistry {
        fn image_digest_list(&self, repository: &str) -> Result<Vec<ImageDigest>> {
            self.digests
                .get(repository)
                .cloned()
                .ok_or_else(|| Error::Registry("call failed".to_owned()))
        }

        fn delete_image_digest(&self, repository: &str, digest: &str) -> Result<()> {
            if self.fail_deletion_of.as_deref() == Some(digest) {
                return Err(Error::Registry("deletion failed".to_owned()));
            }
            self.deleted
                .borrow_mut()
                .push(format!("{repository}@{digest}"));
            Ok(())
        }
    }

    fn sample_registry() -> FakeRegistry {
        FakeRegistry::default()
            .with(
                "sample/repo1",
                &[
                    ("sha256:repo1-1", &["3"]),
                    ("sha256:repo1-2", &["4"]),
                    ("sha256:repo1-3", &["5", "latest"]),
                ],
            )
            .with(
                "sample/repo2",
                &[
                    ("sha256:repo2-1", &["v26"]),
                    ("sha256:repo2-2", &["v27"]),
                    ("sha256:repo2-3", &["v28", "latest"]),
                ],
            )
    }

    const DEPLOYED: &[&str] = &[
        "example.com:5000/sample/repo1:3",
        "example.com:5000/sample/repo1:4",
        "example.com:5000/sample/repo1:4",
        "example.com:5000/sample/repo2:v26",
        "example.com:5000/sample/repo2:v27",
    ];

    #[test]
    fn unique_keeps_first_occurrence() {
        assert_eq!(unique(&["1", "1", "2", "1", "3"]), ["1", "2", "3"]);
        assert!(unique::<&str>(&[]).is_empty());
    }

    #[test]
    fn detects_unreferenced_digests() {
        let info = detect(DEPLOYED, &[], &sample_registry(), false).unwrap();

        assert_eq!(
            info.items,
            [
                GarbageDetectItem {
                    repository: "sample/repo1".to_owned(),
                    deployed_tags: vec!["3".to_owned(), "4".to_owned()],
                    garbage_digests: vec!["sha256:repo1-3".to_owned()],
                    garbage_tags: vec!["5".to_owned(), "latest".to_owned()],
                },
                GarbageDetectItem {
                    repository: "sample/repo2".to_owned(),
                    deployed_tags: vec!["v26".to_owned(), "v27".to_owned()],
                    garbage_digests: vec!["sha256:repo2-3".to_owned()],
                    garbage_tags: vec!["v28".to_owned(), "latest".to_owned()],
                },
            ]
        );
        assert_eq!(info.garbage_digest_count(), 2);
    }

    #[test]
    fn kept_tags_protect_digests() {
        let info = detect(
            &DEPLOYED[..2],
            &["latest".to_owned()],
            &sample_registry(),
            false,
        )
        .unwrap();

        assert_eq!(info.items.len(), 1);
        assert_eq!(info.items[0].deployed_tags, ["3", "4"]);
        assert!(info.items[0].garbage_digests.is_empty());
        assert!(info.items[0].garbage_tags.is_empty());
    }

    #[test]
    fn failed_fetch_is_fatal() {
        let deployed = ["example.com:5000/sample/repo:latest"];
        let error = detect(&deployed, &[], &sample_registry(), false).unwrap_err();
        assert!(matches!(
            error,
            Error::UnknownImage { ref repository, .. } if repository == "sample/repo"
        ));
    }

    #[test]
    fn failed_fetch_is_skipped_when_ignoring_missing() {
        let deployed = ["example.com:5000/sample/repo:latest"];
        let info = detect(&deployed, &[], &sample_registry(), true).unwrap();

        assert_eq!(
            info.items,
            [GarbageDetectItem {
                repository: "sample/repo".to_owned(),
                deployed_tags: vec!["latest".to_owned()],
                ..Default::default()
            }]
        );
    }

    #[test]
    fn foreign_path_is_unknown_image() {
        let mut registry = FakeRegistry::default();
        registry.digests.insert(
            "sample/unknown-repo".to_owned(),
            vec![ImageDigest {
                name: "sha256:other".to_owned(),
                path: "sample/other-repo".to_owned(),
                tags: vec!["latest".to_owned()],
            }],
        );
        let deployed = ["example.com:5000/sample/unknown-repo:latest"];

        assert!(matches!(
            detect(&deployed, &[], &registry, false),
            Err(Error::UnknownImage { .. })
        ));

        let info = detect(&deployed, &[], &registry, true).unwrap();
        assert_eq!(info.items.len(), 1);
        assert!(info.items[0].garbage_digests.is_empty());
    }

    #[test]
    fn invalid_reference_aborts_detection() {
        let deployed = ["example.com:5000/sample/repo1:3", "test:5000/repo"];
        assert!(matches!(
            detect(&deployed, &[], &sample_registry(), true),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn deletes_every_garbage_digest() {
        let registry = sample_registry();
        let info = detect(DEPLOYED, &[], &registry, false).unwrap();

        let deleted = delete(&info, &registry, &CancellationToken::new(), Duration::ZERO).unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(
            *registry.deleted.borrow(),
            ["sample/repo1@sha256:repo1-3", "sample/repo2@sha256:repo2-3"]
        );
    }

    #[test]
    fn deletion_stops_at_first_failure() {
        let mut registry = sample_registry();
        let info = detect(DEPLOYED, &[], &registry, false).unwrap();
        registry.fail_deletion_of = Some("sha256:repo1-3".to_owned());

        assert!(delete(&info, &registry, &CancellationToken::new(), Duration::ZERO).is_err());
        assert!(registry.deleted.borrow().is_empty());
    }

    #[test]
    fn cancelled_deletion_deletes_nothing() {
        let registry = sample_registry();
        let info = detect(DEPLOYED, &[], &registry, false).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        assert!(matches!(
            delete(&info, &registry, &token, Duration::ZERO),
            Err(Error::Cancelled)
        ));
        assert!(registry.deleted.borrow().is_empty());
    }
}
