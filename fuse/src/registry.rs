use std::time::Duration;

use log::debug;
use reqwest::{blocking::Client, header, StatusCode};
use serde::Deserialize;

use crate::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const DIGEST_HEADER: &str = "Docker-Content-Digest";

// The registry only reports the digest of manifest types the client declares to accept.
const ACCEPTABLE_MANIFEST_TYPES: &[&str] = &[
    "application/vnd.docker.distribution.manifest.v2+json",
    "application/vnd.docker.distribution.manifest.list.v2+json",
    "application/vnd.oci.image.manifest.v1+json",
    "application/vnd.oci.image.index.v1+json",
];

/// A manifest stored in a repository together with all tags pointing at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDigest {
    /// The digest, e.g. `sha256:...`.
    pub name: String,
    /// The repository the registry reported the digest for.
    pub path: String,
    pub tags: Vec<String>,
}

pub trait Registry {
    /// Lists the digests of `repository`, each with the tags that reference it.
    fn image_digest_list(&self, repository: &str) -> Result<Vec<ImageDigest>>;

    fn delete_image_digest(&self, repository: &str, digest: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct TagList {
    name: String,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Client for the [Docker Registry HTTP API V2](https://distribution.github.io/distribution/spec/api/).
pub struct HttpRegistry {
    client: Client,
    base_url: String,
}

impl HttpRegistry {
    /// `url` is the registry root such as `https://example.com:5000/`. Without a scheme, `https`
    /// is assumed.
    pub fn new(url: &str) -> Result<Self> {
        let url = url.trim_end_matches('/');
        let base_url = if url.contains("://") {
            url.to_owned()
        } else {
            format!("https://{url}")
        };
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Checks that the URL points at a registry by requesting the API root.
    pub fn ping(&self) -> Result<()> {
        let url = format!("{}/v2/", self.base_url);
        let invalid = || {
            Error::Validation(format!(
                "request to {url} failed, is the URL pointing to a Docker registry?"
            ))
        };

        debug!("GET {url}");
        match self.client.get(&url).send() {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => {
                debug!("GET {url} returned {}", response.status());
                Err(invalid())
            }
            Err(error) => {
                debug!("GET {url} failed: {error}");
                Err(invalid())
            }
        }
    }

    fn tags(&self, repository: &str) -> Result<TagList> {
        let url = format!("{}/v2/{repository}/tags/list", self.base_url);
        debug!("GET {url}");
        let response = self.client.get(&url).send()?;
        match response.status() {
            status if status.is_success() => Ok(response.json()?),
            status => Err(Error::Registry(format!(
                "listing tags of {repository} returned {status}"
            ))),
        }
    }

    fn digest(&self, repository: &str, tag: &str) -> Result<String> {
        let url = format!("{}/v2/{repository}/manifests/{tag}", self.base_url);
        debug!("HEAD {url}");
        let response = self
            .client
            .head(&url)
            .header(header::ACCEPT, ACCEPTABLE_MANIFEST_TYPES.join(","))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Registry(format!(
                "resolving {repository}:{tag} returned {status}"
            )));
        }

        response
            .headers()
            .get(DIGEST_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| {
                Error::Registry(format!(
                    "resolving {repository}:{tag} did not return a {DIGEST_HEADER} header"
                ))
            })
    }
}

impl Registry for HttpRegistry {
    fn image_digest_list(&self, repository: &str) -> Result<Vec<ImageDigest>> {
        let TagList { name, tags } = self.tags(repository)?;

        let mut digests: Vec<ImageDigest> = Vec::new();
        for tag in tags.unwrap_or_default() {
            let digest = self.digest(repository, &tag)?;
            match digests.iter_mut().find(|known| known.name == digest) {
                Some(known) => known.tags.push(tag),
                None => digests.push(ImageDigest {
                    name: digest,
                    path: name.clone(),
                    tags: vec![tag],
                }),
            }
        }
        Ok(digests)
    }

    fn delete_image_digest(&self, repository: &str, digest: &str) -> Result<()> {
        let url = format!("{}/v2/{repository}/manifests/{digest}", self.base_url);
        debug!("DELETE {url}");
        let response = self.client.delete(&url).send()?;
        match response.status() {
            StatusCode::ACCEPTED | StatusCode::OK => Ok(()),
            status => Err(Error::Registry(format!(
                "deleting {repository}@{digest} returned {status}"
            ))),
        }
    }
}
