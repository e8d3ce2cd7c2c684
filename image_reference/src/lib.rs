//! Decoder for docker-style image references as they appear in pod templates, e.g.
//!
//! ```txt
//! registry.example.com:80/sample/repository:42
//! <registry------------->/<repository----->:<tag>
//! ```
//!
//! The grammar is deliberately narrower than the one used by the distribution project: only
//! lower-case references are understood, a tag is mandatory and a trailing `@<digest>` is ignored.
//!
//! 1. The `<registry>` prefix is only looked for when the reference contains more than one `:` or at
//!    least one `/`. It matches `host-label(.host-label)*(:port)?`.
//! 2. The `<repository>` is matched greedily as `/?segment(/segment)*`, a segment being
//!    `[a-z0-9._-]+`.
//! 3. The `<tag>` follows as `:[a-z0-9._-]+`. Anything after the tag is discarded.

use std::{
    fmt::{self, Write as _},
    str::FromStr,
    sync::LazyLock,
};

#[cfg(feature = "serde")]
use ::serde::{Deserialize, Deserializer, Serialize, Serializer};
use regex::Regex;

const REGISTRY_SUFFIX: char = '/';
const TAG_PREFIX: char = ':';

#[derive(Debug, PartialEq, Eq)]
pub struct InvalidFormat(String);

impl InvalidFormat {
    /// The reference that failed to decode.
    pub fn reference(&self) -> &str {
        &self.0
    }
}

impl std::error::Error for InvalidFormat {}

impl fmt::Display for InvalidFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid repository format: {:?}", self.0)
    }
}

static REGISTRY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_-]+(?:\.[a-z0-9_-]+)*(?::[0-9]+)?").unwrap());

static REPOSITORY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/?([a-z0-9._-]+(?:/[a-z0-9._-]+)*)").unwrap());

static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^:([a-z0-9._-]+)").unwrap());

/// A decoded image reference. The `registry_url` is empty when the reference does not name a
/// registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    pub repository: String,
    pub tag: String,
    pub registry_url: String,
}

impl ImageReference {
    pub fn decode(reference: &str) -> Result<Self, InvalidFormat> {
        let invalid = || InvalidFormat(reference.to_owned());

        let mut rest = reference;

        let has_registry = rest.matches(':').count() > 1 || rest.contains('/');
        let registry_url = if has_registry {
            let registry = REGISTRY_REGEX.find(rest).map_or("", |m| m.as_str());
            rest = &rest[registry.len()..];
            registry
        } else {
            ""
        };

        let (repository, consumed) = REPOSITORY_REGEX
            .captures(rest)
            .and_then(|captures| Some((captures.get(1)?.as_str(), captures.get(0)?.end())))
            .ok_or_else(invalid)?;
        rest = &rest[consumed..];

        // NOTE: Whatever follows the tag, typically `@sha256:...`, is dropped.
        let tag = TAG_REGEX
            .captures(rest)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str())
            .ok_or_else(invalid)?;

        Ok(Self {
            repository: repository.to_owned(),
            tag: tag.to_owned(),
            registry_url: registry_url.to_owned(),
        })
    }

    /// Returns the registry, `None` if the reference did not name one.
    pub fn registry(&self) -> Option<&str> {
        (!self.registry_url.is_empty()).then_some(self.registry_url.as_str())
    }
}

impl FromStr for ImageReference {
    type Err = InvalidFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl TryFrom<&str> for ImageReference {
    type Error = InvalidFormat;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::decode(value)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = self.registry() {
            f.write_str(registry)?;
            f.write_char(REGISTRY_SUFFIX)?;
        }
        f.write_str(&self.repository)?;
        f.write_char(TAG_PREFIX)?;
        f.write_str(&self.tag)
    }
}

#[cfg(feature = "serde")]
impl Serialize for ImageReference {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for ImageReference {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: std::borrow::Cow<'de, str> = Deserialize::deserialize(deserializer)?;
        Self::decode(&value).map_err(::serde::de::Error::custom)
    }
}
