use crate::error::{Error, Result};

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

// safe unwrap: constant pattern
static DOCKER_IMAGE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)/(.*?):([^:]+)$").unwrap());

/// Image reference split into the parts needed to query a Docker v2 registry.
///
/// The registry is everything before the first `/`, so images without an explicit
/// registry host (e.g. `library/nginx:1.27`) are treated as hosted on `library`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

impl ImageReference {
    pub fn parse(image: &str) -> Result<Self> {
        let captures = DOCKER_IMAGE_REGEX.captures(image).ok_or_else(|| {
            Error::ParseError(format!("Docker image name regexp failed for '{image}'"))
        })?;

        Ok(Self {
            registry: captures[1].to_string(),
            repository: captures[2].to_string(),
            tag: captures[3].to_string(),
        })
    }

    /// Reference pinned to `digest`, e.g. `registry:5000/team/app@sha256:...`
    pub fn with_digest(&self, digest: &str) -> String {
        format!("{}/{}@{}", self.registry, self.repository, digest)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}
