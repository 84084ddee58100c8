//! Where the state and its detached digest live.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

/// Policy oracle for state locations consumed by the verifying loader.
pub trait ConfigurationLocationFinder: Send + Sync {
    /// Locator of the signed state document.
    fn state(&self) -> &str;

    /// Whether the digest is stored inside the state document.
    fn state_digest_belongs_to_state(&self) -> bool;

    /// Locator of the detached digest resource.
    fn state_digest(&self) -> &str;
}

/// Where the digest of a state document is stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestPlacement {
    /// `digest` key next to `data` and `nonce`.
    #[default]
    Inline,
    /// Separate `{digest}` resource.
    Detached,
}

impl FromStr for DigestPlacement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(Self::Inline),
            "detached" => Ok(Self::Detached),
            other => Err(format!(
                "unknown digest placement '{}' (expected 'inline' or 'detached')",
                other
            )),
        }
    }
}

impl fmt::Display for DigestPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline => f.write_str("inline"),
            Self::Detached => f.write_str("detached"),
        }
    }
}

/// Fixed state and digest locators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLocations {
    state: String,
    state_digest: String,
    placement: DigestPlacement,
}

impl StateLocations {
    /// Locations for `state`, with the digest next to it as `<stem>.digest.json`.
    pub fn new(state: impl Into<String>, placement: DigestPlacement) -> Self {
        let state = state.into();
        let state_digest = default_digest_locator(&state);
        Self {
            state,
            state_digest,
            placement,
        }
    }

    /// Override the detached digest locator.
    pub fn with_digest_locator(mut self, locator: impl Into<String>) -> Self {
        self.state_digest = locator.into();
        self
    }

    pub fn placement(&self) -> DigestPlacement {
        self.placement
    }
}

impl ConfigurationLocationFinder for StateLocations {
    fn state(&self) -> &str {
        &self.state
    }

    fn state_digest_belongs_to_state(&self) -> bool {
        self.placement == DigestPlacement::Inline
    }

    fn state_digest(&self) -> &str {
        &self.state_digest
    }
}

/// `<dir>/<stem>.digest.json` for a path or an HTTP(S) URL.
pub fn default_digest_locator(state: &str) -> String {
    if let Ok(mut url) = Url::parse(state) {
        if matches!(url.scheme(), "http" | "https") {
            let path = url.path().to_string();
            let (dir, file) = path.rsplit_once('/').unwrap_or(("", path.as_str()));
            let stem = file.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(file);
            let stem = if stem.is_empty() { "state" } else { stem };
            url.set_path(&format!("{}/{}.digest.json", dir, stem));
            url.set_query(None);
            url.set_fragment(None);
            return url.to_string();
        }
    }

    let path = Path::new(state);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("state");
    path.with_file_name(format!("{}.digest.json", stem))
        .to_string_lossy()
        .into_owned()
}
