use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named update track controlling which releases are eligible and how strict
/// signature checking is.
///
/// `None` and `Develop` never poll the release API; `Develop` expects local,
/// usually unsigned builds dropped into the data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateChannel {
    None,
    Develop,
    Prerelease,
    #[default]
    #[serde(alias = "stable")]
    Release,
}

impl UpdateChannel {
    /// Whether this channel queries the remote release API.
    #[must_use]
    pub const fn polls_releases(self) -> bool {
        matches!(self, Self::Prerelease | Self::Release)
    }

    /// Whether releases flagged as prerelease are eligible.
    #[must_use]
    pub const fn accepts_prerelease(self) -> bool {
        matches!(self, Self::Prerelease)
    }

    /// Whether an installed binary must carry a valid detached signature.
    ///
    /// Unsigned binaries are only accepted on `Develop`.
    #[must_use]
    pub const fn requires_signature(self) -> bool {
        !matches!(self, Self::Develop)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Develop => "develop",
            Self::Prerelease => "prerelease",
            Self::Release => "release",
        }
    }
}

impl fmt::Display for UpdateChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "develop" => Ok(Self::Develop),
            "prerelease" => Ok(Self::Prerelease),
            "release" | "stable" => Ok(Self::Release),
            other => Err(format!(
                "unknown update channel '{other}' (expected none, develop, prerelease or release)"
            )),
        }
    }
}
