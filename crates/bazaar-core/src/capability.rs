//! Capability tags and the allow-list they are validated against.
//!
//! Bots advertise free-form tags such as `ai-news` or `finance-data`. At the
//! registry boundary a tag becomes a [`Capability`]: trimmed, lowercased, and
//! checked against a fixed character set. Matching is exact tag equality.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CapabilityError;

/// Regex for valid capability tags (lowercase alphanumerics, dots, hyphens, underscores).
static CAPABILITY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9._-]{0,62}$").unwrap_or_else(|_| unreachable!())
});

/// A validated capability tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Capability(String);

impl Capability {
    /// Parses and normalizes a capability tag.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Invalid`] if the normalized tag is empty,
    /// longer than 63 characters, or contains disallowed characters.
    pub fn new(tag: impl AsRef<str>) -> Result<Self, CapabilityError> {
        let normalized = tag.as_ref().trim().to_lowercase();
        if CAPABILITY_REGEX.is_match(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(CapabilityError::Invalid(tag.as_ref().to_string()))
        }
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Capability {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Capability {
    type Error = CapabilityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Capability> for String {
    fn from(value: Capability) -> Self {
        value.0
    }
}

/// Allow-list of capability tags accepted by a registry.
///
/// An empty catalog is open: every well-formed tag is accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityCatalog {
    allowed: BTreeSet<Capability>,
}

impl CapabilityCatalog {
    /// Creates an open catalog.
    #[must_use]
    pub fn open() -> Self {
        Self::default()
    }

    /// Creates a catalog restricted to the given tags.
    ///
    /// # Errors
    ///
    /// Returns an error if any tag is malformed.
    pub fn from_tags<I, S>(tags: I) -> Result<Self, CapabilityError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = tags
            .into_iter()
            .map(Capability::new)
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { allowed })
    }

    /// Returns true if the catalog accepts every well-formed tag.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Returns true if the capability is accepted.
    #[must_use]
    pub fn allows(&self, capability: &Capability) -> bool {
        self.is_open() || self.allowed.contains(capability)
    }

    /// Checks a capability against the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::NotAllowed`] if the tag is not listed.
    pub fn check(&self, capability: &Capability) -> Result<(), CapabilityError> {
        if self.allows(capability) {
            Ok(())
        } else {
            Err(CapabilityError::NotAllowed(capability.to_string()))
        }
    }

    /// Parses a raw tag and checks it in one step.
    ///
    /// # Errors
    ///
    /// Returns an error if the tag is malformed or not allowed.
    pub fn parse(&self, tag: &str) -> Result<Capability, CapabilityError> {
        let capability = Capability::new(tag)?;
        self.check(&capability)?;
        Ok(capability)
    }

    /// Iterates over the listed tags.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.allowed.iter()
    }
}
