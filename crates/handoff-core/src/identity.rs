//! Application identity.
//!
//! Every app on the device is addressed by its package name, a reverse-DNS
//! string such as `com.example.mail`. Trust decisions are made against the
//! package name the transport attests for the sender, never against anything
//! the payload claims about itself.

use crate::envelope::{Envelope, SRC_APP_PACKAGE_NAME};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A validated application package name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageName(String);

impl PackageName {
    /// The package name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the dot-separated segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PackageName {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(IdentityParseError::Empty);
        }
        for segment in s.split('.') {
            if segment.is_empty() {
                return Err(IdentityParseError::EmptySegment(s.to_string()));
            }
            if let Some(c) = segment
                .chars()
                .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
            {
                return Err(IdentityParseError::InvalidChar(c, s.to_string()));
            }
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for PackageName {
    type Error = IdentityParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<&str> for PackageName {
    type Error = IdentityParseError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PackageName> for String {
    fn from(name: PackageName) -> Self {
        name.0
    }
}

/// Error parsing a package name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityParseError {
    #[error("package name cannot be empty")]
    Empty,
    #[error("package name has an empty segment: {0}")]
    EmptySegment(String),
    #[error("invalid character {0:?} in package name: {1}")]
    InvalidChar(char, String),
}

/// Decides who actually sent an inbound envelope.
///
/// The transport hands over the sender identity it observed; an implementation
/// returns the identity it is willing to vouch for, or `None` to have the
/// envelope dropped. Platforms with OS-mediated sender identity use
/// [`TransportAttested`]; other transports can plug in their own guarantee.
pub trait SenderIdentityVerifier: Send + Sync {
    fn verified_sender(
        &self,
        envelope: &Envelope,
        transport_source: &PackageName,
    ) -> Option<PackageName>;
}

/// Trusts the transport-observed sender.
///
/// The `src_app_package_name` hint, when present, must agree with what the
/// transport saw; a mismatch means someone is forging the hint.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportAttested;

impl SenderIdentityVerifier for TransportAttested {
    fn verified_sender(
        &self,
        envelope: &Envelope,
        transport_source: &PackageName,
    ) -> Option<PackageName> {
        match envelope.extra(SRC_APP_PACKAGE_NAME) {
            Some(hint) if hint != transport_source.as_str() => None,
            _ => Some(transport_source.clone()),
        }
    }
}
