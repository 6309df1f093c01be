//! Ready-made access policies.
//!
//! [`BandGrants`] answers "may this user touch this band", keyed by the
//! `user` carried on each request. [`Restrict`] ignores the user entirely
//! and limits a Transporter to the bands it is configured to exchange.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use transporter_core::{Result, Subject, TransportError};

use crate::access::AccessPolicy;

/// Which bands a grant covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandScope {
    /// Every band, and the Thing as a whole.
    All,

    /// Only the named bands.
    Only(BTreeSet<String>),
}

impl BandScope {
    pub fn only<I, S>(bands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BandScope::Only(bands.into_iter().map(Into::into).collect())
    }

    /// Check a band. `None` addresses the whole Thing, which only
    /// [`BandScope::All`] covers.
    pub fn allows(&self, band: Option<&str>) -> bool {
        match self {
            BandScope::All => true,
            BandScope::Only(bands) => band.is_some_and(|band| bands.contains(band)),
        }
    }
}

/// What one principal may do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<BandScope>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write: Option<BandScope>,
}

/// Per-user band permissions.
///
/// Requests without a `user` fall back to the anonymous grant. Anyone
/// without a grant is refused with `NotAuthorized`.
///
/// Reading at the Thing level (`list`, `bands`) needs any read grant; the
/// per-band checks then decide what is visible. Deleting a Thing needs a
/// write grant over [`BandScope::All`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BandGrants {
    #[serde(default)]
    users: HashMap<String, Grant>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    anonymous: Option<Grant>,
}

impl BandGrants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant_read(mut self, user: impl Into<String>, scope: BandScope) -> Self {
        self.users.entry(user.into()).or_default().read = Some(scope);
        self
    }

    pub fn grant_write(mut self, user: impl Into<String>, scope: BandScope) -> Self {
        self.users.entry(user.into()).or_default().write = Some(scope);
        self
    }

    /// Grant for requests that carry no user.
    pub fn anonymous(mut self, grant: Grant) -> Self {
        self.anonymous = Some(grant);
        self
    }

    /// Drop everything granted to `user`.
    pub fn revoke(&mut self, user: &str) -> Option<Grant> {
        self.users.remove(user)
    }

    pub fn grant_for(&self, user: Option<&str>) -> Option<&Grant> {
        match user {
            Some(user) => self.users.get(user),
            None => self.anonymous.as_ref(),
        }
    }

    fn refuse(subject: &Subject<'_>, action: &str) -> TransportError {
        let who = subject.user.unwrap_or("anonymous");
        let what = match (subject.id, subject.band) {
            (Some(id), Some(band)) => format!("{id}/{band}"),
            (Some(id), None) => id.to_string(),
            _ => "things".to_string(),
        };
        TransportError::NotAuthorized(format!("{who} may not {action} {what}"))
    }
}

impl AccessPolicy for BandGrants {
    fn check_read(&self, subject: &Subject<'_>) -> Result<()> {
        let scope = self
            .grant_for(subject.user)
            .and_then(|grant| grant.read.as_ref())
            .ok_or_else(|| Self::refuse(subject, "read"))?;

        // Thing-level reads are narrowed band by band afterwards
        if subject.band.is_none() || scope.allows(subject.band) {
            Ok(())
        } else {
            Err(Self::refuse(subject, "read"))
        }
    }

    fn check_write(&self, subject: &Subject<'_>) -> Result<()> {
        match self
            .grant_for(subject.user)
            .and_then(|grant| grant.write.as_ref())
        {
            Some(scope) if scope.allows(subject.band) => Ok(()),
            _ => Err(Self::refuse(subject, "write")),
        }
    }
}

/// Limit a Transporter to the bands it exchanges.
///
/// Reads may only return `out_bands`, writes may only target `in_bands`.
/// An unset side is unrestricted. Thing-level subjects always pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restrict {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_bands: Option<BTreeSet<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_bands: Option<BTreeSet<String>>,
}

impl Restrict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_bands<I, S>(mut self, bands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.in_bands = Some(bands.into_iter().map(Into::into).collect());
        self
    }

    pub fn out_bands<I, S>(mut self, bands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.out_bands = Some(bands.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_unrestricted(&self) -> bool {
        self.in_bands.is_none() && self.out_bands.is_none()
    }

    fn check(bands: Option<&BTreeSet<String>>, subject: &Subject<'_>, side: &str) -> Result<()> {
        match (bands, subject.band) {
            (Some(bands), Some(band)) if !bands.contains(band) => Err(
                TransportError::NotAppropriate(format!("band {band} is not an {side} band")),
            ),
            _ => Ok(()),
        }
    }
}

impl AccessPolicy for Restrict {
    fn check_read(&self, subject: &Subject<'_>) -> Result<()> {
        Self::check(self.out_bands.as_ref(), subject, "out")
    }

    fn check_write(&self, subject: &Subject<'_>) -> Result<()> {
        Self::check(self.in_bands.as_ref(), subject, "in")
    }
}
