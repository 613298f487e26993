//! Credential cache data model.
//!
//! Everything in this module is immutable once constructed. "Updating" a
//! cached credential means building a new [`CacheEntry`] and replacing the
//! stored value under the same principal key.

use std::{fmt, str::FromStr};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{PrincipalError, PrincipalResult};

/// Name type for a service and instance (`NT-SRV-INST`, RFC 4120 §6.2).
pub const NT_SRV_INST: i32 = 2;

/// Separator between the components of a principal's canonical string form.
pub const COMPONENT_SEPARATOR: char = '/';

/// Kerberos ticket format version carried by every ticket we cache.
pub const TICKET_VERSION: i32 = 5;

/// Service principal name: an ordered list of name components such as
/// `["host", "svc.example.com"]`.
///
/// The canonical string form joins the components with `/` and is the key
/// under which the ticket store files entries. Construction validates that
/// there is at least one component and that none of them is empty, so every
/// value of this type has a well-formed cache key.
///
/// # Examples
///
/// ```
/// use krb_ccache_storage::ServicePrincipalName;
///
/// let spn: ServicePrincipalName = "HTTP/web.example.com".parse().unwrap();
/// assert_eq!(spn.components(), ["HTTP", "web.example.com"]);
/// assert_eq!(spn.to_string(), "HTTP/web.example.com");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPrincipalName")]
pub struct ServicePrincipalName {
    name_type: i32,
    components: Vec<String>,
}

/// Unvalidated wire shape used only to route deserialization through
/// [`ServicePrincipalName::with_name_type`].
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPrincipalName {
    name_type: i32,
    components: Vec<String>,
}

impl TryFrom<RawPrincipalName> for ServicePrincipalName {
    type Error = PrincipalError;

    fn try_from(raw: RawPrincipalName) -> PrincipalResult<Self> {
        Self::with_name_type(raw.name_type, raw.components)
    }
}

impl ServicePrincipalName {
    /// Creates an `NT-SRV-INST` principal from its components.
    ///
    /// # Errors
    ///
    /// Returns [`PrincipalError::Empty`] if no components are given,
    /// [`PrincipalError::EmptyComponent`] if any component is empty, or
    /// [`PrincipalError::SeparatorInComponent`] if a component contains `/`.
    pub fn new<I, S>(components: I) -> PrincipalResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_name_type(NT_SRV_INST, components)
    }

    /// Creates a principal with an explicit name type.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_name_type<I, S>(name_type: i32, components: I) -> PrincipalResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let components: Vec<String> = components.into_iter().map(Into::into).collect();
        if components.is_empty() {
            return Err(PrincipalError::Empty);
        }
        if let Some(index) = components.iter().position(String::is_empty) {
            return Err(PrincipalError::EmptyComponent { index });
        }
        if let Some(index) = components.iter().position(|c| c.contains(COMPONENT_SEPARATOR)) {
            return Err(PrincipalError::SeparatorInComponent { index });
        }
        Ok(Self { name_type, components })
    }

    /// Returns the principal name type.
    #[must_use]
    pub fn name_type(&self) -> i32 {
        self.name_type
    }

    /// Returns the name components in order.
    #[must_use]
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Returns the service component (the first one, e.g. `host` or `HTTP`).
    #[must_use]
    pub fn service(&self) -> &str {
        // Construction guarantees at least one component.
        self.components.first().map_or("", String::as_str)
    }

    /// Returns the canonical cache key for this principal.
    #[must_use]
    pub fn cache_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ServicePrincipalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.components.iter().enumerate() {
            if i > 0 {
                write!(f, "{COMPONENT_SEPARATOR}")?;
            }
            f.write_str(component)?;
        }
        Ok(())
    }
}

impl FromStr for ServicePrincipalName {
    type Err = PrincipalError;

    fn from_str(s: &str) -> PrincipalResult<Self> {
        if s.is_empty() {
            return Err(PrincipalError::Empty);
        }
        Self::new(s.split(COMPONENT_SEPARATOR))
    }
}

/// An issued service ticket.
///
/// The encrypted part is opaque to the cache: it is produced by the ticket
/// granting service and only ever handed back to it (on renewal) or to the
/// target service (in an AP exchange). Tickets are never modified after they
/// are issued.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct Ticket {
    /// Ticket format version.
    #[builder(default = TICKET_VERSION)]
    tkt_vno: i32,

    /// Realm of the service the ticket was issued for.
    #[builder(into)]
    realm: String,

    /// Principal of the service the ticket was issued for.
    sname: ServicePrincipalName,

    /// Encoded, encrypted ticket body.
    #[builder(into, default)]
    enc_part: Bytes,
}

impl Ticket {
    /// Returns the ticket format version.
    #[must_use]
    pub fn tkt_vno(&self) -> i32 {
        self.tkt_vno
    }

    /// Returns the service realm.
    #[must_use]
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Returns the service principal the ticket is for.
    #[must_use]
    pub fn sname(&self) -> &ServicePrincipalName {
        &self.sname
    }

    /// Returns the opaque encrypted ticket body.
    #[must_use]
    pub fn enc_part(&self) -> &Bytes {
        &self.enc_part
    }
}

/// Symmetric session key shared with the service named by a ticket.
///
/// Key bytes are scrubbed from memory when the key is dropped and are never
/// printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey {
    etype: i32,
    value: Zeroizing<Vec<u8>>,
}

impl SessionKey {
    /// Creates a session key of the given encryption type.
    #[must_use]
    pub fn new(etype: i32, value: impl Into<Vec<u8>>) -> Self {
        Self { etype, value: Zeroizing::new(value.into()) }
    }

    /// Returns the encryption type number.
    #[must_use]
    pub fn etype(&self) -> i32 {
        self.etype
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("etype", &self.etype)
            .field("value", &format_args!("<redacted {} bytes>", self.value.len()))
            .finish()
    }
}

/// A cached service ticket together with its validity window and session key.
///
/// The issuing exchange guarantees `auth_time <= end_time <= renew_till`; the
/// cache does not re-check it. Entries are immutable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    ticket: Ticket,
    auth_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    renew_till: DateTime<Utc>,
    session_key: SessionKey,
}

impl CacheEntry {
    /// Creates a cache entry.
    #[must_use]
    pub fn new(
        ticket: Ticket,
        auth_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        renew_till: DateTime<Utc>,
        session_key: SessionKey,
    ) -> Self {
        Self { ticket, auth_time, end_time, renew_till, session_key }
    }

    /// Returns the cached ticket.
    #[must_use]
    pub fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    /// Time of the initial authentication that produced this ticket chain.
    #[must_use]
    pub fn auth_time(&self) -> DateTime<Utc> {
        self.auth_time
    }

    /// End of the ticket's usable lifetime (exclusive).
    #[must_use]
    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    /// End of the renewable window (exclusive).
    #[must_use]
    pub fn renew_till(&self) -> DateTime<Utc> {
        self.renew_till
    }

    /// Returns the session key for this ticket.
    #[must_use]
    pub fn session_key(&self) -> &SessionKey {
        &self.session_key
    }

    /// Canonical cache key of the ticket's service principal.
    #[must_use]
    pub fn spn(&self) -> String {
        self.ticket.sname.cache_key()
    }

    /// Consumes the entry, returning its ticket.
    #[must_use]
    pub fn into_ticket(self) -> Ticket {
        self.ticket
    }

    /// Returns a key-material-free view of this entry for diagnostics.
    #[must_use]
    pub fn summary(&self) -> EntrySummary {
        EntrySummary {
            spn: self.spn(),
            realm: self.ticket.realm.clone(),
            auth_time: self.auth_time,
            end_time: self.end_time,
            renew_till: self.renew_till,
            etype: self.session_key.etype,
        }
    }
}

/// Diagnostic view of a [`CacheEntry`], safe to log or serialize.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySummary {
    /// Canonical service principal name.
    pub spn: String,
    /// Service realm.
    pub realm: String,
    /// Initial authentication time.
    pub auth_time: DateTime<Utc>,
    /// End of the usable lifetime.
    pub end_time: DateTime<Utc>,
    /// End of the renewable window.
    pub renew_till: DateTime<Utc>,
    /// Session key encryption type.
    pub etype: i32,
}
