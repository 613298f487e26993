//! Principal name error types.
//!
//! The store itself is infallible: lookups that find nothing return `None` and
//! removals of absent entries are no-ops. The only fallible operation in this
//! crate is parsing a service principal name from its string form.
//!
//! # Example
//!
//! ```
//! use krb_ccache_storage::{PrincipalError, ServicePrincipalName};
//!
//! let err = "host//example.com".parse::<ServicePrincipalName>().unwrap_err();
//! assert_eq!(err, PrincipalError::EmptyComponent { index: 1 });
//! ```

use thiserror::Error;

/// Errors produced when constructing or parsing a [`ServicePrincipalName`].
///
/// A malformed principal is a caller bug, so these are surfaced immediately
/// rather than coerced into some canonical form.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. Downstream match expressions must
/// include a wildcard arm (`_ =>`).
///
/// [`ServicePrincipalName`]: crate::ServicePrincipalName
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum PrincipalError {
    /// The principal has no name components at all.
    #[error("Service principal name is empty")]
    Empty,

    /// One of the components is the empty string (e.g. `host//example.com`).
    #[error("Service principal name has an empty component at index {index}")]
    EmptyComponent {
        /// Zero-based position of the empty component.
        index: usize,
    },

    /// A component contains the `/` separator, so the principal would share
    /// its cache key with a different one (`["a/b"]` vs `["a", "b"]`).
    #[error("Service principal name component at index {index} contains '/'")]
    SeparatorInComponent {
        /// Zero-based position of the offending component.
        index: usize,
    },
}

/// Result type alias for principal name operations.
pub type PrincipalResult<T> = Result<T, PrincipalError>;
