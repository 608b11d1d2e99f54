//! Error types for cryptoctx.

use crate::attribute::AttributeId;

/// Machine-matchable failure categories.
///
/// `Insecure` is deliberately distinct from `Argument`: a key that is
/// well-formed but below the secure size floor must never be mistaken for
/// a malformed one, so callers can't mask the condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A function argument is out of range or of the wrong form.
    Argument,
    /// Input data is malformed.
    BadData,
    /// The attribute or state is already set and may not change.
    Inited,
    /// The attribute or state hasn't been initialised yet.
    NotInited,
    /// The requested item doesn't exist.
    NotFound,
    /// The operation or attribute isn't available for this object.
    NotAvailable,
    /// The key is too short to be secure.  Never maskable.
    Insecure,
    /// An integrity check failed; the operation was refused.
    Failed,
    /// The operation was applied in an incomplete state.
    Incomplete,
    /// The operation is already complete and accepts no more data.
    Complete,
    /// A value exceeds its representable range.
    Overflow,
    /// A resource (entropy, pool capacity) was unavailable.
    Resource,
    /// An internal consistency check failed.  Indicates a bug.
    Internal,
}

/// How an attribute-level failure relates to the attribute: the extended
/// error class reported alongside the error locus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// No extended information.
    None,
    /// The attribute value is of an invalid size.
    AttributeSize,
    /// The attribute value itself is invalid.
    AttributeValue,
    /// A required attribute is absent.
    AttributeAbsent,
    /// The attribute is already present.
    AttributePresent,
    /// A constraint between attributes was violated.
    Constraint,
}

/// The error type used throughout this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    locus: Option<AttributeId>,
    class: ErrorClass,
    site: Option<&'static str>,
}

impl Error {
    /// Creates an error of the given kind with no extended report.
    pub const fn new(kind: ErrorKind) -> Self {
        Error {
            kind,
            locus: None,
            class: ErrorClass::None,
            site: None,
        }
    }

    /// Creates an internal error recording the failure site.
    pub const fn internal(site: &'static str) -> Self {
        Error {
            kind: ErrorKind::Internal,
            locus: None,
            class: ErrorClass::None,
            site: Some(site),
        }
    }

    /// Attaches an error locus and class to this error.
    pub const fn with_report(mut self, locus: AttributeId, class: ErrorClass) -> Self {
        self.locus = Some(locus);
        self.class = class;
        self
    }

    /// The failure category.
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The attribute this failure relates to, if any.
    pub const fn locus(&self) -> Option<AttributeId> {
        self.locus
    }

    /// The extended error class.
    pub const fn class(&self) -> ErrorClass {
        self.class
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.site {
            Some(site) => write!(f, "{:?} at {}", self.kind, site),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl std::error::Error for Error {}

/// Shorthand result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Reports an internal consistency failure, recording the source location
/// the way a debug assertion would.
macro_rules! int_error {
    () => {{ crate::error::Error::internal(concat!(file!(), ":", line!())) }};
}

/// Checks an internal invariant, failing with an internal error when it
/// doesn't hold.
macro_rules! ensure_internal {
    ($cond:expr) => {{
        if !$cond {
            return Err(int_error!());
        }
    }};
}
