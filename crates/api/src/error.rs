//! Supernode error types.

use crate::state::StateKind;
use std::sync::Arc;

/// A clonable trait-object inner error.
#[derive(Clone, Default)]
pub struct DynInnerError(
    pub Option<Arc<dyn std::error::Error + 'static + Send + Sync>>,
);

impl std::fmt::Debug for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_ref() {
            None => f.write_str("None"),
            Some(s) => s.fmt(f),
        }
    }
}

impl std::error::Error for DynInnerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.as_ref().map(|s| {
            let out: &(dyn std::error::Error + 'static) = &**s;
            out
        })
    }
}

impl DynInnerError {
    /// Construct a new DynInnerError from a source error.
    pub fn new<E: std::error::Error + 'static + Send + Sync>(e: E) -> Self {
        Self(Some(Arc::new(e)))
    }
}

/// The core supernode error type.
///
/// Every variant carries the key or identifiers it was raised for.
/// This type is `Clone` so results can be fanned out to several waiters
/// (e.g. the scheduler and the reaper observing the same failure).
#[derive(Debug, Clone, thiserror::Error)]
pub enum SnError {
    /// A store operation was attempted with an empty key.
    #[error("empty key")]
    EmptyKey,

    /// The referenced entity does not exist.
    ///
    /// This is expected in normal operation, e.g. a peer that was
    /// reaped between two requests.
    #[error("not found: {key}")]
    NotFound {
        /// The key or identifier that was looked up.
        key: Arc<str>,
    },

    /// A key was accessed as the wrong entity kind. This is a bug in the
    /// caller and must never be retried.
    #[error("internal error: key {key} holds {found}, requested {expected}")]
    TypeMismatch {
        /// The offending key.
        key: Arc<str>,

        /// The kind the caller asked for.
        expected: StateKind,

        /// The kind actually stored under the key.
        found: StateKind,
    },

    /// Malformed caller input, rejected before touching any state.
    #[error("invalid argument: {ctx}")]
    InvalidArgument {
        /// Description of the rejected input.
        ctx: Arc<str>,
    },

    /// Two reports for the same piece disagree on its checksum.
    #[error(
        "checksum mismatch for task {task} piece {piece}: recorded {recorded}, reported {reported}"
    )]
    ChecksumMismatch {
        /// The task the piece belongs to.
        task: Arc<str>,

        /// The piece index.
        piece: u32,

        /// The checksum stored by the first report.
        recorded: Arc<str>,

        /// The disagreeing checksum.
        reported: Arc<str>,
    },

    /// No live peer is known to hold the requested piece.
    /// Callers fall back to the origin.
    #[error("no source available for task {task} piece {piece}")]
    NoSourceAvailable {
        /// The task the piece belongs to.
        task: Arc<str>,

        /// The piece index.
        piece: u32,
    },

    /// Generic supernode error.
    #[error("{ctx} (src: {src})")]
    Other {
        /// Any context associated with this error.
        ctx: Arc<str>,

        /// The inner error (if any).
        #[source]
        src: DynInnerError,
    },
}

fn to_arc<C: std::fmt::Display>(c: C) -> Arc<str> {
    c.to_string().into_boxed_str().into()
}

impl SnError {
    /// Construct a "not found" error for a key or identifier.
    pub fn not_found<C: std::fmt::Display>(key: C) -> Self {
        Self::NotFound { key: to_arc(key) }
    }

    /// Construct an "invalid argument" error.
    pub fn invalid<C: std::fmt::Display>(ctx: C) -> Self {
        Self::InvalidArgument { ctx: to_arc(ctx) }
    }

    /// Construct an "other" error with an inner source error.
    pub fn other_src<
        C: std::fmt::Display,
        S: std::error::Error + 'static + Send + Sync,
    >(
        ctx: C,
        src: S,
    ) -> Self {
        Self::Other {
            ctx: to_arc(ctx),
            src: DynInnerError::new(src),
        }
    }

    /// Construct an "other" error.
    pub fn other<C: std::fmt::Display>(ctx: C) -> Self {
        Self::Other {
            ctx: to_arc(ctx),
            src: DynInnerError::default(),
        }
    }

    /// True for [SnError::NotFound], which callers usually treat as a no-op.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for errors that indicate a bug rather than a transient
    /// condition or bad input.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. })
    }
}

/// The core supernode result type.
pub type SnResult<T> = Result<T, SnError>;
