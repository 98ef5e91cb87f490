//! Identifier types for tasks, peers and client sessions.
//!
//! All identifiers are caller-supplied opaque strings. They are cheap to
//! clone and are only validated for non-emptiness, which happens in the
//! progress manager rather than here, so an empty id can still be
//! constructed and reported back as an invalid argument.

use std::sync::Arc;

macro_rules! imp_id {
    ($(#[$m:meta])* $i:ident) => {
        $(#[$m])*
        #[derive(
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $i(pub Arc<str>);

        impl std::ops::Deref for $i {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl std::fmt::Display for $i {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::fmt::Debug for $i {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({:?})", stringify!($i), &*self.0)
            }
        }

        impl From<&str> for $i {
            fn from(s: &str) -> Self {
                Self(s.into())
            }
        }

        impl From<String> for $i {
            fn from(s: String) -> Self {
                Self(s.into())
            }
        }

        impl $i {
            /// Is this identifier the empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }
    };
}

imp_id!(
    /// Identifies one file/blob distribution task.
    TaskId
);

imp_id!(
    /// Identifies one peer node serving pieces for a task.
    PeerId
);

imp_id!(
    /// Identifies one client download session.
    ClientId
);
