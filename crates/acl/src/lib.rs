//! NFS4 and POSIX.1e access control lists for rusty-fsops.
//!
//! This crate provides:
//! - `nfs4` - big-endian XDR codec, canonical ordering, validation and
//!   inheritance for NFS4 ACLs
//! - `posix` - little-endian codec, validation and inheritance for POSIX ACLs
//! - `io` - reading and writing either flavor through extended attributes
//!
//! The two codecs are independent. [`Acl`] joins them at the xattr boundary
//! so callers branch on the flavor once.

pub mod error;
#[cfg(target_os = "linux")]
pub mod io;
pub mod nfs4;
pub mod posix;

pub use error::AclError;
#[cfg(target_os = "linux")]
pub use io::{get_acl, remove_acl, set_acl};
pub use nfs4::{Nfs4Ace, Nfs4AceFlag, Nfs4AceType, Nfs4Acl, Nfs4AclFlag, Nfs4Perm, Nfs4Who, Nfs4WhoType};
pub use posix::{PosixAce, PosixAcl, PosixPerm, PosixTag};

/// ACL flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AclType {
    Nfs4,
    Posix,
}

/// An ACL of either flavor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acl {
    Nfs4(Nfs4Acl),
    Posix(PosixAcl),
}

impl Acl {
    pub fn acl_type(&self) -> AclType {
        match self {
            Self::Nfs4(_) => AclType::Nfs4,
            Self::Posix(_) => AclType::Posix,
        }
    }

    /// Whether the ACL adds nothing beyond the mode bits.
    pub fn is_trivial(&self) -> bool {
        match self {
            Self::Nfs4(acl) => acl.is_trivial(),
            Self::Posix(acl) => acl.is_trivial(),
        }
    }

    /// Validate the ACL for an object of the given kind.
    ///
    /// # Errors
    /// Returns the flavor-specific validation error.
    pub fn validate(&self, is_dir: bool) -> Result<(), AclError> {
        match self {
            Self::Nfs4(acl) => acl.validate(is_dir),
            Self::Posix(acl) => acl.validate(is_dir),
        }
    }

    /// Compute the ACL a new child of this directory receives.
    ///
    /// # Errors
    /// Returns an error if nothing is inheritable by the child kind.
    pub fn generate_inherited_acl(&self, is_dir: bool) -> Result<Acl, AclError> {
        match self {
            Self::Nfs4(acl) => acl.generate_inherited_acl(is_dir).map(Self::Nfs4),
            Self::Posix(acl) => acl.generate_inherited_acl(is_dir).map(Self::Posix),
        }
    }
}
