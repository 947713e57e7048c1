//! Error types for ACL decoding, validation, inheritance and xattr I/O.

use rusty_fsops_common::SysError;
use thiserror::Error;

/// Errors raised by the NFS4 and POSIX ACL codecs.
#[derive(Debug, Error)]
pub enum AclError {
    /// Blob is shorter than its fixed header.
    #[error("{label} ACL data too short: {len} bytes")]
    TooShort {
        /// Which blob was being parsed.
        label: &'static str,
        /// Actual length in bytes.
        len: usize,
    },

    /// NFS4 header declares more entries than the blob holds.
    #[error("NFS4 ACL data truncated: header declares {declared} entries, only {available} bytes present")]
    Truncated {
        /// Entry count from the header.
        declared: u32,
        /// Bytes actually present.
        available: usize,
    },

    /// NFS4 entry carries an unknown ACE type.
    #[error("NFS4 ACE {index}: unknown ACE type {value}")]
    UnknownAceType {
        /// Entry position.
        index: usize,
        /// Raw type value.
        value: u32,
    },

    /// NFS4 entry names an unknown special principal.
    #[error("NFS4 ACE {index}: unknown special principal {value}")]
    UnknownWho {
        /// Entry position.
        index: usize,
        /// Raw principal value.
        value: u32,
    },

    /// NFS4 DENY entry for OWNER@, GROUP@ or EVERYONE@.
    #[error("NFS4 ACE {index}: DENY entries are not allowed for special principals")]
    DenyForSpecialPrincipal {
        /// Entry position.
        index: usize,
    },

    /// NFS4 INHERIT_ONLY without FILE_INHERIT or DIRECTORY_INHERIT.
    #[error("NFS4 ACE {index}: INHERIT_ONLY requires FILE_INHERIT or DIRECTORY_INHERIT")]
    InheritOnlyWithoutInherit {
        /// Entry position.
        index: usize,
    },

    /// NFS4 inheritance flags on an entry of a non-directory.
    #[error("NFS4 ACE {index}: inheritance flags are only valid on directories")]
    InheritanceOnFile {
        /// Entry position.
        index: usize,
    },

    /// NFS4 directory ACL without any inheritable entry.
    #[error("NFS4 directory ACL must contain at least one FILE_INHERIT or DIRECTORY_INHERIT entry")]
    DirectoryNotInheritable,

    /// POSIX blob header carries an unsupported version.
    #[error("{label} ACL has unexpected version {version}")]
    UnexpectedVersion {
        /// Which blob was being validated.
        label: &'static str,
        /// Version found.
        version: u32,
    },

    /// POSIX entry carries an unknown tag.
    #[error("{label} ACL entry {index}: unknown tag {tag:#x}")]
    UnknownTag {
        /// Which blob was being parsed.
        label: &'static str,
        /// Entry position.
        index: usize,
        /// Raw tag value.
        tag: u16,
    },

    /// POSIX named USER/GROUP entry without a real id.
    #[error("{label} ACL entry {index}: {tag} entry requires a uid/gid")]
    MissingId {
        /// Which blob was being validated.
        label: &'static str,
        /// Entry position.
        index: usize,
        /// Tag name.
        tag: &'static str,
    },

    /// POSIX required entry missing or duplicated.
    #[error("{label} ACL must contain exactly one {tag} entry, found {count}")]
    EntryCount {
        /// Which blob was being validated.
        label: &'static str,
        /// Tag name.
        tag: &'static str,
        /// Number of entries found.
        count: usize,
    },

    /// POSIX named entries present without a MASK.
    #[error("{label} ACL has named entries but no MASK entry")]
    MaskRequired {
        /// Which blob was being validated.
        label: &'static str,
    },

    /// POSIX blob with more than one MASK.
    #[error("{label} ACL has {count} MASK entries")]
    MultipleMasks {
        /// Which blob was being validated.
        label: &'static str,
        /// Number of MASK entries.
        count: usize,
    },

    /// POSIX default ACL on a non-directory.
    #[error("default ACL is only valid on directories")]
    DefaultOnFile,

    /// Source ACL has no entry that applies to the child kind.
    #[error("parent ACL has no inheritable ACEs for this object type")]
    NothingToInherit,

    /// Source NFS4 ACL is empty.
    #[error("cannot generate inherited ACL from an empty ACL")]
    EmptyAcl,

    /// Source POSIX ACL is trivial.
    #[error("cannot generate inherited ACL from trivial ACL")]
    TrivialAcl,

    /// Source POSIX ACL has no default ACL.
    #[error("parent ACL has no default ACL")]
    NoDefaultAcl,

    /// The filesystem supports neither NFS4 nor POSIX ACLs.
    #[error("ACLs are disabled on this filesystem")]
    AclsDisabled,

    /// An xattr or stat call failed.
    #[error(transparent)]
    Sys(#[from] SysError),
}

impl AclError {
    /// Whether this error describes a malformed or invalid ACL, as opposed
    /// to an I/O failure.
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::AclsDisabled | Self::Sys(_))
    }
}
