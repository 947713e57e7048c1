//! Shared constants used across rusty-fsops crates.

/// Hard upper bound on the number of open directory frames during a walk.
pub const MAX_DEPTH: usize = 2048;

/// Extended attribute holding an NFS4 ACL in XDR form.
pub const NFS4_ACL_XATTR: &str = "system.nfs4_acl_xdr";

/// Extended attribute holding the POSIX.1e access ACL.
pub const POSIX_ACL_ACCESS_XATTR: &str = "system.posix_acl_access";

/// Extended attribute holding the POSIX.1e default ACL.
pub const POSIX_ACL_DEFAULT_XATTR: &str = "system.posix_acl_default";

/// Sentinel id stored on the wire for entries without a uid/gid.
pub const SPECIAL_ID: u32 = u32::MAX;
