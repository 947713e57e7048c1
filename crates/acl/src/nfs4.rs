//! NFS4 ACL codec.
//!
//! The XDR blob stored in `system.nfs4_acl_xdr` is big-endian:
//!
//! ```text
//! header: u32 acl_flags, u32 naces
//! entry:  u32 type, u32 flags, u32 iflag, u32 access_mask, u32 who
//! ```
//!
//! `iflag = 0` means `who` is a literal uid/gid; `iflag = 1` means `who`
//! names a special principal (1 = OWNER@, 2 = GROUP@, 3 = EVERYONE@).
//! Entry order matters: the first matching entry decides access.

use std::cmp::Ordering;

use bitflags::bitflags;
use byteorder::{BigEndian, ByteOrder};

use crate::error::AclError;

/// Size of the `{acl_flags, naces}` header.
pub const HEADER_SIZE: usize = 8;

/// Size of one encoded entry.
pub const ACE_SIZE: usize = 20;

const IFLAG_NAMED: u32 = 0;
const IFLAG_SPECIAL: u32 = 1;

const WHO_OWNER: u32 = 1;
const WHO_GROUP: u32 = 2;
const WHO_EVERYONE: u32 = 3;

/// NFS4 ACE type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Nfs4AceType {
    Allow = 0,
    Deny = 1,
    Audit = 2,
    Alarm = 3,
}

impl Nfs4AceType {
    fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Allow),
            1 => Some(Self::Deny),
            2 => Some(Self::Audit),
            3 => Some(Self::Alarm),
            _ => None,
        }
    }
}

bitflags! {
    /// Per-entry flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Nfs4AceFlag: u32 {
        const FILE_INHERIT = 0x0000_0001;
        const DIRECTORY_INHERIT = 0x0000_0002;
        const NO_PROPAGATE_INHERIT = 0x0000_0004;
        const INHERIT_ONLY = 0x0000_0008;
        const SUCCESSFUL_ACCESS = 0x0000_0010;
        const FAILED_ACCESS = 0x0000_0020;
        const IDENTIFIER_GROUP = 0x0000_0040;
        const INHERITED = 0x0000_0080;
    }
}

impl Nfs4AceFlag {
    /// All four bits that control inheritance.
    pub const INHERITANCE: Self = Self::FILE_INHERIT
        .union(Self::DIRECTORY_INHERIT)
        .union(Self::NO_PROPAGATE_INHERIT)
        .union(Self::INHERIT_ONLY);

    /// Bits that make an entry inheritable by some child.
    pub const PROPAGATE: Self = Self::FILE_INHERIT.union(Self::DIRECTORY_INHERIT);
}

bitflags! {
    /// Access mask bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Nfs4Perm: u32 {
        const READ_DATA = 0x0000_0001;
        const WRITE_DATA = 0x0000_0002;
        const APPEND_DATA = 0x0000_0004;
        const READ_NAMED_ATTRS = 0x0000_0008;
        const WRITE_NAMED_ATTRS = 0x0000_0010;
        const EXECUTE = 0x0000_0020;
        const DELETE_CHILD = 0x0000_0040;
        const READ_ATTRIBUTES = 0x0000_0080;
        const WRITE_ATTRIBUTES = 0x0000_0100;
        const DELETE = 0x0001_0000;
        const READ_ACL = 0x0002_0000;
        const WRITE_ACL = 0x0004_0000;
        const WRITE_OWNER = 0x0008_0000;
        const SYNCHRONIZE = 0x0010_0000;
    }
}

bitflags! {
    /// Header flags of the whole ACL.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Nfs4AclFlag: u32 {
        const AUTO_INHERIT = 0x0000_0001;
        const PROTECTED = 0x0000_0002;
        const DEFAULTED = 0x0000_0004;
        const ACL_IS_TRIVIAL = 0x0001_0000;
        const ACL_IS_DIR = 0x0002_0000;
    }
}

/// Principal kind as reported alongside the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nfs4WhoType {
    Named,
    Owner,
    Group,
    Everyone,
}

/// Principal an entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nfs4Who {
    /// A literal uid, or gid when the entry carries `IDENTIFIER_GROUP`.
    Named(u32),
    Owner,
    Group,
    Everyone,
}

/// A single NFS4 access control entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nfs4Ace {
    pub ace_type: Nfs4AceType,
    pub ace_flags: Nfs4AceFlag,
    pub access_mask: Nfs4Perm,
    pub who: Nfs4Who,
}

impl Nfs4Ace {
    /// Create an entry.
    pub fn new(
        ace_type: Nfs4AceType,
        ace_flags: Nfs4AceFlag,
        access_mask: Nfs4Perm,
        who: Nfs4Who,
    ) -> Self {
        Self {
            ace_type,
            ace_flags,
            access_mask,
            who,
        }
    }

    /// Kind of principal.
    pub fn who_type(&self) -> Nfs4WhoType {
        match self.who {
            Nfs4Who::Named(_) => Nfs4WhoType::Named,
            Nfs4Who::Owner => Nfs4WhoType::Owner,
            Nfs4Who::Group => Nfs4WhoType::Group,
            Nfs4Who::Everyone => Nfs4WhoType::Everyone,
        }
    }

    /// Principal id, or -1 for special principals.
    pub fn who_id(&self) -> i64 {
        match self.who {
            Nfs4Who::Named(id) => i64::from(id),
            _ => -1,
        }
    }

    /// Bucket used for canonical ordering:
    /// explicit DENY, explicit ALLOW, inherited DENY, inherited ALLOW.
    pub fn canonical_rank(&self) -> u8 {
        let inherited: u8 = u8::from(self.ace_flags.contains(Nfs4AceFlag::INHERITED));
        let allow: u8 = u8::from(self.ace_type == Nfs4AceType::Allow);
        2 * inherited + allow
    }

    /// Compare two entries by canonical rank only.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.canonical_rank().cmp(&other.canonical_rank())
    }

    fn encode_into(&self, buf: &mut [u8]) {
        let (iflag, who): (u32, u32) = match self.who {
            Nfs4Who::Named(id) => (IFLAG_NAMED, id),
            Nfs4Who::Owner => (IFLAG_SPECIAL, WHO_OWNER),
            Nfs4Who::Group => (IFLAG_SPECIAL, WHO_GROUP),
            Nfs4Who::Everyone => (IFLAG_SPECIAL, WHO_EVERYONE),
        };
        BigEndian::write_u32(&mut buf[0..4], self.ace_type as u32);
        BigEndian::write_u32(&mut buf[4..8], self.ace_flags.bits());
        BigEndian::write_u32(&mut buf[8..12], iflag);
        BigEndian::write_u32(&mut buf[12..16], self.access_mask.bits());
        BigEndian::write_u32(&mut buf[16..20], who);
    }

    fn decode_from(index: usize, buf: &[u8]) -> Result<Self, AclError> {
        let raw_type: u32 = BigEndian::read_u32(&buf[0..4]);
        let ace_type: Nfs4AceType = Nfs4AceType::from_raw(raw_type).ok_or(AclError::UnknownAceType {
            index,
            value: raw_type,
        })?;
        let iflag: u32 = BigEndian::read_u32(&buf[8..12]);
        let raw_who: u32 = BigEndian::read_u32(&buf[16..20]);
        let who: Nfs4Who = if iflag == IFLAG_NAMED {
            Nfs4Who::Named(raw_who)
        } else {
            match raw_who {
                WHO_OWNER => Nfs4Who::Owner,
                WHO_GROUP => Nfs4Who::Group,
                WHO_EVERYONE => Nfs4Who::Everyone,
                value => return Err(AclError::UnknownWho { index, value }),
            }
        };
        Ok(Self {
            ace_type,
            ace_flags: Nfs4AceFlag::from_bits_retain(BigEndian::read_u32(&buf[4..8])),
            access_mask: Nfs4Perm::from_bits_retain(BigEndian::read_u32(&buf[12..16])),
            who,
        })
    }
}

/// Sort entries into canonical order. Stable within a bucket.
pub fn sort_canonical(aces: &mut [Nfs4Ace]) {
    aces.sort_by(Nfs4Ace::canonical_cmp);
}

/// Decode an XDR blob.
///
/// # Errors
/// Returns an error if the blob is shorter than the header, the header
/// declares more entries than are present, or an entry is malformed.
pub fn decode(bytes: &[u8]) -> Result<(Nfs4AclFlag, Vec<Nfs4Ace>), AclError> {
    if bytes.len() < HEADER_SIZE {
        return Err(AclError::TooShort {
            label: "NFS4",
            len: bytes.len(),
        });
    }
    let acl_flags: Nfs4AclFlag = Nfs4AclFlag::from_bits_retain(BigEndian::read_u32(&bytes[0..4]));
    let naces: u32 = BigEndian::read_u32(&bytes[4..8]);
    let needed: u64 = HEADER_SIZE as u64 + u64::from(naces) * ACE_SIZE as u64;
    if needed > bytes.len() as u64 {
        return Err(AclError::Truncated {
            declared: naces,
            available: bytes.len(),
        });
    }

    let aces: Vec<Nfs4Ace> = bytes[HEADER_SIZE..]
        .chunks_exact(ACE_SIZE)
        .take(naces as usize)
        .enumerate()
        .map(|(index, chunk)| Nfs4Ace::decode_from(index, chunk))
        .collect::<Result<_, _>>()?;
    Ok((acl_flags, aces))
}

/// Encode entries in canonical order.
pub fn encode(aces: &[Nfs4Ace], acl_flags: Nfs4AclFlag) -> Vec<u8> {
    let mut sorted: Vec<Nfs4Ace> = aces.to_vec();
    sort_canonical(&mut sorted);

    let mut buf: Vec<u8> = vec![0u8; HEADER_SIZE + sorted.len() * ACE_SIZE];
    BigEndian::write_u32(&mut buf[0..4], acl_flags.bits());
    BigEndian::write_u32(&mut buf[4..8], sorted.len() as u32);
    for (ace, chunk) in sorted.iter().zip(buf[HEADER_SIZE..].chunks_exact_mut(ACE_SIZE)) {
        ace.encode_into(chunk);
    }
    buf
}

/// Check an XDR blob for semantic validity.
///
/// Blobs shorter than the header describe an absent ACL and are accepted.
/// Entries declared beyond the end of the blob are not inspected.
///
/// # Arguments
/// * `is_dir` - Whether the ACL belongs to a directory
/// * `bytes` - The XDR blob
///
/// # Errors
/// Returns the first rule violation found.
pub fn validate(is_dir: bool, bytes: &[u8]) -> Result<(), AclError> {
    if bytes.len() < HEADER_SIZE {
        return Ok(());
    }
    let naces: usize = BigEndian::read_u32(&bytes[4..8]) as usize;
    let mut has_inheritable: bool = false;

    for (index, chunk) in bytes[HEADER_SIZE..].chunks_exact(ACE_SIZE).take(naces).enumerate() {
        let ace_type: u32 = BigEndian::read_u32(&chunk[0..4]);
        let flags: Nfs4AceFlag = Nfs4AceFlag::from_bits_retain(BigEndian::read_u32(&chunk[4..8]));
        let iflag: u32 = BigEndian::read_u32(&chunk[8..12]);

        if ace_type == Nfs4AceType::Deny as u32 && iflag == IFLAG_SPECIAL {
            return Err(AclError::DenyForSpecialPrincipal { index });
        }
        if flags.contains(Nfs4AceFlag::INHERIT_ONLY) && !flags.intersects(Nfs4AceFlag::PROPAGATE) {
            return Err(AclError::InheritOnlyWithoutInherit { index });
        }
        if !is_dir && flags.intersects(Nfs4AceFlag::INHERITANCE) {
            return Err(AclError::InheritanceOnFile { index });
        }
        if flags.intersects(Nfs4AceFlag::PROPAGATE) {
            has_inheritable = true;
        }
    }

    if is_dir && !has_inheritable {
        return Err(AclError::DirectoryNotInheritable);
    }
    Ok(())
}

/// An NFS4 ACL held as its raw XDR blob.
///
/// The blob is kept verbatim so ACLs read from disk round-trip exactly;
/// decoded views are produced on demand.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Nfs4Acl {
    data: Vec<u8>,
}

impl Nfs4Acl {
    /// Wrap a blob without inspecting it. An empty blob means "no ACL".
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Wrap a blob after checking that it decodes.
    ///
    /// # Errors
    /// Returns the decode error for malformed blobs.
    pub fn decode(bytes: &[u8]) -> Result<Self, AclError> {
        decode(bytes)?;
        Ok(Self {
            data: bytes.to_vec(),
        })
    }

    /// Build an ACL from entries; they are stored in canonical order.
    pub fn from_aces(aces: &[Nfs4Ace], acl_flags: Nfs4AclFlag) -> Self {
        Self {
            data: encode(aces, acl_flags),
        }
    }

    /// Header flags.
    pub fn acl_flags(&self) -> Result<Nfs4AclFlag, AclError> {
        decode(&self.data).map(|(flags, _)| flags)
    }

    /// Decoded entries, in stored order.
    pub fn aces(&self) -> Result<Vec<Nfs4Ace>, AclError> {
        decode(&self.data).map(|(_, aces)| aces)
    }

    /// Entry count from the header; 0 when the blob is shorter than the header.
    pub fn len(&self) -> usize {
        if self.data.len() < HEADER_SIZE {
            return 0;
        }
        BigEndian::read_u32(&self.data[4..8]) as usize
    }

    /// Whether the header declares no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blob length in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Whether the ACL is equivalent to plain mode bits.
    pub fn is_trivial(&self) -> bool {
        if self.data.len() < HEADER_SIZE {
            return true;
        }
        let flags: Nfs4AclFlag = Nfs4AclFlag::from_bits_retain(BigEndian::read_u32(&self.data[0..4]));
        flags.contains(Nfs4AclFlag::ACL_IS_TRIVIAL)
    }

    /// Raw xattr value.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// See [`validate`].
    pub fn validate(&self, is_dir: bool) -> Result<(), AclError> {
        validate(is_dir, &self.data)
    }

    /// Compute the ACL a new child of this directory receives.
    ///
    /// A directory child takes entries carrying FILE_INHERIT or
    /// DIRECTORY_INHERIT; a file child only those with FILE_INHERIT. A
    /// directory child keeps propagating unless NO_PROPAGATE_INHERIT is set,
    /// in which case (and for file children) all inheritance bits are
    /// stripped. Every produced entry is marked INHERITED.
    ///
    /// # Arguments
    /// * `is_dir` - Whether the child is a directory
    ///
    /// # Errors
    /// Returns an error if this ACL is empty or malformed, or has no entry
    /// inheritable by the child kind.
    pub fn generate_inherited_acl(&self, is_dir: bool) -> Result<Nfs4Acl, AclError> {
        if self.data.is_empty() {
            return Err(AclError::EmptyAcl);
        }
        let wanted: Nfs4AceFlag = if is_dir {
            Nfs4AceFlag::PROPAGATE
        } else {
            Nfs4AceFlag::FILE_INHERIT
        };

        let inherited: Vec<Nfs4Ace> = self
            .aces()?
            .into_iter()
            .filter(|ace| ace.ace_flags.intersects(wanted))
            .map(|mut ace| {
                let keeps_propagating: bool =
                    is_dir && !ace.ace_flags.contains(Nfs4AceFlag::NO_PROPAGATE_INHERIT);
                if keeps_propagating {
                    ace.ace_flags.remove(Nfs4AceFlag::INHERIT_ONLY);
                } else {
                    ace.ace_flags.remove(Nfs4AceFlag::INHERITANCE);
                }
                ace.ace_flags.insert(Nfs4AceFlag::INHERITED);
                ace
            })
            .collect();

        if inherited.is_empty() {
            return Err(AclError::NothingToInherit);
        }
        let acl_flags: Nfs4AclFlag = if is_dir {
            Nfs4AclFlag::ACL_IS_DIR
        } else {
            Nfs4AclFlag::empty()
        };
        Ok(Nfs4Acl::from_aces(&inherited, acl_flags))
    }
}
