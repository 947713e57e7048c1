//! POSIX.1e ACL codec.
//!
//! Blobs stored in `system.posix_acl_access` / `system.posix_acl_default`
//! are little-endian: a `u32` version (always 2) followed by 8-byte entries
//! `{u16 tag, u16 perm, u32 id}`. Entries without a uid/gid carry
//! `0xFFFFFFFF` as their id.

use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};
use rusty_fsops_common::SPECIAL_ID;

use crate::error::AclError;

/// Version written to and expected in every blob header.
pub const POSIX_ACL_VERSION: u32 = 2;

/// Size of the version header.
pub const HEADER_SIZE: usize = 4;

/// Size of one encoded entry.
pub const ACE_SIZE: usize = 8;

/// Entry tag. Discriminants are the on-disk values and also define the
/// canonical sort rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum PosixTag {
    UserObj = 0x01,
    User = 0x02,
    GroupObj = 0x04,
    Group = 0x08,
    Mask = 0x10,
    Other = 0x20,
}

impl PosixTag {
    fn from_raw(value: u16) -> Option<Self> {
        match value {
            0x01 => Some(Self::UserObj),
            0x02 => Some(Self::User),
            0x04 => Some(Self::GroupObj),
            0x08 => Some(Self::Group),
            0x10 => Some(Self::Mask),
            0x20 => Some(Self::Other),
            _ => None,
        }
    }

    /// Whether entries with this tag name a specific uid/gid.
    pub fn is_named(self) -> bool {
        matches!(self, Self::User | Self::Group)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::UserObj => "USER_OBJ",
            Self::User => "USER",
            Self::GroupObj => "GROUP_OBJ",
            Self::Group => "GROUP",
            Self::Mask => "MASK",
            Self::Other => "OTHER",
        }
    }
}

bitflags! {
    /// Permission bits of an entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PosixPerm: u16 {
        const READ = 0x4;
        const WRITE = 0x2;
        const EXECUTE = 0x1;
    }
}

/// A single POSIX ACL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PosixAce {
    pub tag: PosixTag,
    pub perms: PosixPerm,
    /// uid/gid for USER and GROUP entries; `None` otherwise.
    pub id: Option<u32>,
    /// Whether the entry belongs to the default ACL.
    pub default: bool,
}

impl PosixAce {
    /// Entry for USER_OBJ, GROUP_OBJ, MASK or OTHER.
    pub fn new(tag: PosixTag, perms: PosixPerm) -> Self {
        Self {
            tag,
            perms,
            id: None,
            default: false,
        }
    }

    /// Entry for a named USER or GROUP.
    pub fn named(tag: PosixTag, perms: PosixPerm, id: u32) -> Self {
        Self {
            tag,
            perms,
            id: Some(id),
            default: false,
        }
    }

    /// The same entry, moved to the default ACL.
    pub fn into_default(mut self) -> Self {
        self.default = true;
        self
    }

    /// uid/gid, or -1 when the entry has none.
    pub fn who_id(&self) -> i64 {
        self.id.map_or(-1, i64::from)
    }

    fn sort_key(&self) -> (PosixTag, i64) {
        (self.tag, self.who_id())
    }

    fn encode_into(&self, buf: &mut [u8]) {
        let id: u32 = if self.tag.is_named() {
            self.id.unwrap_or(SPECIAL_ID)
        } else {
            SPECIAL_ID
        };
        LittleEndian::write_u16(&mut buf[0..2], self.tag as u16);
        LittleEndian::write_u16(&mut buf[2..4], self.perms.bits());
        LittleEndian::write_u32(&mut buf[4..8], id);
    }
}

/// Decode one blob.
///
/// An empty blob decodes to no entries. A trailing partial entry is ignored.
///
/// # Arguments
/// * `bytes` - The blob
/// * `is_default` - Value for each entry's `default` field
///
/// # Errors
/// Returns an error for a blob shorter than the header or an unknown tag.
pub fn decode(bytes: &[u8], is_default: bool) -> Result<Vec<PosixAce>, AclError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let label: &'static str = blob_label(is_default);
    if bytes.len() < HEADER_SIZE {
        return Err(AclError::TooShort {
            label,
            len: bytes.len(),
        });
    }

    bytes[HEADER_SIZE..]
        .chunks_exact(ACE_SIZE)
        .enumerate()
        .map(|(index, chunk)| -> Result<PosixAce, AclError> {
            let raw_tag: u16 = LittleEndian::read_u16(&chunk[0..2]);
            let tag: PosixTag = PosixTag::from_raw(raw_tag).ok_or(AclError::UnknownTag {
                label,
                index,
                tag: raw_tag,
            })?;
            let raw_id: u32 = LittleEndian::read_u32(&chunk[4..8]);
            Ok(PosixAce {
                tag,
                perms: PosixPerm::from_bits_retain(LittleEndian::read_u16(&chunk[2..4])),
                id: (raw_id != SPECIAL_ID).then_some(raw_id),
                default: is_default,
            })
        })
        .collect()
}

/// Encode entries, sorted by tag rank then id, into one blob.
pub fn encode(aces: &[PosixAce]) -> Vec<u8> {
    let mut sorted: Vec<PosixAce> = aces.to_vec();
    sorted.sort_by_key(PosixAce::sort_key);

    let mut buf: Vec<u8> = vec![0u8; HEADER_SIZE + sorted.len() * ACE_SIZE];
    LittleEndian::write_u32(&mut buf[0..4], POSIX_ACL_VERSION);
    for (ace, chunk) in sorted.iter().zip(buf[HEADER_SIZE..].chunks_exact_mut(ACE_SIZE)) {
        ace.encode_into(chunk);
    }
    buf
}

/// Check one blob for structural validity.
///
/// # Arguments
/// * `label` - Name used in error messages ("access" or "default")
/// * `bytes` - The blob
///
/// # Errors
/// Returns the first violation: short blob, wrong version, unknown tag,
/// named entry without an id, a USER_OBJ / GROUP_OBJ / OTHER count other
/// than one, more than one MASK, or named entries without a MASK.
pub fn validate_blob(label: &'static str, bytes: &[u8]) -> Result<(), AclError> {
    if bytes.len() < HEADER_SIZE {
        return Err(AclError::TooShort {
            label,
            len: bytes.len(),
        });
    }
    let version: u32 = LittleEndian::read_u32(&bytes[0..4]);
    if version != POSIX_ACL_VERSION {
        return Err(AclError::UnexpectedVersion { label, version });
    }

    let mut user_obj: usize = 0;
    let mut group_obj: usize = 0;
    let mut other: usize = 0;
    let mut mask: usize = 0;
    let mut named: usize = 0;

    for (index, chunk) in bytes[HEADER_SIZE..].chunks_exact(ACE_SIZE).enumerate() {
        let raw_tag: u16 = LittleEndian::read_u16(&chunk[0..2]);
        let tag: PosixTag = PosixTag::from_raw(raw_tag).ok_or(AclError::UnknownTag {
            label,
            index,
            tag: raw_tag,
        })?;
        match tag {
            PosixTag::UserObj => user_obj += 1,
            PosixTag::GroupObj => group_obj += 1,
            PosixTag::Other => other += 1,
            PosixTag::Mask => mask += 1,
            PosixTag::User | PosixTag::Group => {
                if LittleEndian::read_u32(&chunk[4..8]) == SPECIAL_ID {
                    return Err(AclError::MissingId {
                        label,
                        index,
                        tag: tag.name(),
                    });
                }
                named += 1;
            }
        }
    }

    for (tag, count) in [
        (PosixTag::UserObj, user_obj),
        (PosixTag::GroupObj, group_obj),
        (PosixTag::Other, other),
    ] {
        if count != 1 {
            return Err(AclError::EntryCount {
                label,
                tag: tag.name(),
                count,
            });
        }
    }
    if mask > 1 {
        return Err(AclError::MultipleMasks { label, count: mask });
    }
    if named > 0 && mask == 0 {
        return Err(AclError::MaskRequired { label });
    }
    Ok(())
}

fn blob_label(is_default: bool) -> &'static str {
    if is_default {
        "default"
    } else {
        "access"
    }
}

/// A POSIX ACL held as its access blob and optional default blob.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PosixAcl {
    access: Vec<u8>,
    default: Option<Vec<u8>>,
}

impl PosixAcl {
    /// Wrap blobs without inspecting them. An empty access blob means the
    /// file has no extended access ACL.
    pub fn from_bytes(access: Vec<u8>, default: Option<Vec<u8>>) -> Self {
        Self { access, default }
    }

    /// Build an ACL from entries, split on each entry's `default` flag.
    /// An empty default partition yields no default ACL.
    pub fn from_aces(aces: &[PosixAce]) -> Self {
        let (default, access): (Vec<PosixAce>, Vec<PosixAce>) =
            aces.iter().copied().partition(|ace| ace.default);
        Self {
            access: encode(&access),
            default: (!default.is_empty()).then(|| encode(&default)),
        }
    }

    /// Access entries followed by default entries.
    pub fn aces(&self) -> Result<Vec<PosixAce>, AclError> {
        let mut aces: Vec<PosixAce> = self.access_aces()?;
        aces.extend(self.default_aces()?);
        Ok(aces)
    }

    pub fn access_aces(&self) -> Result<Vec<PosixAce>, AclError> {
        decode(&self.access, false)
    }

    pub fn default_aces(&self) -> Result<Vec<PosixAce>, AclError> {
        match &self.default {
            Some(bytes) => decode(bytes, true),
            None => Ok(Vec::new()),
        }
    }

    pub fn access_bytes(&self) -> &[u8] {
        &self.access
    }

    pub fn default_bytes(&self) -> Option<&[u8]> {
        self.default.as_deref()
    }

    /// Whether the ACL carries nothing beyond the mode bits.
    pub fn is_trivial(&self) -> bool {
        self.access.is_empty() && self.default.is_none()
    }

    /// Validate the access blob and, when present, the default blob.
    ///
    /// # Arguments
    /// * `is_dir` - Whether the ACL belongs to a directory
    ///
    /// # Errors
    /// Returns the first violation; a default ACL on a non-directory is
    /// rejected.
    pub fn validate(&self, is_dir: bool) -> Result<(), AclError> {
        validate_blob("access", &self.access)?;
        if let Some(default) = &self.default {
            if !is_dir {
                return Err(AclError::DefaultOnFile);
            }
            validate_blob("default", default)?;
        }
        Ok(())
    }

    /// Compute the ACL a new child of this directory receives.
    ///
    /// The child's access ACL is this ACL's default ACL; a directory child
    /// also receives it as its own default ACL.
    ///
    /// # Errors
    /// Returns an error if this ACL is trivial or has no default ACL.
    pub fn generate_inherited_acl(&self, is_dir: bool) -> Result<PosixAcl, AclError> {
        if self.is_trivial() {
            return Err(AclError::TrivialAcl);
        }
        let default: &Vec<u8> = self.default.as_ref().ok_or(AclError::NoDefaultAcl)?;
        Ok(PosixAcl {
            access: default.clone(),
            default: is_dir.then(|| default.clone()),
        })
    }
}
