//! Mount table lookups.

use std::io;

/// Path of the per-process mount table.
pub const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

/// Source device or label of the mount with the given id.
///
/// # Arguments
/// * `mnt_id` - Mount id as reported by `statx(STATX_MNT_ID)`
///
/// # Returns
/// The mount source, or `None` if no mount has that id.
///
/// # Errors
/// Returns an error if the mount table cannot be read.
pub fn mount_source(mnt_id: u64) -> io::Result<Option<String>> {
    let content: String = std::fs::read_to_string(MOUNTINFO_PATH)?;
    Ok(find_source(&content, mnt_id))
}

/// Find the source field of a mount id in `mountinfo` content.
///
/// Each line reads
/// `id parent major:minor root mountpoint options [optional...] - fstype source superoptions`.
pub fn find_source(content: &str, mnt_id: u64) -> Option<String> {
    content.lines().find_map(|line| {
        let id: u64 = line.split_whitespace().next()?.parse().ok()?;
        if id != mnt_id {
            return None;
        }
        let (_, tail) = line.split_once(" - ")?;
        let mut fields = tail.split_whitespace();
        let _fstype: &str = fields.next()?;
        fields.next().map(unescape)
    })
}

/// Undo the octal escaping (`\040` for space, etc.) the kernel applies.
fn unescape(field: &str) -> String {
    let bytes: &[u8] = field.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i: usize = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_escape(&bytes[i + 1..i + 4]) {
            let value: u8 = (bytes[i + 1] - b'0') * 64 + (bytes[i + 2] - b'0') * 8 + (bytes[i + 3] - b'0');
            out.push(value);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn is_octal_escape(digits: &[u8]) -> bool {
    digits.len() == 3 && digits[0] <= b'3' && digits.iter().all(|d| (b'0'..=b'7').contains(d))
}
