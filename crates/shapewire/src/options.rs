//! Options shared by both wire protocols.

use std::sync::atomic::{AtomicU32, Ordering};

/// Which identifier a member is tagged with on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagMode {
    /// Explicit short alias when declared, member name otherwise.
    #[default]
    Aliases,
    /// Always the declared member name.
    Names,
    /// Dense generated short ids (see [`next_member_id`]).
    Ids,
}

/// Options honored by both the binary and the JSON codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonOptions {
    pub tag_mode: TagMode,
    /// Tolerate wire fields absent from the target shape (fields are decoded
    /// generically and dropped unless the type stores them).
    pub allow_unknown_fields: bool,
    /// Include the byte offset in parse errors.
    pub report_error_position: bool,
}

static MEMBER_ID_COUNTER: AtomicU32 = AtomicU32::new(0);

const ID_ALPHABET: &[u8; 52] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Returns the next generated member id for [`TagMode::Ids`].
///
/// Ids are four characters over the alphabet `A-Z a-z`, counting in base 52
/// with `A` as zero: `AAAB`, `AAAC`, .., `AAAZ`, `AAAa`, .., `AAAz`, `AABA`,
/// and so on. The successor function yields a total order under ordinal
/// comparison, which keeps id-tagged output diffable.
pub fn next_member_id() -> String {
    let mut n = MEMBER_ID_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    let mut id = [b'A'; 4];
    for slot in id.iter_mut().rev() {
        *slot = ID_ALPHABET[(n % 52) as usize];
        n /= 52;
    }
    String::from_utf8(id.to_vec()).expect("id alphabet is ASCII")
}
