//! The JSON wire protocol.
//!
//! Semantically equivalent to the binary protocol: records become objects
//! keyed by member tags (or bare positional arrays for compact types),
//! sequences become arrays, mappings become string-keyed objects. A reserved
//! pseudo-field (`"class"` by default) carries the class name where the
//! static type alone cannot identify it.

mod de;
mod escape;
pub mod keys;
mod ser;

pub use de::JsonDeserializer;
pub use keys::register_key_parser;
pub use ser::JsonSerializer;

/// JSON-specific options. Layout options (`field_separator`, `indent`,
/// `max_oneline_fields`) are cosmetic and never change the decoded value.
#[derive(Debug, Clone)]
pub struct JsonOptions {
    pub field_separator: String,
    pub indent: String,
    /// Name of the reserved class pseudo-field.
    pub class_tag: String,
    /// Records whose members are all primitive and number at most this many
    /// print on a single line. Zero disables the oneline layout.
    pub max_oneline_fields: usize,
    /// Write the root record's class tag even when the static type already
    /// identifies it.
    pub save_root_class: bool,
    /// Force object-with-names form even for compact types.
    pub ignore_compact: bool,
    /// Write enum variants by name instead of wire value.
    pub enum_as_string: bool,
    /// Quote 64-bit integers, for consumers that parse numbers as doubles.
    pub int64_as_string: bool,
    /// Quote decimals.
    pub decimal_as_string: bool,
    /// Date format: `"O"` is the round-trip form
    /// `yyyy-MM-ddTHH:mm:ss.fffffff`; anything else is passed to chrono.
    pub date_format: String,
    /// Time span format; only the constant form `"c"` is supported.
    pub time_span_format: String,
    /// Accept object keys in any order. Record reads then complete a full
    /// key scan before checking required members.
    pub unordered: bool,
}

impl Default for JsonOptions {
    fn default() -> JsonOptions {
        JsonOptions {
            field_separator: "\n".to_string(),
            indent: "\t".to_string(),
            class_tag: "class".to_string(),
            max_oneline_fields: 0,
            save_root_class: false,
            ignore_compact: false,
            enum_as_string: false,
            int64_as_string: false,
            decimal_as_string: false,
            date_format: "O".to_string(),
            time_span_format: "c".to_string(),
            unordered: false,
        }
    }
}
