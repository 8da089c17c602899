// ============================================================
// Layer 3 — Corpus Domain Type
// ============================================================
// A corpus is the full text of one training or evaluation file.
// The fingerprint identifies a particular version of that file
// so cached tokenisations can be matched against it.

use serde::{Deserialize, Serialize};

/// The complete text of a source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Corpus {
    /// Where the text came from (usually the file path)
    pub source: String,

    /// The file contents, unmodified
    pub text: String,
}

impl Corpus {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text:   text.into(),
        }
    }
}

/// Size and modification time of a source file at the moment
/// it was read. Two fingerprints compare equal only when both
/// fields match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFingerprint {
    /// Length of the file in bytes
    pub len: u64,

    /// Modification time in nanoseconds since the Unix epoch, if
    /// the platform reports one
    pub modified_nanos: Option<u64>,
}
