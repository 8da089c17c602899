// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The dataset builder is written against CorpusSource rather
// than a concrete file reader, so it only needs three things
// from a source: where it lives (for the cache file name), a
// fingerprint (for cache validation) and the text itself.
//
// Implementations:
//   - TextLoader → a plain UTF-8 text file on disk

use anyhow::Result;
use std::path::Path;

use crate::domain::corpus::{Corpus, SourceFingerprint};

// ─── CorpusSource ─────────────────────────────────────────────────────────────
pub trait CorpusSource {
    /// Path of the underlying file. Cache files are placed beside it.
    fn location(&self) -> &Path;

    /// Identify the current version of the source without reading it.
    /// Fails if the source does not exist.
    fn fingerprint(&self) -> Result<SourceFingerprint>;

    /// Read the full text of the source.
    fn load(&self) -> Result<Corpus>;
}
