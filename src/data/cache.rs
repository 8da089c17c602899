// ============================================================
// Layer 4 — Tokenised Block Cache
// ============================================================
// Tokenising a large corpus is slow, so the blocks produced for
// a file are cached beside it:
//
//   data/
//     train.txt
//     cached_lm_gpt-neo-125M_128_train.txt.json
//     cached_lm_gpt-neo-125M_128_train.txt.json.lock
//
// The cache stores the source fingerprint (length + mtime) and
// the block size. A cache whose fingerprint or block size does
// not match the current source is treated as absent.
//
// Building is serialised through an exclusive lock on the .lock
// file (fs2), so two processes pointed at the same corpus do not
// tokenise it twice or interleave writes. Writes go to a .tmp
// file first and are renamed into place.

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
};

use crate::domain::corpus::SourceFingerprint;
use crate::domain::token_block::TokenBlock;

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    block_size: usize,
    source:     SourceFingerprint,
    blocks:     Vec<TokenBlock>,
}

pub struct BlockCache {
    path: PathBuf,
}

impl BlockCache {
    /// Cache location for `source` tokenised with `tokenizer_tag`
    /// at `block_size`.
    pub fn for_source(source: &Path, tokenizer_tag: &str, block_size: usize) -> Self {
        let dir = source.parent().unwrap_or_else(|| Path::new("."));
        let file_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("corpus");

        let path = dir.join(format!("cached_lm_{tokenizer_tag}_{block_size}_{file_name}.json"));
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the exclusive build lock. Blocks until it is available;
    /// released when the returned file is dropped.
    pub fn lock(&self) -> Result<File> {
        let lock_path = lock_path(&self.path);
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Cannot open cache lock '{}'", lock_path.display()))?;

        lock_file
            .lock_exclusive()
            .with_context(|| format!("Cannot lock '{}'", lock_path.display()))?;
        Ok(lock_file)
    }

    /// Cached blocks, if a cache exists for this exact source version
    /// and block size. An unreadable or corrupt cache counts as a miss.
    pub fn load(
        &self,
        fingerprint: &SourceFingerprint,
        block_size:  usize,
    ) -> Result<Option<Vec<TokenBlock>>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read cache '{}'", self.path.display()))?;

        let cached: CacheFile = match serde_json::from_str(&json) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Ignoring corrupt cache '{}': {}", self.path.display(), e);
                return Ok(None);
            }
        };

        if cached.block_size != block_size || cached.source != *fingerprint {
            tracing::info!("Cache '{}' is stale, rebuilding", self.path.display());
            return Ok(None);
        }

        Ok(Some(cached.blocks))
    }

    /// Write blocks for this source version, replacing any old cache.
    pub fn store(
        &self,
        fingerprint: &SourceFingerprint,
        block_size:  usize,
        blocks:      &[TokenBlock],
    ) -> Result<()> {
        let cached = CacheFile {
            block_size,
            source: *fingerprint,
            blocks: blocks.to_vec(),
        };

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_string(&cached)?)
            .with_context(|| format!("Cannot write cache '{}'", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Cannot move cache into '{}'", self.path.display()))?;

        tracing::debug!("Cached {} blocks at '{}'", blocks.len(), self.path.display());
        Ok(())
    }
}

fn lock_path(cache_path: &Path) -> PathBuf {
    let mut name = cache_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(len: u64) -> SourceFingerprint {
        SourceFingerprint { len, modified_nanos: Some(1_700_000_000_000_000_000) }
    }

    #[test]
    fn test_cache_name_includes_tag_and_block_size() {
        let cache = BlockCache::for_source(Path::new("data/train.txt"), "gpt2", 128);
        assert_eq!(cache.path(), Path::new("data/cached_lm_gpt2_128_train.txt.json"));
    }

    #[test]
    fn test_store_then_load_hits() {
        let dir   = tempfile::tempdir().unwrap();
        let cache = BlockCache::for_source(&dir.path().join("t.txt"), "tok", 2);
        let blocks = vec![TokenBlock::new(vec![1, 2]), TokenBlock::new(vec![3, 4])];

        let _lock = cache.lock().unwrap();
        cache.store(&fp(10), 2, &blocks).unwrap();

        assert_eq!(cache.load(&fp(10), 2).unwrap(), Some(blocks));
    }

    #[test]
    fn test_changed_source_misses() {
        let dir   = tempfile::tempdir().unwrap();
        let cache = BlockCache::for_source(&dir.path().join("t.txt"), "tok", 2);
        cache.store(&fp(10), 2, &[TokenBlock::new(vec![1, 2])]).unwrap();

        assert_eq!(cache.load(&fp(11), 2).unwrap(), None);
        assert_eq!(cache.load(&fp(10), 4).unwrap(), None);
    }

    #[test]
    fn test_corrupt_cache_misses() {
        let dir   = tempfile::tempdir().unwrap();
        let cache = BlockCache::for_source(&dir.path().join("t.txt"), "tok", 2);
        fs::write(cache.path(), "{not json").unwrap();

        assert_eq!(cache.load(&fp(10), 2).unwrap(), None);
    }
}
