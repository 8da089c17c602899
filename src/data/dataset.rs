// ============================================================
// Layer 4 — Block Dataset
// ============================================================
// BlockDataset holds the fixed-length token blocks of one text
// file and implements Burn's Dataset trait so a DataLoader can
// index into it.
//
// TextDatasetBuilder produces a BlockDataset from a source:
//
//   source file ──fingerprint──► cache hit? ──yes──► blocks
//        │                           │
//        │                           no
//        ▼                           ▼
//   read text ──► tokenise ──► BlockChunker ──► store cache ──► blocks
//
// Tokenisation adds no special tokens: blocks are cut straight
// out of the raw id stream.

use anyhow::{Context, Result};
use burn::data::dataset::Dataset;
use tokenizers::Tokenizer;

use crate::data::{cache::BlockCache, chunker::BlockChunker};
use crate::domain::token_block::TokenBlock;
use crate::domain::traits::CorpusSource;
use crate::infra::tokenizer_store::encode_ids;

pub struct BlockDataset {
    blocks:     Vec<TokenBlock>,
    block_size: usize,
}

impl BlockDataset {
    pub fn new(blocks: Vec<TokenBlock>, block_size: usize) -> Self {
        Self { blocks, block_size }
    }

    pub fn block_size(&self) -> usize { self.block_size }

    pub fn block_count(&self) -> usize { self.blocks.len() }

    #[cfg(test)]
    pub fn blocks(&self) -> &[TokenBlock] { &self.blocks }
}

impl Dataset<TokenBlock> for BlockDataset {
    fn get(&self, index: usize) -> Option<TokenBlock> {
        self.blocks.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.blocks.len()
    }
}

/// Builds a BlockDataset from a corpus source.
pub struct TextDatasetBuilder<'a> {
    tokenizer:       &'a Tokenizer,
    /// Names the tokenizer in cache file names
    tokenizer_tag:   String,
    block_size:      usize,
    use_cache:       bool,
    overwrite_cache: bool,
}

impl<'a> TextDatasetBuilder<'a> {
    pub fn new(tokenizer: &'a Tokenizer, tokenizer_tag: impl Into<String>, block_size: usize) -> Self {
        Self {
            tokenizer,
            tokenizer_tag: tokenizer_tag.into(),
            block_size,
            use_cache: true,
            overwrite_cache: false,
        }
    }

    /// Read and write the on-disk block cache (default: on)
    #[cfg(test)]
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Ignore any existing cache and rebuild it
    pub fn overwrite_cache(mut self, overwrite: bool) -> Self {
        self.overwrite_cache = overwrite;
        self
    }

    pub fn build(&self, source: &impl CorpusSource) -> Result<BlockDataset> {
        let chunker     = BlockChunker::new(self.block_size)?;
        let fingerprint = source.fingerprint()?;

        if !self.use_cache {
            let blocks = self.tokenize_and_chunk(source, &chunker)?;
            return Ok(BlockDataset::new(blocks, self.block_size));
        }

        let cache = BlockCache::for_source(source.location(), &self.tokenizer_tag, self.block_size);
        let _lock = cache.lock()?;

        if !self.overwrite_cache {
            if let Some(blocks) = cache.load(&fingerprint, self.block_size)? {
                tracing::info!(
                    "Loaded {} blocks for '{}' from cache '{}'",
                    blocks.len(),
                    source.location().display(),
                    cache.path().display()
                );
                return Ok(BlockDataset::new(blocks, self.block_size));
            }
        }

        let blocks = self.tokenize_and_chunk(source, &chunker)?;
        cache.store(&fingerprint, self.block_size, &blocks)?;
        Ok(BlockDataset::new(blocks, self.block_size))
    }

    fn tokenize_and_chunk(
        &self,
        source:  &impl CorpusSource,
        chunker: &BlockChunker,
    ) -> Result<Vec<TokenBlock>> {
        let corpus = source.load()?;
        let ids = encode_ids(self.tokenizer, &corpus.text)
            .with_context(|| format!("Cannot tokenise '{}'", corpus.source))?;

        let blocks = chunker.chunk(&ids);
        if blocks.is_empty() {
            tracing::warn!(
                "'{}' has {} tokens, fewer than one block of {}; dataset is empty",
                corpus.source,
                ids.len(),
                chunker.block_size()
            );
        } else {
            tracing::info!(
                "Tokenised '{}': {} tokens -> {} blocks of {}",
                corpus.source,
                ids.len(),
                blocks.len(),
                chunker.block_size()
            );
        }
        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::TextLoader;
    use crate::test_utils::{numbered_words, word_level_tokenizer};
    use std::fs;

    fn write_corpus(dir: &std::path::Path, name: &str, word_count: usize) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, numbered_words(word_count).join(" ")).unwrap();
        path
    }

    #[test]
    fn test_256_tokens_make_two_blocks() {
        let dir  = tempfile::tempdir().unwrap();
        let tok  = word_level_tokenizer(&numbered_words(300));
        let path = write_corpus(dir.path(), "train.txt", 256);

        let ds = TextDatasetBuilder::new(&tok, "words", 128)
            .build(&TextLoader::new(&path))
            .unwrap();

        assert_eq!(ds.len(), 2);
        assert!(ds.blocks().iter().all(|b| b.len() == 128));
    }

    #[test]
    fn test_130_tokens_make_one_block() {
        let dir  = tempfile::tempdir().unwrap();
        let tok  = word_level_tokenizer(&numbered_words(300));
        let path = write_corpus(dir.path(), "train.txt", 130);

        let ds = TextDatasetBuilder::new(&tok, "words", 128)
            .with_cache(false)
            .build(&TextLoader::new(&path))
            .unwrap();

        assert_eq!(ds.len(), 1);
        // First block starts at the first word of the file
        assert_eq!(ds.get(0).unwrap().ids[0], tok.token_to_id("w0").unwrap());
    }

    #[test]
    fn test_short_file_gives_empty_dataset() {
        let dir  = tempfile::tempdir().unwrap();
        let tok  = word_level_tokenizer(&numbered_words(300));
        let path = write_corpus(dir.path(), "tiny.txt", 10);

        let ds = TextDatasetBuilder::new(&tok, "words", 128)
            .build(&TextLoader::new(&path))
            .unwrap();

        assert!(ds.is_empty());
    }

    #[test]
    fn test_block_count_is_floor_of_tokens_over_block_size() {
        let dir = tempfile::tempdir().unwrap();
        let tok = word_level_tokenizer(&numbered_words(100));
        for (words, block) in [(100usize, 7usize), (49, 7), (6, 7), (64, 16)] {
            let path = write_corpus(dir.path(), &format!("c{words}_{block}.txt"), words);
            let ds = TextDatasetBuilder::new(&tok, "words", block)
                .build(&TextLoader::new(&path))
                .unwrap();
            assert_eq!(ds.len(), words / block);
        }
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let tok = word_level_tokenizer(&numbered_words(10));
        let result = TextDatasetBuilder::new(&tok, "words", 4)
            .build(&TextLoader::new(dir.path().join("missing.txt")));
        assert!(result.is_err());
    }

    #[test]
    fn test_cache_is_written_and_invalidated() {
        let dir  = tempfile::tempdir().unwrap();
        let tok  = word_level_tokenizer(&numbered_words(300));
        let path = write_corpus(dir.path(), "train.txt", 40);
        let builder = TextDatasetBuilder::new(&tok, "words", 8);

        assert_eq!(builder.build(&TextLoader::new(&path)).unwrap().len(), 5);
        let cache = BlockCache::for_source(&path, "words", 8);
        assert!(cache.path().exists());

        // Growing the file changes its fingerprint, so the cache is rebuilt
        write_corpus(dir.path(), "train.txt", 80);
        assert_eq!(builder.build(&TextLoader::new(&path)).unwrap().len(), 10);
    }
}
