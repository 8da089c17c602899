// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Loads the pre-trained tokenizer that belongs to a model and
// saves it next to the fine-tuned weights.
//
// Models that ship only vocab.json + merges.txt get a byte-level
// BPE tokenizer assembled as Hugging Face tokenizer JSON and
// loaded from that, the same JSON route used for every other
// tokenizer here:
//
//   vocab.json  ──┐
//                 ├──► tokenizer JSON ──► Tokenizer::from_str
//   merges.txt  ──┘
//
// The end-of-text token "<|endoftext|>" is registered as a special
// added token whenever it is in the vocabulary.

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Map, Value};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tokenizers::Tokenizer;

use crate::infra::hub::{TokenizerFiles, TOKENIZER_FILE};

pub const END_OF_TEXT: &str = "<|endoftext|>";

/// tokenizer.json inside a model directory
pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(TOKENIZER_FILE)
    }

    #[cfg(test)]
    pub fn load(&self) -> Result<Tokenizer> {
        let path = self.path();
        Tokenizer::from_file(&path)
            .map_err(|e| anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))
    }

    /// Write tokenizer.json, creating the directory if needed.
    pub fn save(&self, tokenizer: &Tokenizer) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;
        let path = self.path();
        tokenizer
            .save(&path, true)
            .map_err(|e| anyhow!("Cannot save tokenizer to '{}': {}", path.display(), e))?;
        tracing::info!("Tokenizer saved to '{}'", path.display());
        Ok(())
    }
}

/// Load the tokenizer described by resolved model files.
pub fn load_tokenizer(files: &TokenizerFiles) -> Result<Tokenizer> {
    match files {
        TokenizerFiles::Json(path) => Tokenizer::from_file(path)
            .map_err(|e| anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e)),
        TokenizerFiles::Bpe { vocab, merges } => {
            let json = byte_level_bpe_json(vocab, merges)?;
            let tokenizer = Tokenizer::from_str(&json.to_string())
                .map_err(|e| anyhow!("Cannot build BPE tokenizer from '{}': {}", vocab.display(), e))?;
            tracing::info!(
                "Built byte-level BPE tokenizer ({} tokens) from '{}'",
                tokenizer.get_vocab_size(true),
                vocab.display()
            );
            Ok(tokenizer)
        }
    }
}

/// Token ids for `text` with no special tokens added
pub fn encode_ids(tokenizer: &Tokenizer, text: &str) -> Result<Vec<u32>> {
    let encoding = tokenizer
        .encode(text, false)
        .map_err(|e| anyhow!("Tokenization failed: {e}"))?;
    Ok(encoding.get_ids().to_vec())
}

pub fn decode_ids(tokenizer: &Tokenizer, ids: &[u32]) -> Result<String> {
    tokenizer
        .decode(ids, true)
        .map_err(|e| anyhow!("Detokenization failed: {e}"))
}

fn byte_level_bpe_json(vocab_path: &Path, merges_path: &Path) -> Result<Value> {
    let vocab_text = fs::read_to_string(vocab_path)
        .with_context(|| format!("Cannot read '{}'", vocab_path.display()))?;
    let vocab: Map<String, Value> = serde_json::from_str(&vocab_text)
        .with_context(|| format!("'{}' is not a JSON token → id map", vocab_path.display()))?;

    let merges_text = fs::read_to_string(merges_path)
        .with_context(|| format!("Cannot read '{}'", merges_path.display()))?;
    // First line is a "#version: ..." header
    let merges: Vec<&str> = merges_text
        .lines()
        .filter(|l| !l.trim().is_empty() && !l.starts_with("#version"))
        .collect();

    let added_tokens: Vec<Value> = vocab
        .get(END_OF_TEXT)
        .and_then(Value::as_u64)
        .map(|id| {
            json!({
                "id": id, "content": END_OF_TEXT, "single_word": false,
                "lstrip": false, "rstrip": false, "normalized": true, "special": true
            })
        })
        .into_iter()
        .collect();

    let byte_level = json!({
        "type": "ByteLevel", "add_prefix_space": false, "trim_offsets": true, "use_regex": true
    });

    Ok(json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens,
        "normalizer": null,
        "pre_tokenizer": byte_level,
        "post_processor": byte_level,
        "decoder": byte_level,
        "model": {
            "type": "BPE",
            "dropout": null,
            "unk_token": null,
            "continuing_subword_prefix": "",
            "end_of_word_suffix": "",
            "fuse_unk": false,
            "byte_fallback": false,
            "vocab": vocab,
            "merges": merges
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{numbered_words, word_level_tokenizer};

    /// Byte-level BPE over "hello world": Ġ is the byte-level space
    fn write_bpe_files(dir: &Path) -> TokenizerFiles {
        let vocab = json!({
            "h": 0, "e": 1, "l": 2, "o": 3, "Ġ": 4, "w": 5, "r": 6, "d": 7,
            "he": 8, "ll": 9, "llo": 10, "hello": 11, "Ġw": 12, END_OF_TEXT: 13
        });
        let vocab_path  = dir.join("vocab.json");
        let merges_path = dir.join("merges.txt");
        fs::write(&vocab_path, vocab.to_string()).unwrap();
        fs::write(&merges_path, "#version: 0.2\nh e\nl l\nll o\nhe llo\nĠ w\n").unwrap();
        TokenizerFiles::Bpe { vocab: vocab_path, merges: merges_path }
    }

    #[test]
    fn test_byte_level_bpe_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let tokenizer = load_tokenizer(&write_bpe_files(dir.path())).unwrap();

        let ids = encode_ids(&tokenizer, "hello world").unwrap();
        assert_eq!(&ids[..2], &[11, 12]);
        assert_eq!(decode_ids(&tokenizer, &ids).unwrap(), "hello world");
    }

    #[test]
    fn test_end_of_text_is_one_token() {
        let dir = tempfile::tempdir().unwrap();
        let tokenizer = load_tokenizer(&write_bpe_files(dir.path())).unwrap();

        let ids = encode_ids(&tokenizer, "hello<|endoftext|>").unwrap();
        assert_eq!(ids, vec![11, 13]);
    }

    #[test]
    fn test_word_level_encode_decode() {
        let words = numbered_words(5);
        let tokenizer = word_level_tokenizer(&words);
        let ids = encode_ids(&tokenizer, "w0 w3 w4").unwrap();
        assert_eq!(ids, vec![1, 4, 5]);
        assert_eq!(decode_ids(&tokenizer, &ids).unwrap(), "w0 w3 w4");
    }

    #[test]
    fn test_store_save_then_load() {
        let dir   = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path().join("model"));
        let tokenizer = word_level_tokenizer(&numbered_words(3));

        store.save(&tokenizer).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(encode_ids(&loaded, "w2 w1").unwrap(), vec![3, 2]);
    }

    #[test]
    fn test_missing_tokenizer_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TokenizerStore::new(dir.path()).load().is_err());
    }
}
