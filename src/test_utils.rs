// Shared fixtures for unit tests.

use std::str::FromStr;
use tokenizers::Tokenizer;

use crate::ml::model::{Architecture, CausalLmConfig};

/// "w0", "w1", ... "w{n-1}"
pub fn numbered_words(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("w{i}")).collect()
}

/// Whitespace-split word-level tokenizer: id 0 is [UNK], then one id
/// per word in order. No normaliser, so decode(encode(text)) == text
/// for single-space-separated known words.
pub fn word_level_tokenizer(words: &[String]) -> Tokenizer {
    let mut vocab = serde_json::Map::new();
    vocab.insert("[UNK]".to_string(), serde_json::json!(0));
    for (i, w) in words.iter().enumerate() {
        vocab.insert(w.clone(), serde_json::json!(i + 1));
    }

    let json = serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [
            {"id": 0, "content": "[UNK]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
        ],
        "normalizer": null,
        "pre_tokenizer": { "type": "WhitespaceSplit" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": "[UNK]"
        }
    });

    Tokenizer::from_str(&json.to_string()).unwrap()
}

/// Two-layer model small enough for CPU tests. GPT-Neo gets one
/// local layer (window 2) and one global layer.
pub fn tiny_config(architecture: Architecture) -> CausalLmConfig {
    let (windows, scale, bias) = match architecture {
        Architecture::Gpt2   => (vec![0, 0], true, true),
        Architecture::GptNeo => (vec![0, 2], false, false),
    };
    CausalLmConfig::new(architecture, 32, 16, 8, 2, 2, 32, windows)
        .with_scale_attention(scale)
        .with_qkv_bias(bias)
}
