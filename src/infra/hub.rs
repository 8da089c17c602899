// ============================================================
// Layer 6 — Model Resolution (Hugging Face Hub)
// ============================================================
// Turns a model identifier into local file paths.
//
//   "./my_model"                  → an existing directory is used as-is
//   "EleutherAI/gpt-neo-125M"     → downloaded through hf-hub into the
//                                   shared HF cache (~/.cache/huggingface)
//
// Each model needs config.json and model.safetensors. The tokenizer is
// either a single tokenizer.json or a byte-level BPE vocab.json +
// merges.txt pair (older repos such as gpt-neo ship only the latter).

use anyhow::{anyhow, bail, Context, Result};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::path::{Path, PathBuf};

use crate::infra::weights::{CONFIG_FILE, WEIGHTS_FILE};

pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const VOCAB_FILE:     &str = "vocab.json";
pub const MERGES_FILE:    &str = "merges.txt";

#[derive(Debug, Clone, PartialEq)]
pub enum TokenizerFiles {
    Json(PathBuf),
    Bpe { vocab: PathBuf, merges: PathBuf },
}

#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config:    PathBuf,
    pub weights:   PathBuf,
    pub tokenizer: TokenizerFiles,
}

/// Resolve `model_id` to local files, downloading if it is not a directory.
pub fn resolve_model(model_id: &str) -> Result<ModelFiles> {
    let local = Path::new(model_id);
    if local.is_dir() {
        tracing::info!("Using local model directory '{}'", local.display());
        return resolve_local(local);
    }
    resolve_remote(model_id)
}

pub fn resolve_local(dir: &Path) -> Result<ModelFiles> {
    let config  = dir.join(CONFIG_FILE);
    let weights = dir.join(WEIGHTS_FILE);
    for required in [&config, &weights] {
        if !required.is_file() {
            bail!("Model directory '{}' has no {}", dir.display(), file_name(required));
        }
    }

    let json = dir.join(TOKENIZER_FILE);
    let tokenizer = if json.is_file() {
        TokenizerFiles::Json(json)
    } else {
        let vocab  = dir.join(VOCAB_FILE);
        let merges = dir.join(MERGES_FILE);
        if !vocab.is_file() || !merges.is_file() {
            bail!(
                "Model directory '{}' has neither {TOKENIZER_FILE} nor {VOCAB_FILE} + {MERGES_FILE}",
                dir.display()
            );
        }
        TokenizerFiles::Bpe { vocab, merges }
    };

    Ok(ModelFiles { config, weights, tokenizer })
}

fn resolve_remote(model_id: &str) -> Result<ModelFiles> {
    let api  = Api::new().context("Cannot initialise Hugging Face Hub client")?;
    let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));
    tracing::info!("Fetching '{}' from the Hugging Face Hub", model_id);

    let fetch = |file: &str| {
        repo.get(file)
            .map_err(|e| anyhow!("Cannot fetch {file} for model '{model_id}': {e}"))
    };

    let config  = fetch(CONFIG_FILE)?;
    let weights = fetch(WEIGHTS_FILE)?;
    let tokenizer = match repo.get(TOKENIZER_FILE) {
        Ok(path) => TokenizerFiles::Json(path),
        Err(e) => {
            tracing::debug!("{TOKENIZER_FILE} unavailable ({e}), falling back to {VOCAB_FILE} + {MERGES_FILE}");
            TokenizerFiles::Bpe {
                vocab:  fetch(VOCAB_FILE)?,
                merges: fetch(MERGES_FILE)?,
            }
        }
    };

    if let Some(dir) = config.parent() {
        tracing::info!("Model files cached under '{}'", dir.display());
    }
    Ok(ModelFiles { config, weights, tokenizer })
}

/// Short name used to key dataset caches by tokenizer:
/// "EleutherAI/gpt-neo-125M" → "gpt-neo-125M"
pub fn tokenizer_tag(model_id: &str) -> String {
    let trimmed = model_id.trim_end_matches(['/', '\\']);
    let tag = trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect::<String>();
    if tag.is_empty() { "model".to_string() } else { tag }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
