// ============================================================
// Layer 6 — Hugging Face config.json
// ============================================================
// Translates between the Hub's config.json layout and
// CausalLmConfig. Two model types are understood:
//
//   gpt2     n_embd / n_layer / n_head / n_positions / n_inner
//   gpt_neo  hidden_size / num_layers / num_heads /
//            max_position_embeddings / intermediate_size /
//            attention_types / window_size
//
// GPT-Neo's attention_types is run-length encoded:
//   [[["global", "local"], 6]]  →  global, local, global, local, ... (12 layers)
//
// Writing produces a config.json the same loader (and the Python
// stack) can read back.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::{fs, path::Path};

use crate::ml::model::{Architecture, CausalLmConfig};

/// GPT-Neo window when config.json does not name one
const DEFAULT_NEO_WINDOW: usize = 256;

pub fn read_config(path: &Path) -> Result<CausalLmConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read model config '{}'", path.display()))?;
    let json: Value = serde_json::from_str(&text)
        .with_context(|| format!("Model config '{}' is not valid JSON", path.display()))?;
    parse_config(&json).with_context(|| format!("Unsupported model config '{}'", path.display()))
}

pub fn write_config(config: &CausalLmConfig, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&to_hf_json(config))?;
    fs::write(path, json).with_context(|| format!("Cannot write model config '{}'", path.display()))
}

pub fn parse_config(json: &Value) -> Result<CausalLmConfig> {
    let model_type = json
        .get("model_type")
        .and_then(Value::as_str)
        .context("config has no model_type")?;

    if let Some(act) = json.get("activation_function").and_then(Value::as_str) {
        if act != "gelu_new" {
            bail!("activation_function '{act}' is not supported (expected gelu_new)");
        }
    }

    let config = match model_type {
        "gpt2" => {
            let hidden = usize_field(json, "n_embd")?;
            let layers = usize_field(json, "n_layer")?;
            CausalLmConfig::new(
                Architecture::Gpt2,
                usize_field(json, "vocab_size")?,
                usize_field(json, "n_positions")?,
                hidden,
                layers,
                usize_field(json, "n_head")?,
                optional_usize(json, "n_inner").unwrap_or(4 * hidden),
                vec![0; layers],
            )
            .with_layer_norm_epsilon(optional_f64(json, "layer_norm_epsilon").unwrap_or(1e-5))
            .with_dropout(optional_f64(json, "resid_pdrop").unwrap_or(0.1))
            .with_scale_attention(true)
            .with_qkv_bias(true)
        }
        "gpt_neo" => {
            let hidden = usize_field(json, "hidden_size")?;
            let layers = usize_field(json, "num_layers")?;
            let window = optional_usize(json, "window_size").unwrap_or(DEFAULT_NEO_WINDOW);
            let windows = expand_attention_types(json, layers)?
                .iter()
                .map(|kind| match kind.as_str() {
                    "global" => Ok(0),
                    "local"  => Ok(window),
                    other    => bail!("unknown attention type '{other}'"),
                })
                .collect::<Result<Vec<_>>>()?;

            CausalLmConfig::new(
                Architecture::GptNeo,
                usize_field(json, "vocab_size")?,
                usize_field(json, "max_position_embeddings")?,
                hidden,
                layers,
                usize_field(json, "num_heads")?,
                optional_usize(json, "intermediate_size").unwrap_or(4 * hidden),
                windows,
            )
            .with_layer_norm_epsilon(optional_f64(json, "layer_norm_epsilon").unwrap_or(1e-5))
            .with_dropout(optional_f64(json, "resid_dropout").unwrap_or(0.0))
            .with_scale_attention(false)
            .with_qkv_bias(false)
        }
        other => bail!("model_type '{other}' is not supported (expected gpt2 or gpt_neo)"),
    };

    config.validate()?;
    Ok(config)
}

pub fn to_hf_json(config: &CausalLmConfig) -> Value {
    match config.architecture {
        Architecture::Gpt2 => json!({
            "architectures":       ["GPT2LMHeadModel"],
            "model_type":          "gpt2",
            "vocab_size":          config.vocab_size,
            "n_positions":         config.max_position_embeddings,
            "n_ctx":               config.max_position_embeddings,
            "n_embd":              config.hidden_size,
            "n_layer":             config.num_layers,
            "n_head":              config.num_heads,
            "n_inner":             config.intermediate_size,
            "layer_norm_epsilon":  config.layer_norm_epsilon,
            "resid_pdrop":         config.dropout,
            "embd_pdrop":          config.dropout,
            "attn_pdrop":          config.dropout,
            "activation_function": "gelu_new",
            "torch_dtype":         "float32",
        }),
        Architecture::GptNeo => {
            let kinds: Vec<&str> = config
                .attention_windows
                .iter()
                .map(|&w| if w == 0 { "global" } else { "local" })
                .collect();
            let window = config
                .attention_windows
                .iter()
                .copied()
                .find(|&w| w > 0)
                .unwrap_or(DEFAULT_NEO_WINDOW);

            json!({
                "architectures":           ["GPTNeoForCausalLM"],
                "model_type":              "gpt_neo",
                "vocab_size":              config.vocab_size,
                "max_position_embeddings": config.max_position_embeddings,
                "hidden_size":             config.hidden_size,
                "num_layers":              config.num_layers,
                "num_heads":               config.num_heads,
                "intermediate_size":       config.intermediate_size,
                "attention_types":         [[kinds.clone(), 1]],
                "attention_layers":        kinds,
                "window_size":             window,
                "layer_norm_epsilon":      config.layer_norm_epsilon,
                "resid_dropout":           config.dropout,
                "embed_dropout":           config.dropout,
                "attention_dropout":       config.dropout,
                "activation_function":     "gelu_new",
                "torch_dtype":             "float32",
            })
        }
    }
}

/// Expand GPT-Neo's [[pattern, repeat], ...] into one entry per layer.
fn expand_attention_types(json: &Value, layers: usize) -> Result<Vec<String>> {
    let Some(layout) = json.get("attention_types").and_then(Value::as_array) else {
        return Ok(vec!["global".to_string(); layers]);
    };

    let mut kinds = Vec::with_capacity(layers);
    for entry in layout {
        let pattern = entry.get(0).and_then(Value::as_array).context("malformed attention_types")?;
        let repeat  = entry.get(1).and_then(Value::as_u64).context("malformed attention_types")?;
        for _ in 0..repeat {
            for kind in pattern {
                kinds.push(kind.as_str().context("malformed attention_types")?.to_string());
            }
        }
    }

    if kinds.len() != layers {
        bail!("attention_types describes {} layers but num_layers is {}", kinds.len(), layers);
    }
    Ok(kinds)
}

fn usize_field(json: &Value, key: &str) -> Result<usize> {
    optional_usize(json, key).with_context(|| format!("config is missing '{key}'"))
}

fn optional_usize(json: &Value, key: &str) -> Option<usize> {
    json.get(key).and_then(Value::as_u64).map(|v| v as usize)
}

fn optional_f64(json: &Value, key: &str) -> Option<f64> {
    json.get(key).and_then(Value::as_f64)
}
