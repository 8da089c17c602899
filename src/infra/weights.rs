// ============================================================
// Layer 6 — Pre-trained Weights (safetensors)
// ============================================================
// Loads Hugging Face safetensors checkpoints into a CausalLm and
// writes a CausalLm back out in the same layout.
//
// Tensor names follow the source architecture, with or without
// the "transformer." prefix:
//
//   shared   wte.weight  wpe.weight  ln_f.{weight,bias}
//            h.{i}.ln_1.{weight,bias}  h.{i}.ln_2.{weight,bias}
//
//   gpt2     h.{i}.attn.c_attn.{weight,bias}   [H, 3H] fused q|k|v
//            h.{i}.attn.c_proj.{weight,bias}
//            h.{i}.mlp.c_fc.{weight,bias}
//            h.{i}.mlp.c_proj.{weight,bias}
//
//   gpt_neo  h.{i}.attn.attention.{q,k,v}_proj.weight
//            h.{i}.attn.attention.out_proj.{weight,bias}
//            h.{i}.mlp.c_fc.{weight,bias}
//            h.{i}.mlp.c_proj.{weight,bias}
//
// GPT-2 uses Conv1D modules whose weights are stored [in, out],
// the same layout as Burn's Linear. GPT-Neo uses torch nn.Linear,
// stored [out, in], so those weights are transposed on the way in
// and on the way out.
//
// The LM head is tied to wte and is never stored separately.

use anyhow::{anyhow, bail, Context, Result};
use burn::{
    module::Param,
    nn::{LayerNorm, Linear},
    prelude::*,
};
use half::{bf16, f16};
use safetensors::{tensor::TensorView, Dtype, SafeTensors};
use std::{collections::HashMap, fs, path::Path};

use crate::infra::hf_config::write_config;
use crate::ml::model::{Architecture, CausalLm, CausalLmConfig, DecoderBlock};

pub const CONFIG_FILE:  &str = "config.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";

// ─── Loading ──────────────────────────────────────────────────────────────────

/// Build a model from `config` and fill it from a safetensors file.
pub fn load_model<B: Backend>(
    config: &CausalLmConfig,
    path:   &Path,
    device: &B::Device,
) -> Result<CausalLm<B>> {
    let bytes = fs::read(path)
        .with_context(|| format!("Cannot read weights '{}'", path.display()))?;
    let tensors = SafeTensors::deserialize(&bytes)
        .with_context(|| format!("'{}' is not a valid safetensors file", path.display()))?;
    let reader = WeightReader::new(&tensors);

    let mut model = config.init::<B>(device);
    assign(&mut model.token_embedding.weight, reader.read("wte.weight", device)?, "wte.weight")?;
    assign(&mut model.position_embedding.weight, reader.read("wpe.weight", device)?, "wpe.weight")?;
    load_layer_norm(&mut model.final_norm, &reader, "ln_f", device)?;

    for (i, block) in model.blocks.iter_mut().enumerate() {
        let prefix = format!("h.{i}");
        load_layer_norm(&mut block.norm1, &reader, &format!("{prefix}.ln_1"), device)?;
        load_layer_norm(&mut block.norm2, &reader, &format!("{prefix}.ln_2"), device)?;
        match config.architecture {
            Architecture::Gpt2   => load_gpt2_block(block, &reader, &prefix, config.hidden_size, device)?,
            Architecture::GptNeo => load_neo_block(block, &reader, &prefix, device)?,
        }
    }

    tracing::info!(
        "Loaded {} tensors from '{}' ({:?}, {} layers)",
        tensors.len(),
        path.display(),
        config.architecture,
        config.num_layers
    );
    Ok(model)
}

/// Read config.json and model.safetensors from a saved model directory.
#[cfg(test)]
pub fn load_pretrained<B: Backend>(dir: &Path, device: &B::Device) -> Result<(CausalLmConfig, CausalLm<B>)> {
    let config = crate::infra::hf_config::read_config(&dir.join(CONFIG_FILE))?;
    let model  = load_model(&config, &dir.join(WEIGHTS_FILE), device)?;
    Ok((config, model))
}

struct WeightReader<'a> {
    tensors: &'a SafeTensors<'a>,
    prefix:  &'static str,
}

impl<'a> WeightReader<'a> {
    fn new(tensors: &'a SafeTensors<'a>) -> Self {
        let prefixed = tensors.names().iter().any(|n| n.starts_with("transformer."));
        Self {
            tensors,
            prefix: if prefixed { "transformer." } else { "" },
        }
    }

    fn read<B: Backend, const D: usize>(&self, name: &str, device: &B::Device) -> Result<Tensor<B, D>> {
        let full = format!("{}{}", self.prefix, name);
        let view = self
            .tensors
            .tensor(&full)
            .with_context(|| format!("Weights are missing tensor '{full}'"))?;

        if view.shape().len() != D {
            bail!("Tensor '{full}' has rank {}, expected {D}", view.shape().len());
        }
        let values = decode_f32(view.dtype(), view.data())
            .with_context(|| format!("Cannot decode tensor '{full}'"))?;

        Ok(Tensor::from_data(TensorData::new(values, view.shape().to_vec()), device))
    }
}

/// Little-endian raw bytes → f32 values
fn decode_f32(dtype: Dtype, raw: &[u8]) -> Result<Vec<f32>> {
    Ok(match dtype {
        Dtype::F32 => raw
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        Dtype::F16 => raw
            .chunks_exact(2)
            .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        Dtype::BF16 => raw
            .chunks_exact(2)
            .map(|c| bf16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        other => bail!("unsupported dtype {other:?}"),
    })
}

fn assign<B: Backend, const D: usize>(
    param:  &mut Param<Tensor<B, D>>,
    tensor: Tensor<B, D>,
    name:   &str,
) -> Result<()> {
    let expected = param.val().dims();
    let found    = tensor.dims();
    if expected != found {
        bail!("Tensor '{name}' has shape {found:?}, model expects {expected:?}");
    }
    *param = Param::from_tensor(tensor);
    Ok(())
}

fn load_layer_norm<B: Backend>(
    norm:   &mut LayerNorm<B>,
    reader: &WeightReader,
    prefix: &str,
    device: &B::Device,
) -> Result<()> {
    assign(&mut norm.gamma, reader.read(&format!("{prefix}.weight"), device)?, prefix)?;
    assign(&mut norm.beta, reader.read(&format!("{prefix}.bias"), device)?, prefix)
}

/// Weights stored [in, out] (Conv1D): copied as-is
fn load_conv1d<B: Backend>(
    linear: &mut Linear<B>,
    reader: &WeightReader,
    prefix: &str,
    device: &B::Device,
) -> Result<()> {
    assign(&mut linear.weight, reader.read(&format!("{prefix}.weight"), device)?, prefix)?;
    if let Some(bias) = linear.bias.as_mut() {
        assign(bias, reader.read(&format!("{prefix}.bias"), device)?, prefix)?;
    }
    Ok(())
}

/// Weights stored [out, in] (nn.Linear): transposed
fn load_torch_linear<B: Backend>(
    linear: &mut Linear<B>,
    reader: &WeightReader,
    prefix: &str,
    device: &B::Device,
) -> Result<()> {
    let weight: Tensor<B, 2> = reader.read(&format!("{prefix}.weight"), device)?;
    assign(&mut linear.weight, weight.transpose(), prefix)?;
    if let Some(bias) = linear.bias.as_mut() {
        assign(bias, reader.read(&format!("{prefix}.bias"), device)?, prefix)?;
    }
    Ok(())
}

fn load_gpt2_block<B: Backend>(
    block:  &mut DecoderBlock<B>,
    reader: &WeightReader,
    prefix: &str,
    hidden: usize,
    device: &B::Device,
) -> Result<()> {
    let name = format!("{prefix}.attn.c_attn");
    let fused_w: Tensor<B, 2> = reader.read(&format!("{name}.weight"), device)?; // [H, 3H]
    let fused_b: Tensor<B, 1> = reader.read(&format!("{name}.bias"), device)?;   // [3H]
    if fused_w.dims() != [hidden, 3 * hidden] {
        bail!("Tensor '{name}.weight' has shape {:?}, expected [{hidden}, {}]", fused_w.dims(), 3 * hidden);
    }

    let attn = &mut block.attn;
    for (idx, linear) in [&mut attn.query, &mut attn.key, &mut attn.value].into_iter().enumerate() {
        let cols = idx * hidden..(idx + 1) * hidden;
        assign(&mut linear.weight, fused_w.clone().slice([0..hidden, cols.clone()]), &name)?;
        if let Some(bias) = linear.bias.as_mut() {
            assign(bias, fused_b.clone().slice([cols]), &name)?;
        }
    }

    load_conv1d(&mut block.attn.output, reader, &format!("{prefix}.attn.c_proj"), device)?;
    load_conv1d(&mut block.mlp_fc, reader, &format!("{prefix}.mlp.c_fc"), device)?;
    load_conv1d(&mut block.mlp_proj, reader, &format!("{prefix}.mlp.c_proj"), device)
}

fn load_neo_block<B: Backend>(
    block:  &mut DecoderBlock<B>,
    reader: &WeightReader,
    prefix: &str,
    device: &B::Device,
) -> Result<()> {
    let attn = format!("{prefix}.attn.attention");
    load_torch_linear(&mut block.attn.query, reader, &format!("{attn}.q_proj"), device)?;
    load_torch_linear(&mut block.attn.key, reader, &format!("{attn}.k_proj"), device)?;
    load_torch_linear(&mut block.attn.value, reader, &format!("{attn}.v_proj"), device)?;
    load_torch_linear(&mut block.attn.output, reader, &format!("{attn}.out_proj"), device)?;
    load_torch_linear(&mut block.mlp_fc, reader, &format!("{prefix}.mlp.c_fc"), device)?;
    load_torch_linear(&mut block.mlp_proj, reader, &format!("{prefix}.mlp.c_proj"), device)
}

// ─── Saving ───────────────────────────────────────────────────────────────────

/// Write config.json and model.safetensors into `dir`, creating it if
/// needed and overwriting existing files.
pub fn save_pretrained<B: Backend>(model: &CausalLm<B>, config: &CausalLmConfig, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Cannot create model directory '{}'", dir.display()))?;
    write_config(config, &dir.join(CONFIG_FILE))?;
    save_weights(model, config.architecture, &dir.join(WEIGHTS_FILE))?;
    tracing::info!("Saved model to '{}'", dir.display());
    Ok(())
}

fn save_weights<B: Backend>(model: &CausalLm<B>, architecture: Architecture, path: &Path) -> Result<()> {
    let mut w = WeightWriter::default();

    w.add("transformer.wte.weight", model.token_embedding.weight.val())?;
    w.add("transformer.wpe.weight", model.position_embedding.weight.val())?;
    w.add_layer_norm("transformer.ln_f", &model.final_norm)?;

    for (i, block) in model.blocks.iter().enumerate() {
        let prefix = format!("transformer.h.{i}");
        w.add_layer_norm(&format!("{prefix}.ln_1"), &block.norm1)?;
        w.add_layer_norm(&format!("{prefix}.ln_2"), &block.norm2)?;

        let attn = &block.attn;
        match architecture {
            Architecture::Gpt2 => {
                let fused_w = Tensor::cat(
                    vec![attn.query.weight.val(), attn.key.weight.val(), attn.value.weight.val()],
                    1,
                );
                w.add(format!("{prefix}.attn.c_attn.weight"), fused_w)?;
                if let (Some(q), Some(k), Some(v)) = (&attn.query.bias, &attn.key.bias, &attn.value.bias) {
                    w.add(format!("{prefix}.attn.c_attn.bias"), Tensor::cat(vec![q.val(), k.val(), v.val()], 0))?;
                }
                w.add_linear(&format!("{prefix}.attn.c_proj"), &attn.output, false)?;
                w.add_linear(&format!("{prefix}.mlp.c_fc"), &block.mlp_fc, false)?;
                w.add_linear(&format!("{prefix}.mlp.c_proj"), &block.mlp_proj, false)?;
            }
            Architecture::GptNeo => {
                let a = format!("{prefix}.attn.attention");
                w.add_linear(&format!("{a}.q_proj"), &attn.query, true)?;
                w.add_linear(&format!("{a}.k_proj"), &attn.key, true)?;
                w.add_linear(&format!("{a}.v_proj"), &attn.value, true)?;
                w.add_linear(&format!("{a}.out_proj"), &attn.output, true)?;
                w.add_linear(&format!("{prefix}.mlp.c_fc"), &block.mlp_fc, true)?;
                w.add_linear(&format!("{prefix}.mlp.c_proj"), &block.mlp_proj, true)?;
            }
        }
    }

    w.write(path)
}

/// Collects (name, shape, little-endian f32 bytes) before serialising.
#[derive(Default)]
struct WeightWriter {
    entries: Vec<(String, Vec<usize>, Vec<u8>)>,
}

impl WeightWriter {
    fn add<B: Backend, const D: usize>(&mut self, name: impl Into<String>, tensor: Tensor<B, D>) -> Result<()> {
        let name  = name.into();
        let data  = tensor.into_data().convert::<f32>();
        let shape = data.shape.clone();
        let values: Vec<f32> = data
            .to_vec()
            .map_err(|e| anyhow!("Cannot read tensor '{name}': {e:?}"))?;
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name, shape, bytes));
        Ok(())
    }

    fn add_layer_norm<B: Backend>(&mut self, prefix: &str, norm: &LayerNorm<B>) -> Result<()> {
        self.add(format!("{prefix}.weight"), norm.gamma.val())?;
        self.add(format!("{prefix}.bias"), norm.beta.val())
    }

    /// `transpose` stores the weight [out, in] as torch nn.Linear does
    fn add_linear<B: Backend>(&mut self, prefix: &str, linear: &Linear<B>, transpose: bool) -> Result<()> {
        let weight = linear.weight.val();
        let weight = if transpose { weight.transpose() } else { weight };
        self.add(format!("{prefix}.weight"), weight)?;
        if let Some(bias) = &linear.bias {
            self.add(format!("{prefix}.bias"), bias.val())?;
        }
        Ok(())
    }

    fn write(&self, path: &Path) -> Result<()> {
        let views = self
            .entries
            .iter()
            .map(|(name, shape, bytes)| Ok((name.clone(), TensorView::new(Dtype::F32, shape.clone(), bytes)?)))
            .collect::<Result<Vec<_>>>()?;

        // The Python loader requires format=pt in the header metadata
        let metadata = Some(HashMap::from([("format".to_string(), "pt".to_string())]));
        safetensors::serialize_to_file(views, &metadata, path)
            .with_context(|| format!("Cannot write weights '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::tiny_config;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn logits(model: &CausalLm<TestBackend>) -> Vec<f32> {
        let device = Default::default();
        let ids = Tensor::<TestBackend, 2, Int>::from_ints([[1, 5, 2, 7, 3]], &device);
        model.forward(ids).into_data().to_vec().unwrap()
    }

    #[test]
    fn test_saved_model_reloads_identically() {
        for arch in [Architecture::Gpt2, Architecture::GptNeo] {
            let dir    = tempfile::tempdir().unwrap();
            let device = Default::default();
            let config = tiny_config(arch);
            let model: CausalLm<TestBackend> = config.init(&device);

            save_pretrained(&model, &config, dir.path()).unwrap();
            let (_, reloaded) = load_pretrained::<TestBackend>(dir.path(), &device).unwrap();

            let (a, b) = (logits(&model), logits(&reloaded));
            let max_diff = a.iter().zip(&b).map(|(x, y)| (x - y).abs()).fold(0.0f32, f32::max);
            assert!(max_diff < 1e-5, "{arch:?} reload drifted by {max_diff}");
        }
    }

    #[test]
    fn test_saving_over_existing_directory_succeeds() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = tiny_config(Architecture::Gpt2);
        let model: CausalLm<TestBackend> = config.init(&device);

        save_pretrained(&model, &config, dir.path()).unwrap();
        save_pretrained(&model, &config, dir.path()).unwrap();
        assert!(dir.path().join(WEIGHTS_FILE).metadata().unwrap().len() > 0);
    }

    #[test]
    fn test_gpt2_layout_uses_fused_attention() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = tiny_config(Architecture::Gpt2);
        let model: CausalLm<TestBackend> = config.init(&device);
        save_pretrained(&model, &config, dir.path()).unwrap();

        let bytes = fs::read(dir.path().join(WEIGHTS_FILE)).unwrap();
        let st = SafeTensors::deserialize(&bytes).unwrap();
        let fused = st.tensor("transformer.h.0.attn.c_attn.weight").unwrap();
        assert_eq!(fused.shape(), &[8, 24]);
        assert!(st.tensor("transformer.h.0.attn.attention.q_proj.weight").is_err());
    }

    #[test]
    fn test_wrong_architecture_fails_with_tensor_name() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let neo = tiny_config(Architecture::GptNeo);
        let model: CausalLm<TestBackend> = neo.init(&device);
        save_pretrained(&model, &neo, dir.path()).unwrap();

        let gpt2 = tiny_config(Architecture::Gpt2);
        let err = load_model::<TestBackend>(&gpt2, &dir.path().join(WEIGHTS_FILE), &device).unwrap_err();
        assert!(format!("{err:#}").contains("c_attn"));
    }

    #[test]
    fn test_decodes_half_precision() {
        let raw: Vec<u8> = [1.5f32, -2.0]
            .iter()
            .flat_map(|&v| f16::from_f32(v).to_le_bytes())
            .collect();
        assert_eq!(decode_f32(Dtype::F16, &raw).unwrap(), vec![1.5, -2.0]);

        let raw: Vec<u8> = [0.5f32].iter().flat_map(|&v| bf16::from_f32(v).to_le_bytes()).collect();
        assert_eq!(decode_f32(Dtype::BF16, &raw).unwrap(), vec![0.5]);
    }
}
