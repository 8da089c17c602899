// ============================================================
// Layer 2 — FinetuneUseCase
// ============================================================
// Orchestrates one complete fine-tuning run in order:
//
//   Step 1: Resolve model files        (Layer 6 - infra::hub)
//   Step 2: Load the tokenizer         (Layer 6 - infra)
//   Step 3: Load pre-trained weights   (Layer 6 - infra::weights)
//   Step 4: Build train/eval datasets  (Layer 4 - data)
//   Step 5: Run the trainer            (Layer 5 - ml)
//   Step 6: Save model + tokenizer     (Layer 6 - infra)
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::Result;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::data::{batcher::CollatorConfig, dataset::TextDatasetBuilder, loader::TextLoader};
use crate::domain::{trainer_state::TrainerState, training_args::TrainingArguments};
use crate::infra::{
    hf_config::read_config,
    hub::{resolve_model, tokenizer_tag},
    tokenizer_store::{load_tokenizer, TokenizerStore},
    weights::{load_model, save_pretrained},
};
use crate::ml::trainer::Trainer;

// ─── Fine-tuning Configuration ───────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinetuneConfig {
    /// Hub model id or local model directory
    pub model_name:      String,
    pub train_file:      String,
    /// Evaluation text file; None trains without an eval set
    pub eval_file:       Option<String>,
    /// Tokens per training example
    pub block_size:      usize,
    /// Rebuild cached token blocks even when the cache is fresh
    pub overwrite_cache: bool,
    /// Where the final model and tokenizer are written
    pub save_dir:        String,
    pub training:        TrainingArguments,
}

impl Default for FinetuneConfig {
    fn default() -> Self {
        Self {
            model_name:      "EleutherAI/gpt-neo-125M".to_string(),
            train_file:      "path_to_your_training_data.txt".to_string(),
            eval_file:       Some("path_to_your_eval_data.txt".to_string()),
            block_size:      128,
            overwrite_cache: false,
            save_dir:        "./fine_tuned_model".to_string(),
            training:        TrainingArguments::default(),
        }
    }
}

// ─── FinetuneUseCase ──────────────────────────────────────────────────────────
pub struct FinetuneUseCase {
    config: FinetuneConfig,
}

impl FinetuneUseCase {
    pub fn new(config: FinetuneConfig) -> Self {
        Self { config }
    }

    /// Execute the full fine-tuning pipeline end to end and return
    /// the final trainer state.
    pub fn execute<B: AutodiffBackend>(&self, device: &B::Device) -> Result<TrainerState> {
        let cfg = &self.config;

        // ── Step 1: Resolve the pre-trained model ─────────────────────────────
        let files = resolve_model(&cfg.model_name)?;

        // ── Step 2: Tokenizer ─────────────────────────────────────────────────
        let tokenizer = load_tokenizer(&files.tokenizer)?;

        // ── Step 3: Model ─────────────────────────────────────────────────────
        let model_config = read_config(&files.config)?;
        let model = load_model::<B>(&model_config, &files.weights, device)?;
        tracing::info!(
            "Model '{}' ready: {:?}, {} layers, hidden={}, vocab={}",
            cfg.model_name,
            model_config.architecture,
            model_config.num_layers,
            model_config.hidden_size,
            model_config.vocab_size
        );

        // ── Step 4: Datasets ──────────────────────────────────────────────────
        let block_size = if cfg.block_size > model_config.max_position_embeddings {
            tracing::warn!(
                "block_size {} exceeds the model maximum of {}; using {}",
                cfg.block_size,
                model_config.max_position_embeddings,
                model_config.max_position_embeddings
            );
            model_config.max_position_embeddings
        } else {
            cfg.block_size
        };

        let builder = TextDatasetBuilder::new(&tokenizer, tokenizer_tag(&cfg.model_name), block_size)
            .overwrite_cache(cfg.overwrite_cache);
        let train_dataset = builder.build(&TextLoader::new(&cfg.train_file))?;
        let eval_dataset = cfg
            .eval_file
            .as_ref()
            .map(|path| builder.build(&TextLoader::new(path)))
            .transpose()?;
        tracing::info!(
            "Datasets: {} train blocks, {} eval blocks",
            train_dataset.block_count(),
            eval_dataset.as_ref().map_or(0, |d| d.block_count())
        );

        // ── Step 5: Train ─────────────────────────────────────────────────────
        let trainer = Trainer::new(
            model,
            cfg.training.clone(),
            CollatorConfig::default(),
            train_dataset,
            eval_dataset,
            device.clone(),
        )?;
        let output = trainer.train()?;

        // ── Step 6: Save ──────────────────────────────────────────────────────
        let save_dir = Path::new(&cfg.save_dir);
        save_pretrained(&output.model, &model_config, save_dir)?;
        TokenizerStore::new(save_dir).save(&tokenizer)?;

        Ok(output.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::training_args::EvalStrategy;
    use crate::infra::{
        hub::TOKENIZER_FILE,
        weights::{CONFIG_FILE, WEIGHTS_FILE},
    };
    use crate::ml::model::{Architecture, CausalLm};
    use crate::test_utils::{numbered_words, tiny_config, word_level_tokenizer};
    use burn::backend::{Autodiff, NdArray};
    use std::fs;

    type TestBackend = Autodiff<NdArray>;

    /// A pre-trained model directory with a tiny GPT-Neo and a
    /// 20-word tokenizer.
    fn write_base_model(dir: &Path) {
        let device = Default::default();
        let config = tiny_config(Architecture::GptNeo);
        let model: CausalLm<NdArray> = config.init(&device);
        save_pretrained(&model, &config, dir).unwrap();
        TokenizerStore::new(dir).save(&word_level_tokenizer(&numbered_words(20))).unwrap();
    }

    fn corpus(tokens: usize) -> String {
        (0..tokens).map(|i| format!("w{}", i % 20)).collect::<Vec<_>>().join(" ")
    }

    fn config_in(root: &Path) -> FinetuneConfig {
        let base = root.join("base");
        write_base_model(&base);
        fs::write(root.join("train.txt"), corpus(80)).unwrap();
        fs::write(root.join("eval.txt"), corpus(24)).unwrap();

        FinetuneConfig {
            model_name: base.to_string_lossy().into_owned(),
            train_file: root.join("train.txt").to_string_lossy().into_owned(),
            eval_file:  Some(root.join("eval.txt").to_string_lossy().into_owned()),
            block_size: 8,
            save_dir:   root.join("fine_tuned").to_string_lossy().into_owned(),
            training: TrainingArguments {
                output_dir: root.join("results").to_string_lossy().into_owned(),
                num_train_epochs: 1,
                eval_strategy: EvalStrategy::Epoch,
                ..TrainingArguments::default()
            },
            ..FinetuneConfig::default()
        }
    }

    #[test]
    fn test_finetune_writes_reloadable_model() {
        let root = tempfile::tempdir().unwrap();
        let cfg  = config_in(root.path());
        let device = Default::default();

        let state = FinetuneUseCase::new(cfg.clone()).execute::<TestBackend>(&device).unwrap();

        // 80 tokens / 8 → 10 blocks, batch 4 → 3 steps
        assert_eq!(state.global_step, 3);
        assert!(state.last_eval_loss().is_some());

        let saved = Path::new(&cfg.save_dir);
        for file in [CONFIG_FILE, WEIGHTS_FILE, TOKENIZER_FILE] {
            assert!(saved.join(file).is_file(), "{file} missing");
        }
        let reloaded = resolve_model(&cfg.save_dir).unwrap();
        assert_eq!(read_config(&reloaded.config).unwrap().architecture, Architecture::GptNeo);
    }

    #[test]
    fn test_block_size_above_model_maximum_is_clamped() {
        let root = tempfile::tempdir().unwrap();
        let mut cfg = config_in(root.path());
        cfg.block_size = 64; // tiny model has 16 positions
        cfg.eval_file  = None;
        let device = Default::default();

        // 80 tokens / 16 → 5 blocks, batch 4 → 2 steps
        let state = FinetuneUseCase::new(cfg).execute::<TestBackend>(&device).unwrap();
        assert_eq!(state.global_step, 2);
    }

    #[test]
    fn test_missing_train_file_fails() {
        let root = tempfile::tempdir().unwrap();
        let mut cfg = config_in(root.path());
        cfg.train_file = root.path().join("absent.txt").to_string_lossy().into_owned();
        cfg.training.eval_strategy = EvalStrategy::No;
        let device = Default::default();

        assert!(FinetuneUseCase::new(cfg).execute::<TestBackend>(&device).is_err());
    }
}
