// ============================================================
// Layer 2 — GenerateUseCase
// ============================================================
// Loads a model directory (normally the fine-tuned output) and
// continues a prompt:
//
//   Step 1: Resolve model files      (Layer 6 - infra::hub)
//   Step 2: Load tokenizer + weights (Layer 6 - infra)
//   Step 3: Encode the prompt
//   Step 4: Sample new tokens        (Layer 5 - ml::generator)
//   Step 5: Decode the continuation
//
// Generation stops at <|endoftext|> when the tokenizer has it.

use anyhow::Result;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::infra::{
    hf_config::read_config,
    hub::resolve_model,
    tokenizer_store::{decode_ids, encode_ids, load_tokenizer, END_OF_TEXT},
    weights::load_model,
};
use crate::ml::generator::{GenerationConfig, Generator};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateConfig {
    /// Fine-tuned model directory or Hub model id
    pub model_dir:  String,
    pub prompt:     String,
    pub generation: GenerationConfig,
}

pub struct GenerateUseCase {
    config: GenerateConfig,
}

impl GenerateUseCase {
    pub fn new(config: GenerateConfig) -> Self {
        Self { config }
    }

    /// Returns the generated continuation without the prompt.
    pub fn execute<B: Backend>(&self, device: &B::Device) -> Result<String> {
        let cfg = &self.config;

        let files     = resolve_model(&cfg.model_dir)?;
        let tokenizer = load_tokenizer(&files.tokenizer)?;
        let model     = load_model::<B>(&read_config(&files.config)?, &files.weights, device)?;

        let prompt_ids = encode_ids(&tokenizer, &cfg.prompt)?;
        tracing::info!("Prompt is {} tokens", prompt_ids.len());

        let generator = Generator::new(model, device.clone());
        let new_ids = generator.generate(&prompt_ids, &cfg.generation, tokenizer.token_to_id(END_OF_TEXT))?;

        decode_ids(&tokenizer, &new_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{tokenizer_store::TokenizerStore, weights::save_pretrained};
    use crate::ml::model::{Architecture, CausalLm};
    use crate::test_utils::{numbered_words, tiny_config, word_level_tokenizer};
    use burn::backend::NdArray;

    #[test]
    fn test_generates_known_words() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = tiny_config(Architecture::Gpt2);
        let model: CausalLm<NdArray> = config.init(&device);
        save_pretrained(&model, &config, dir.path()).unwrap();
        // Every id the model can produce (0..32) decodes to a word
        TokenizerStore::new(dir.path()).save(&word_level_tokenizer(&numbered_words(31))).unwrap();

        let use_case = GenerateUseCase::new(GenerateConfig {
            model_dir:  dir.path().to_string_lossy().into_owned(),
            prompt:     "w1 w2 w3".to_string(),
            generation: GenerationConfig { max_new_tokens: 5, temperature: 0.0, ..GenerationConfig::default() },
        });

        let text = use_case.execute::<NdArray>(&device).unwrap();
        let words: Vec<&str> = text.split_whitespace().collect();
        assert!(words.len() <= 5);
        assert!(words.iter().all(|w| w.starts_with('w')), "unexpected output '{text}'");
    }
}
