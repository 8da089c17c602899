// ============================================================
// Layer 5 — Text Generator
// ============================================================
// Autoregressive sampling from a (fine-tuned) CausalLm.
//
//   prompt ids ─► forward ─► last-position logits ─► sample_next ─► append
//        ▲                                                              │
//        └──────────────────────────────────────────────────────────────┘
//
// Each step re-runs the model over the whole context (no key/value
// cache). Contexts longer than max_positions keep only their most
// recent max_positions ids.
//
// Sampling:
//   temperature 0   → greedy argmax
//   temperature > 0 → softmax(logits / T) over the top_k logits
//                     (top_k 0 = whole vocabulary)

use anyhow::{anyhow, bail, Result};
use burn::prelude::*;
use rand::{distributions::WeightedIndex, prelude::*, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::ml::model::CausalLm;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_new_tokens: usize,
    /// 0 selects greedy decoding
    pub temperature:    f64,
    /// Sample among the k most likely tokens; 0 disables the cut
    pub top_k:          usize,
    pub seed:           u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self { max_new_tokens: 50, temperature: 1.0, top_k: 50, seed: 42 }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.temperature.is_finite() && self.temperature >= 0.0) {
            bail!("temperature must be a non-negative number, got {}", self.temperature);
        }
        Ok(())
    }
}

pub struct Generator<B: Backend> {
    model:  CausalLm<B>,
    device: B::Device,
}

impl<B: Backend> Generator<B> {
    pub fn new(model: CausalLm<B>, device: B::Device) -> Self {
        Self { model, device }
    }

    /// Continue `prompt` and return only the newly generated ids.
    /// Generation stops early right after `stop` is produced.
    pub fn generate(&self, prompt: &[u32], cfg: &GenerationConfig, stop: Option<u32>) -> Result<Vec<u32>> {
        cfg.validate()?;
        if prompt.is_empty() {
            bail!("Cannot generate from an empty prompt");
        }

        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut ids = prompt.to_vec();

        for _ in 0..cfg.max_new_tokens {
            let start = ids.len().saturating_sub(self.model.max_positions);
            let context: Vec<i32> = ids[start..].iter().map(|&id| id as i32).collect();
            let input = Tensor::<B, 1, Int>::from_ints(context.as_slice(), &self.device).unsqueeze::<2>();

            let logits = self.model.forward(input);
            let [_, seq, vocab] = logits.dims();
            let last: Vec<f32> = logits
                .slice([0..1, seq - 1..seq, 0..vocab])
                .reshape([vocab])
                .into_data()
                .to_vec()
                .map_err(|e| anyhow!("Cannot read logits: {e:?}"))?;

            let next = sample_next(&last, cfg.temperature, cfg.top_k, &mut rng)?;
            ids.push(next);
            if stop == Some(next) {
                break;
            }
        }

        tracing::debug!("Generated {} tokens", ids.len() - prompt.len());
        Ok(ids.split_off(prompt.len()))
    }
}

/// Pick the next token id from one row of logits.
pub fn sample_next(logits: &[f32], temperature: f64, top_k: usize, rng: &mut StdRng) -> Result<u32> {
    if logits.is_empty() {
        bail!("Cannot sample from empty logits");
    }

    let mut ranked: Vec<(usize, f32)> = logits.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    if temperature == 0.0 {
        return Ok(ranked[0].0 as u32);
    }
    if top_k > 0 {
        ranked.truncate(top_k);
    }

    // Softmax over the survivors, shifted by the max for stability
    let max = ranked[0].1 as f64;
    let weights: Vec<f64> = ranked
        .iter()
        .map(|&(_, l)| ((l as f64 - max) / temperature).exp())
        .collect();
    let dist = WeightedIndex::new(&weights).map_err(|e| anyhow!("Invalid sampling weights: {e}"))?;
    Ok(ranked[dist.sample(rng)].0 as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::Architecture;
    use crate::test_utils::tiny_config;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn generator() -> Generator<TestBackend> {
        let device = Default::default();
        Generator::new(tiny_config(Architecture::GptNeo).init(&device), device)
    }

    #[test]
    fn test_greedy_takes_argmax() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(sample_next(&[0.1, 2.5, -1.0, 2.4], 0.0, 0, &mut rng).unwrap(), 1);
    }

    #[test]
    fn test_top_k_one_is_greedy() {
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..20 {
            assert_eq!(sample_next(&[0.0, 0.1, 3.0, 0.2], 5.0, 1, &mut rng).unwrap(), 2);
        }
    }

    #[test]
    fn test_sampling_stays_within_top_k() {
        let mut rng = StdRng::seed_from_u64(7);
        let logits = [1.0, 5.0, 0.5, 4.9, -2.0];
        for _ in 0..200 {
            let id = sample_next(&logits, 1.0, 2, &mut rng).unwrap();
            assert!(id == 1 || id == 3, "sampled {id} outside the top 2");
        }
    }

    #[test]
    fn test_negative_temperature_rejected() {
        let cfg = GenerationConfig { temperature: -0.5, ..GenerationConfig::default() };
        assert!(generator().generate(&[1], &cfg, None).is_err());
    }

    #[test]
    fn test_generates_requested_count_deterministically() {
        let gen = generator();
        let cfg = GenerationConfig { max_new_tokens: 20, ..GenerationConfig::default() };

        let a = gen.generate(&[1, 2, 3], &cfg, None).unwrap();
        let b = gen.generate(&[1, 2, 3], &cfg, None).unwrap();
        assert_eq!(a.len(), 20);
        assert_eq!(a, b);
        assert!(a.iter().all(|&id| id < 32));
    }

    #[test]
    fn test_stops_after_stop_token() {
        let gen = generator();
        let cfg = GenerationConfig { max_new_tokens: 10, temperature: 0.0, ..GenerationConfig::default() };
        let greedy = gen.generate(&[4, 5], &cfg, None).unwrap();

        let stopped = gen.generate(&[4, 5], &cfg, Some(greedy[0])).unwrap();
        assert_eq!(stopped, vec![greedy[0]]);
    }

    #[test]
    fn test_empty_prompt_rejected() {
        assert!(generator().generate(&[], &GenerationConfig::default(), None).is_err());
    }
}
