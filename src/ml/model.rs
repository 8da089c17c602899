// ============================================================
// Layer 5 — Causal Language Model
// ============================================================
// A GPT-style decoder that can hold the weights of either
// published architecture the loader understands:
//
//                    GPT-2               GPT-Neo
//   q/k/v bias       yes                 no
//   score scaling    1/sqrt(head_dim)    none
//   attention span   global everywhere   alternating global/local
//
// Shared layout:
//   token embedding + learned position embedding
//   N × [ LN → causal self-attention → residual
//         LN → Linear → tanh-GELU → Linear → residual ]
//   final LN → logits via the (tied) token embedding matrix
//
// A "local" layer only attends to the previous `window` positions
// (including itself). Window 0 means unbounded (global).

use burn::{
    nn::{
        loss::CrossEntropyLossConfig,
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::softmax,
};
use serde::{Deserialize, Serialize};

/// Score given to masked attention positions before softmax
const MASKED_SCORE: f32 = -1.0e9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    Gpt2,
    GptNeo,
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct CausalLmConfig {
    pub architecture:            Architecture,
    pub vocab_size:              usize,
    pub max_position_embeddings: usize,
    pub hidden_size:             usize,
    pub num_layers:              usize,
    pub num_heads:               usize,
    pub intermediate_size:       usize,
    /// Attention window per layer; 0 = global
    pub attention_windows:       Vec<usize>,
    #[config(default = 1e-5)]
    pub layer_norm_epsilon:      f64,
    #[config(default = 0.0)]
    pub dropout:                 f64,
    #[config(default = true)]
    pub scale_attention:         bool,
    #[config(default = true)]
    pub qkv_bias:                bool,
}

impl CausalLmConfig {
    /// Check the dimensions are mutually consistent.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.num_heads == 0 || self.hidden_size % self.num_heads != 0 {
            anyhow::bail!(
                "hidden_size ({}) must be divisible by num_heads ({})",
                self.hidden_size,
                self.num_heads
            );
        }
        if self.attention_windows.len() != self.num_layers {
            anyhow::bail!(
                "expected {} attention windows, one per layer, got {}",
                self.num_layers,
                self.attention_windows.len()
            );
        }
        if self.vocab_size == 0 || self.max_position_embeddings == 0 {
            anyhow::bail!("vocab_size and max_position_embeddings must be positive");
        }
        Ok(())
    }

    /// Build a randomly initialised model. Call `validate` first.
    pub fn init<B: Backend>(&self, device: &B::Device) -> CausalLm<B> {
        let token_embedding    = EmbeddingConfig::new(self.vocab_size, self.hidden_size).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_position_embeddings, self.hidden_size).init(device);
        let blocks = self
            .attention_windows
            .iter()
            .map(|&window| self.build_block(window, device))
            .collect();
        let final_norm = self.layer_norm(device);
        let dropout    = DropoutConfig::new(self.dropout).init();

        CausalLm {
            token_embedding,
            position_embedding,
            blocks,
            final_norm,
            dropout,
            max_positions: self.max_position_embeddings,
        }
    }

    fn layer_norm<B: Backend>(&self, device: &B::Device) -> LayerNorm<B> {
        LayerNormConfig::new(self.hidden_size)
            .with_epsilon(self.layer_norm_epsilon)
            .init(device)
    }

    fn build_block<B: Backend>(&self, window: usize, device: &B::Device) -> DecoderBlock<B> {
        let h = self.hidden_size;
        let head_dim = h / self.num_heads;
        let scale = if self.scale_attention {
            1.0 / (head_dim as f64).sqrt()
        } else {
            1.0
        };

        let attn = CausalSelfAttention {
            query:     LinearConfig::new(h, h).with_bias(self.qkv_bias).init(device),
            key:       LinearConfig::new(h, h).with_bias(self.qkv_bias).init(device),
            value:     LinearConfig::new(h, h).with_bias(self.qkv_bias).init(device),
            output:    LinearConfig::new(h, h).init(device),
            dropout:   DropoutConfig::new(self.dropout).init(),
            num_heads: self.num_heads,
            window,
            scale,
        };

        DecoderBlock {
            norm1:    self.layer_norm(device),
            attn,
            norm2:    self.layer_norm(device),
            mlp_fc:   LinearConfig::new(h, self.intermediate_size).init(device),
            mlp_proj: LinearConfig::new(self.intermediate_size, h).init(device),
            dropout:  DropoutConfig::new(self.dropout).init(),
        }
    }
}

// ─── Attention ────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct CausalSelfAttention<B: Backend> {
    pub query:     Linear<B>,
    pub key:       Linear<B>,
    pub value:     Linear<B>,
    pub output:    Linear<B>,
    pub dropout:   Dropout,
    pub num_heads: usize,
    /// 0 = attend to every earlier position
    pub window:    usize,
    /// Multiplier applied to q·k before softmax
    pub scale:     f64,
}

impl<B: Backend> CausalSelfAttention<B> {
    /// x: [batch, seq, hidden] → [batch, seq, hidden]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, seq, hidden] = x.dims();
        let heads    = self.num_heads;
        let head_dim = hidden / heads;

        // [batch, seq, hidden] → [batch, heads, seq, head_dim]
        let split = |t: Tensor<B, 3>| -> Tensor<B, 4> {
            t.reshape([batch, seq, heads, head_dim]).swap_dims(1, 2)
        };
        let q = split(self.query.forward(x.clone()));
        let k = split(self.key.forward(x.clone()));
        let v = split(self.value.forward(x));

        let scores = q.matmul(k.transpose()).mul_scalar(self.scale); // [batch, heads, seq, seq]
        let mask = attention_mask::<B>(seq, self.window, &scores.device())
            .unsqueeze::<4>()
            .expand([batch, heads, seq, seq]);
        let weights = softmax(scores.mask_fill(mask, MASKED_SCORE), 3);
        let weights = self.dropout.forward(weights);

        let context = weights
            .matmul(v)
            .swap_dims(1, 2)
            .reshape([batch, seq, hidden]);
        self.dropout.forward(self.output.forward(context))
    }
}

/// [seq, seq] mask, true where query row i must NOT see key column j:
/// every future position, plus positions at least `window` steps back
/// when the window is bounded.
pub fn attention_mask<B: Backend>(seq_len: usize, window: usize, device: &B::Device) -> Tensor<B, 2, Bool> {
    let mut masked = Vec::with_capacity(seq_len * seq_len);
    for i in 0..seq_len {
        for j in 0..seq_len {
            let future  = j > i;
            let too_far = window > 0 && j <= i && i - j >= window;
            masked.push(future || too_far);
        }
    }
    Tensor::from_data(TensorData::new(masked, [seq_len, seq_len]), device)
}

/// tanh approximation of GELU ("gelu_new")
pub fn gelu_new<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let cube  = x.clone() * x.clone() * x.clone();
    let inner = (x.clone() + cube.mul_scalar(0.044715))
        .mul_scalar((2.0 / std::f64::consts::PI).sqrt());
    x.mul_scalar(0.5) * inner.tanh().add_scalar(1.0)
}

// ─── Decoder block ────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct DecoderBlock<B: Backend> {
    pub norm1:    LayerNorm<B>,
    pub attn:     CausalSelfAttention<B>,
    pub norm2:    LayerNorm<B>,
    pub mlp_fc:   Linear<B>,
    pub mlp_proj: Linear<B>,
    pub dropout:  Dropout,
}

impl<B: Backend> DecoderBlock<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = x.clone() + self.attn.forward(self.norm1.forward(x));
        let mlp = self.mlp_proj.forward(gelu_new(self.mlp_fc.forward(self.norm2.forward(x.clone()))));
        x + self.dropout.forward(mlp)
    }
}

// ─── Full model ───────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct CausalLm<B: Backend> {
    pub token_embedding:    Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub blocks:             Vec<DecoderBlock<B>>,
    pub final_norm:         LayerNorm<B>,
    pub dropout:            Dropout,
    pub max_positions:      usize,
}

impl<B: Backend> CausalLm<B> {
    /// input_ids: [batch, seq] → logits: [batch, seq, vocab]
    ///
    /// # Panics
    /// If `seq` exceeds `max_positions`; callers crop or chunk first.
    pub fn forward(&self, input_ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch, seq] = input_ids.dims();
        assert!(
            seq <= self.max_positions,
            "sequence length {seq} exceeds the model maximum of {}",
            self.max_positions
        );

        let device = input_ids.device();
        let positions = Tensor::<B, 1, Int>::arange(0..seq as i64, &device)
            .unsqueeze::<2>()
            .expand([batch, seq]);

        let embedded = self.token_embedding.forward(input_ids) + self.position_embedding.forward(positions);
        let mut x = self.dropout.forward(embedded);
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.final_norm.forward(x);

        // Output projection shares weights with the token embedding
        let embedding = self.token_embedding.weight.val(); // [vocab, hidden]
        let [vocab, hidden] = embedding.dims();
        x.reshape([batch * seq, hidden])
            .matmul(embedding.transpose())
            .reshape([batch, seq, vocab])
    }

    /// Mean next-token cross entropy: position t predicts labels[t + 1].
    /// Sequences must be at least two tokens long.
    pub fn forward_loss(&self, input_ids: Tensor<B, 2, Int>, labels: Tensor<B, 2, Int>) -> Tensor<B, 1> {
        let [batch, seq] = input_ids.dims();
        let logits = self.forward(input_ids);
        let [_, _, vocab] = logits.dims();

        let shifted_logits = logits
            .slice([0..batch, 0..seq - 1, 0..vocab])
            .reshape([batch * (seq - 1), vocab]);
        let shifted_labels = labels
            .slice([0..batch, 1..seq])
            .reshape([batch * (seq - 1)]);

        CrossEntropyLossConfig::new()
            .init(&shifted_logits.device())
            .forward(shifted_logits, shifted_labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::tiny_config;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_logits_shape() {
        let device = Default::default();
        let model: CausalLm<TestBackend> = tiny_config(Architecture::Gpt2).init(&device);
        let ids = Tensor::<TestBackend, 2, Int>::from_ints([[1, 2, 3, 4], [5, 6, 7, 8]], &device);

        assert_eq!(model.forward(ids).dims(), [2, 4, 32]);
    }

    #[test]
    fn test_mask_hides_future_and_far_past() {
        let device = Default::default();
        let mask: Vec<bool> = attention_mask::<TestBackend>(4, 2, &device)
            .into_data()
            .to_vec()
            .unwrap();
        #[rustfmt::skip]
        let expected = vec![
            false, true,  true,  true,
            false, false, true,  true,
            true,  false, false, true,
            true,  true,  false, false,
        ];
        assert_eq!(mask, expected);
    }

    #[test]
    fn test_global_mask_is_lower_triangular() {
        let device = Default::default();
        let mask: Vec<bool> = attention_mask::<TestBackend>(3, 0, &device)
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(mask, vec![false, true, true, false, false, true, false, false, false]);
    }

    #[test]
    fn test_earlier_logits_ignore_later_tokens() {
        // Changing the last token must not change predictions at earlier positions
        for arch in [Architecture::Gpt2, Architecture::GptNeo] {
            let device = Default::default();
            let model: CausalLm<TestBackend> = tiny_config(arch).init(&device);

            let a = Tensor::<TestBackend, 2, Int>::from_ints([[3, 1, 4, 1, 5]], &device);
            let b = Tensor::<TestBackend, 2, Int>::from_ints([[3, 1, 4, 1, 9]], &device);
            let la = model.forward(a).slice([0..1, 0..4, 0..32]);
            let lb = model.forward(b).slice([0..1, 0..4, 0..32]);

            let diff: f32 = (la - lb).abs().max().into_scalar().elem::<f32>();
            assert!(diff < 1e-5, "{arch:?} leaked future tokens: {diff}");
        }
    }

    #[test]
    fn test_loss_is_finite_and_near_uniform_at_init() {
        let device = Default::default();
        let model: CausalLm<TestBackend> = tiny_config(Architecture::GptNeo).init(&device);
        let ids = Tensor::<TestBackend, 2, Int>::from_ints([[1, 2, 3, 4, 5, 6]], &device);

        let loss: f32 = model.forward_loss(ids.clone(), ids).into_scalar().elem::<f32>();
        assert!(loss.is_finite());
        // Random init should sit in the neighbourhood of ln(vocab) = ln(32) ≈ 3.47
        assert!(loss > 1.0 && loss < 8.0, "loss {loss}");
    }

    #[test]
    fn test_gelu_new_reference_points() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([0.0, 1.0, -1.0], &device);
        let y: Vec<f32> = gelu_new(x).into_data().to_vec().unwrap();
        assert!(y[0].abs() < 1e-6);
        assert!((y[1] - 0.841_192).abs() < 1e-4);
        assert!((y[2] + 0.158_808).abs() < 1e-4);
    }

    #[test]
    fn test_validate_rejects_bad_heads() {
        let mut cfg = tiny_config(Architecture::Gpt2);
        cfg.num_heads = 3;
        assert!(cfg.validate().is_err());
    }
}
