// ============================================================
// Layer 5 — Global Gradient-Norm Clipping
// ============================================================
// The norm is taken over every parameter gradient at once:
//
//   norm = sqrt( Σ_params Σ_i g_i² )
//
// When norm > max_norm every gradient is multiplied by the
// same factor max_norm / norm, so the direction of the update
// is kept and only its length shrinks.
//
// Runs between backward() and optim.step(); the optimiser
// itself is built without grad_clipping.

use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::marker::PhantomData;

/// Sums g² over every gradient registered for the visited module.
struct SquaredNormVisitor<'a, B: AutodiffBackend> {
    grads: &'a GradientsParams,
    sum:   f64,
    _b:    PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNormVisitor<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.sum += (grad.clone() * grad).sum().into_scalar().elem::<f64>();
        }
    }
}

/// Multiplies every gradient by one factor.
struct ScaleVisitor<'a, B: AutodiffBackend> {
    grads:  &'a mut GradientsParams,
    factor: f64,
    _b:     PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for ScaleVisitor<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads
                .register::<B::InnerBackend, D>(id, grad.mul_scalar(self.factor));
        }
    }
}

/// L2 norm over all of the module's parameter gradients.
pub fn global_grad_norm<B, M>(module: &M, grads: &GradientsParams) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = SquaredNormVisitor::<B> { grads, sum: 0.0, _b: PhantomData };
    module.visit(&mut visitor);
    visitor.sum.sqrt()
}

/// Rescale `grads` so their global norm is at most `max_norm`.
/// Returns the gradients and the norm measured before clipping.
pub fn clip_grad_norm<B, M>(module: &M, mut grads: GradientsParams, max_norm: f64) -> (GradientsParams, f64)
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let norm = global_grad_norm::<B, M>(module, &grads);
    if max_norm > 0.0 && norm > max_norm {
        let mut visitor = ScaleVisitor::<B> {
            grads:  &mut grads,
            factor: max_norm / (norm + 1e-6),
            _b:     PhantomData,
        };
        module.visit(&mut visitor);
    }
    (grads, norm)
}
