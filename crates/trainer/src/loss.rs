use anyhow::{ensure, Result};
use tch::{Kind, Reduction, Tensor};

use calc_core::Generator;

/// KL-divergence against a smoothed one-hot target.
///
/// The correct class gets `1 - smoothing`, every other class
/// `smoothing / (size - 2)`, the padding class 0. Rows whose target is the
/// padding id are zeroed and contribute nothing.
#[derive(Debug, Clone)]
pub struct LabelSmoothing {
    size: i64,
    padding_idx: i64,
    smoothing: f64,
    confidence: f64,
}

impl LabelSmoothing {
    pub fn new(size: i64, padding_idx: i64, smoothing: f64) -> Result<Self> {
        ensure!(
            size >= 3,
            "label smoothing needs at least 3 classes, got {}",
            size
        );
        Ok(Self {
            size,
            padding_idx,
            smoothing,
            confidence: 1.0 - smoothing,
        })
    }

    /// x: [N, size] log-probabilities, target: [N] class ids.
    pub fn true_dist(&self, x: &Tensor, target: &Tensor) -> Tensor {
        let _guard = tch::no_grad_guard();
        let fill = self.smoothing / (self.size - 2) as f64;
        let pad_column = Tensor::from_slice(&[self.padding_idx]).to_device(x.device());

        let dist = x
            .detach()
            .full_like(fill)
            .scatter_value(1, &target.unsqueeze(1), self.confidence)
            .index_fill(1, &pad_column, 0.0);
        let keep = target.ne(self.padding_idx).unsqueeze(1).to_kind(dist.kind());
        dist * keep
    }

    /// Summed KL-divergence over all N rows.
    pub fn forward(&self, x: &Tensor, target: &Tensor) -> Result<Tensor> {
        ensure!(
            x.size().get(1) == Some(&self.size),
            "expected {} classes, got shape {:?}",
            self.size,
            x.size()
        );
        let true_dist = self.true_dist(x, target);
        Ok(x.kl_div(&true_dist, Reduction::Sum, false))
    }
}

/// Applies the generator, then the criterion normalized by the token count.
pub struct SimpleLossCompute<'a> {
    generator: &'a Generator,
    criterion: &'a LabelSmoothing,
}

impl<'a> SimpleLossCompute<'a> {
    pub fn new(generator: &'a Generator, criterion: &'a LabelSmoothing) -> Self {
        Self {
            generator,
            criterion,
        }
    }

    /// Returns the un-normalized loss value and the normalized loss node used
    /// for backpropagation.
    pub fn compute(&self, x: &Tensor, y: &Tensor, norm: i64) -> Result<(f64, Tensor)> {
        let x = self.generator.forward(x);
        let vocab = x.size().last().copied().unwrap_or(0);
        // A batch made only of padding has a zero loss; keep it finite.
        let norm = norm.max(1) as f64;
        let sloss = self
            .criterion
            .forward(&x.contiguous().view([-1, vocab]), &y.contiguous().view([-1]))?
            / norm;
        Ok((sloss.double_value(&[]) * norm, sloss))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    fn predict() -> Tensor {
        Tensor::from_slice(&[0.05f32, 0.2, 0.6, 0.1, 0.05])
            .view([1, 5])
            .repeat([5, 1])
            .log()
    }

    #[test]
    fn smoothed_distribution_matches_definition() {
        let crit = LabelSmoothing::new(5, 0, 0.4).unwrap();
        let target = Tensor::from_slice(&[2i64, 1, 0, 3, 3]);
        let dist = crit.true_dist(&predict(), &target);

        // target 2: confidence 0.6, others 0.4 / 3, pad column 0
        assert!((dist.double_value(&[0, 2]) - 0.6).abs() < 1e-6);
        assert!((dist.double_value(&[0, 1]) - 0.4 / 3.0).abs() < 1e-6);
        assert!(dist.double_value(&[0, 0]).abs() < 1e-9);
        let row_sum = dist.get(0).sum(Kind::Float).double_value(&[]);
        assert!((row_sum - 1.0).abs() < 1e-6);

        // target is the pad id: whole row zeroed
        let pad_row = dist.get(2).abs().sum(Kind::Float).double_value(&[]);
        assert_eq!(pad_row, 0.0);
    }

    #[test]
    fn pad_column_is_always_zero() {
        let crit = LabelSmoothing::new(5, 0, 0.1).unwrap();
        let target = Tensor::from_slice(&[1i64, 2, 3, 4, 4]);
        let dist = crit.true_dist(&predict(), &target);
        let pad_col = dist.select(1, 0).abs().sum(Kind::Float).double_value(&[]);
        assert_eq!(pad_col, 0.0);
    }

    #[test]
    fn padded_rows_do_not_contribute() {
        let crit = LabelSmoothing::new(5, 0, 0.0).unwrap();
        let x = predict();
        let with_pad = crit
            .forward(&x, &Tensor::from_slice(&[2i64, 0, 0, 0, 0]))
            .unwrap()
            .double_value(&[]);
        let single = crit
            .forward(&x.narrow(0, 0, 1), &Tensor::from_slice(&[2i64]))
            .unwrap()
            .double_value(&[]);
        assert!((with_pad - single).abs() < 1e-6);
        // no smoothing: KL reduces to -log p(target)
        assert!((single + 0.6f64.ln()).abs() < 1e-5);
    }

    #[test]
    fn loss_grows_when_prediction_is_confidently_wrong() {
        let crit = LabelSmoothing::new(5, 0, 0.1).unwrap();
        let target = Tensor::from_slice(&[2i64]);
        let good = Tensor::from_slice(&[0.01f32, 0.01, 0.96, 0.01, 0.01]).view([1, 5]).log();
        let bad = Tensor::from_slice(&[0.01f32, 0.96, 0.01, 0.01, 0.01]).view([1, 5]).log();
        let good_loss = crit.forward(&good, &target).unwrap().double_value(&[]);
        let bad_loss = crit.forward(&bad, &target).unwrap().double_value(&[]);
        assert!(bad_loss > good_loss);
    }

    #[test]
    fn rejects_tiny_vocabularies_and_wrong_widths() {
        assert!(LabelSmoothing::new(2, 0, 0.1).is_err());
        let crit = LabelSmoothing::new(4, 0, 0.1).unwrap();
        let x = Tensor::zeros([2, 5], (Kind::Float, Device::Cpu));
        assert!(crit.forward(&x, &Tensor::from_slice(&[1i64, 2])).is_err());
    }
}
