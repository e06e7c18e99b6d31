use tch::{Device, Kind, Tensor};

use calc_core::mask::{make_std_mask, padding_mask};

/// Decoder side of a batch: shifted input/output and the combined mask.
#[derive(Debug)]
pub struct Target {
    /// Decoder input, every token but the last.
    pub tgt: Tensor,
    /// Decoder target, every token but the first.
    pub tgt_y: Tensor,
    /// Padding AND causal mask over `tgt`, `[batch, len, len]`.
    pub tgt_mask: Tensor,
    /// Number of non-pad tokens in `tgt_y`; the loss normalizer.
    pub ntokens: i64,
}

/// Source/target tokens with the masks derived from them. Nothing is mutated
/// after construction.
#[derive(Debug)]
pub struct Batch {
    src: Tensor,
    src_mask: Tensor,
    target: Option<Target>,
}

impl Batch {
    pub fn new(src: Tensor, tgt: Option<Tensor>, pad: i64, device: Device) -> Self {
        let src = src.to_device(device);
        let src_mask = padding_mask(&src, pad);
        let target = tgt.map(|tgt| {
            let tgt = tgt.to_device(device);
            let len = tgt.size()[1];
            let tgt_in = tgt.narrow(1, 0, len - 1);
            let tgt_y = tgt.narrow(1, 1, len - 1);
            let tgt_mask = make_std_mask(&tgt_in, pad);
            let ntokens = tgt_y.ne(pad).sum(Kind::Int64).int64_value(&[]);
            Target {
                tgt: tgt_in,
                tgt_y,
                tgt_mask,
                ntokens,
            }
        });

        Self {
            src,
            src_mask,
            target,
        }
    }

    pub fn src(&self) -> &Tensor {
        &self.src
    }

    pub fn src_mask(&self) -> &Tensor {
        &self.src_mask
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    /// Number of sequences in the batch.
    pub fn len(&self) -> i64 {
        self.src.size()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_target_and_counts_tokens() {
        let src = Tensor::from_slice(&[1i64, 7, 8, 2, 1, 9, 2, 0]).view([2, 4]);
        let tgt = Tensor::from_slice(&[1i64, 7, 2, 0, 1, 8, 9, 2]).view([2, 4]);
        let batch = Batch::new(src, Some(tgt), 0, Device::Cpu);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.src_mask().size(), vec![2, 1, 4]);
        assert_eq!(batch.src_mask().to_kind(Kind::Int64).int64_value(&[1, 0, 3]), 0);

        let target = batch.target().unwrap();
        assert_eq!(target.tgt.size(), vec![2, 3]);
        assert_eq!(target.tgt_y.size(), vec![2, 3]);
        assert_eq!(target.tgt.int64_value(&[1, 2]), 9);
        assert_eq!(target.tgt_y.int64_value(&[1, 0]), 8);
        assert_eq!(target.tgt_mask.size(), vec![2, 3, 3]);
        // tgt_y rows: [7, 2, 0] and [8, 9, 2]
        assert_eq!(target.ntokens, 5);
    }

    #[test]
    fn source_only_batch_has_no_target() {
        let src = Tensor::from_slice(&[1i64, 7, 2]).view([1, 3]);
        let batch = Batch::new(src, None, 0, Device::Cpu);
        assert!(batch.target().is_none());
        assert!(!batch.is_empty());
    }
}
