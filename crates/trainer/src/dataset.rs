//! Synthetic batches: the copy task and the elementary-addition task.

use anyhow::Result;
use rand::Rng;
use tch::{Device, Kind, Tensor};

use tokenizer::{elementary_pair, to_tokens, END, PAD, START};

use crate::batch::Batch;

/// Wraps every sequence with start/end symbols and right-pads to a common length.
pub fn padding_batch(seqs: &[Vec<i64>]) -> Vec<Vec<i64>> {
    let longest = seqs.iter().map(Vec::len).max().unwrap_or(0);
    seqs.iter()
        .map(|seq| {
            let mut row = Vec::with_capacity(longest + 2);
            row.push(START);
            row.extend_from_slice(seq);
            row.push(END);
            row.resize(longest + 2, PAD);
            row
        })
        .collect()
}

fn to_tensor(rows: &[Vec<i64>]) -> Tensor {
    let width = rows.first().map_or(0, Vec::len) as i64;
    let flat: Vec<i64> = rows.iter().flatten().copied().collect();
    Tensor::from_slice(&flat).view([rows.len() as i64, width])
}

/// Tokenizes `(problem, answer)` pairs into a padded batch.
pub fn batch_from_pairs(pairs: &[(String, String)], device: Device) -> Result<Batch> {
    let mut src = Vec::with_capacity(pairs.len());
    let mut tgt = Vec::with_capacity(pairs.len());
    for (text, target) in pairs {
        src.push(to_tokens(text)?);
        tgt.push(to_tokens(target)?);
    }
    let src = to_tensor(&padding_batch(&src));
    let tgt = to_tensor(&padding_batch(&tgt));
    Ok(Batch::new(src, Some(tgt), PAD, device))
}

/// Copy task: random tokens in `[1, vocab)` of length 10 whose first column is
/// 1; source and target are identical. Draws from the tch generator, so
/// `tch::manual_seed` makes it reproducible.
pub fn data_gen(
    vocab: i64,
    batch_size: i64,
    nbatches: usize,
    device: Device,
) -> impl Iterator<Item = Result<Batch>> {
    (0..nbatches).map(move |_| {
        let data = Tensor::randint_low(1, vocab, [batch_size, 10], (Kind::Int64, Device::Cpu));
        let _ = data.select(1, 0).fill_(1);
        let src = data.copy();
        Ok(Batch::new(src, Some(data), 0, device))
    })
}

/// Random elementary-addition problems with operands in `0..=1000`.
pub fn data_gen_number<R: Rng>(
    batch_size: usize,
    nbatches: usize,
    mut rng: R,
    device: Device,
) -> impl Iterator<Item = Result<Batch>> {
    (0..nbatches).map(move |_| -> Result<Batch> {
        let pairs = (0..batch_size)
            .map(|_| elementary_pair(rng.gen_range(0..=1000), rng.gen_range(0..=1000)))
            .collect::<tokenizer::Result<Vec<_>>>()?;
        batch_from_pairs(&pairs, device)
    })
}

/// Every value of `start..end`, or `count` random draws from it.
pub fn items_range_generate<R: Rng>(
    start: i64,
    end: i64,
    count: Option<usize>,
    rng: &mut R,
) -> Vec<i64> {
    match count {
        Some(count) => (0..count).map(|_| rng.gen_range(start..end)).collect(),
        None => (start..end).collect(),
    }
}

/// Batches over the cross product of two operand lists.
#[derive(Debug, Clone)]
pub struct RangeDataset {
    start: i64,
    end: i64,
    batch_size: usize,
    skip: f64,
    count: Option<usize>,
    x_items: Option<Vec<i64>>,
    y_items: Option<Vec<i64>>,
}

pub fn dataset_range(start: i64, end: i64, batch_size: usize) -> RangeDataset {
    RangeDataset {
        start,
        end,
        batch_size,
        skip: 0.0,
        count: None,
        x_items: None,
        y_items: None,
    }
}

impl RangeDataset {
    /// Probability of dropping each pair.
    pub fn skip(mut self, probability: f64) -> Self {
        self.skip = probability;
        self
    }

    /// Sample `count` operands per side instead of taking the whole range.
    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Fixed operand lists; take precedence over the range.
    pub fn items(mut self, x_items: Vec<i64>, y_items: Vec<i64>) -> Self {
        self.x_items = Some(x_items);
        self.y_items = Some(y_items);
        self
    }

    pub fn batches<R: Rng>(self, mut rng: R, device: Device) -> RangeBatches<R> {
        let xs = match self.x_items {
            Some(items) => items,
            None => items_range_generate(self.start, self.end, self.count, &mut rng),
        };
        let ys = match self.y_items {
            Some(items) => items,
            None => items_range_generate(self.start, self.end, self.count, &mut rng),
        };
        RangeBatches {
            xs,
            ys,
            xi: 0,
            yi: 0,
            batch_size: self.batch_size.max(1),
            skip: self.skip,
            rng,
            device,
        }
    }
}

/// Lazy batch iterator produced by [`RangeDataset::batches`]. A trailing
/// partial batch is dropped.
pub struct RangeBatches<R> {
    xs: Vec<i64>,
    ys: Vec<i64>,
    xi: usize,
    yi: usize,
    batch_size: usize,
    skip: f64,
    rng: R,
    device: Device,
}

impl<R> RangeBatches<R> {
    fn next_pair(&mut self) -> Option<(i64, i64)> {
        if self.ys.is_empty() {
            return None;
        }
        let x = *self.xs.get(self.xi)?;
        let y = self.ys[self.yi];
        self.yi += 1;
        if self.yi == self.ys.len() {
            self.yi = 0;
            self.xi += 1;
        }
        Some((x, y))
    }
}

impl<R: Rng> Iterator for RangeBatches<R> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut pairs = Vec::with_capacity(self.batch_size);
        while pairs.len() < self.batch_size {
            let (x, y) = self.next_pair()?;
            if self.rng.gen::<f64>() < self.skip {
                continue;
            }
            match elementary_pair(x, y) {
                Ok(pair) => pairs.push(pair),
                Err(err) => return Some(Err(err.into())),
            }
        }
        Some(batch_from_pairs(&pairs, self.device))
    }
}
