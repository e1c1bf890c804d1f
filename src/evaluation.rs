use std::fmt;

use burn::{data::dataloader::DataLoader, prelude::*};

use crate::{data::ProfessionBatch, model::Vgg16};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub correct: usize,
    pub total: usize,
}

impl Evaluation {
    /// Top-1 accuracy in `[0, 1]`; zero when nothing was evaluated.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} correct ({:.2}%)",
            self.correct,
            self.total,
            self.accuracy() * 100.0
        )
    }
}

/// Number of rows whose highest logit is the target class.
pub fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predicted = logits.argmax(1).squeeze::<1>(1);

    predicted
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

pub fn evaluate<B: Backend>(
    model: &Vgg16<B>,
    dataloader: &dyn DataLoader<ProfessionBatch<B>>,
) -> Evaluation {
    let mut evaluation = Evaluation::default();

    for batch in dataloader.iter() {
        evaluation.total += batch.targets.dims()[0];
        evaluation.correct += count_correct(model.forward(batch.images), batch.targets);
    }

    evaluation
}
