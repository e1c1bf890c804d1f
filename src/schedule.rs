use burn::{lr_scheduler::LrScheduler, prelude::*, LearningRate};

pub const BASE_LEARNING_RATE: LearningRate = 0.01;

// (percent of the epoch budget, rate once the epoch is past it), highest first.
const BREAKPOINTS: [(usize, LearningRate); 3] = [(80, 0.0001), (50, 0.001), (30, 0.005)];

/// Step decay over a fixed epoch budget.
///
/// `epoch` is 0-based. The rate drops once `epoch` is strictly past 30%, 50%
/// and 80% of `epoch_count` (each threshold rounded down).
pub fn learning_rate(epoch: usize, epoch_count: usize) -> LearningRate {
    BREAKPOINTS
        .iter()
        .find(|(percent, _)| epoch > epoch_count * percent / 100)
        .map(|&(_, rate)| rate)
        .unwrap_or(BASE_LEARNING_RATE)
}

/// Number of batches one epoch yields from burn's dataloader.
///
/// With workers the dataset is split into `len / workers` sized partitions
/// (the last one takes the remainder) and each partition is batched on its own.
pub fn iterations_per_epoch(len: usize, batch_size: usize, workers: usize) -> usize {
    let batch_size = batch_size.max(1);

    if workers <= 1 || len < workers {
        return len.div_ceil(batch_size);
    }

    let partition = len / workers;
    let last = len - partition * (workers - 1);

    (workers - 1) * partition.div_ceil(batch_size) + last.div_ceil(batch_size)
}

#[derive(Config, Debug)]
pub struct StepDecayScheduleConfig {
    pub epoch_count: usize,
    pub iterations_per_epoch: usize,
}

impl StepDecayScheduleConfig {
    pub fn init(&self) -> StepDecaySchedule {
        StepDecaySchedule {
            epoch_count: self.epoch_count,
            iterations_per_epoch: self.iterations_per_epoch.max(1),
            iteration: 0,
        }
    }
}

/// [`learning_rate`] driven by the learner's per-iteration `step` calls.
#[derive(Clone, Debug)]
pub struct StepDecaySchedule {
    epoch_count: usize,
    iterations_per_epoch: usize,
    iteration: usize,
}

impl StepDecaySchedule {
    pub fn epoch(&self) -> usize {
        self.iteration / self.iterations_per_epoch
    }
}

impl LrScheduler for StepDecaySchedule {
    type Record<B: Backend> = usize;

    fn step(&mut self) -> LearningRate {
        let rate = learning_rate(self.epoch(), self.epoch_count);
        self.iteration += 1;

        rate
    }

    fn to_record<B: Backend>(&self) -> Self::Record<B> {
        self.iteration
    }

    fn load_record<B: Backend>(mut self, record: Self::Record<B>) -> Self {
        self.iteration = record;
        self
    }
}
