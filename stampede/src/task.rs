use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskSetError {
    #[error("Task set has no tasks")]
    Empty,

    #[error("Task at position {0} has a weight of zero")]
    ZeroWeight(usize),
}

/// The actions a user can pick from, and how it picks them.
#[derive(Clone, Debug)]
pub struct TaskSet<T> {
    tasks: Vec<T>,
    order: Order,
}

#[derive(Clone, Debug)]
enum Order {
    Weighted(WeightedIndex<u32>),
    Sequential { next: usize },
}

impl<T: Copy> TaskSet<T> {
    /// Random selection proportional to each task's weight.
    pub fn weighted(tasks: impl IntoIterator<Item = (T, u32)>) -> Result<Self, TaskSetError> {
        let (tasks, weights): (Vec<T>, Vec<u32>) = tasks.into_iter().unzip();
        if tasks.is_empty() {
            return Err(TaskSetError::Empty);
        }
        if let Some(pos) = weights.iter().position(|w| *w == 0) {
            return Err(TaskSetError::ZeroWeight(pos));
        }

        // Non-empty with all weights positive, so construction cannot fail.
        let index = WeightedIndex::new(&weights).map_err(|_| TaskSetError::Empty)?;
        Ok(Self {
            tasks,
            order: Order::Weighted(index),
        })
    }

    /// Tasks run in declared order, wrapping around at the end.
    pub fn sequential(tasks: impl IntoIterator<Item = T>) -> Result<Self, TaskSetError> {
        let tasks: Vec<T> = tasks.into_iter().collect();
        if tasks.is_empty() {
            return Err(TaskSetError::Empty);
        }
        Ok(Self {
            tasks,
            order: Order::Sequential { next: 0 },
        })
    }

    pub fn single(task: T) -> Self {
        Self {
            tasks: vec![task],
            order: Order::Sequential { next: 0 },
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn next_task<R: Rng + ?Sized>(&mut self, rng: &mut R) -> T {
        match &mut self.order {
            Order::Weighted(index) => self.tasks[index.sample(rng)],
            Order::Sequential { next } => {
                let task = self.tasks[*next];
                *next = (*next + 1) % self.tasks.len();
                task
            }
        }
    }
}
