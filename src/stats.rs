use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Heap entry with a total order over `f64`.
#[derive(Debug, Clone, Copy)]
struct Sample(f64);

impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Sample {}

impl PartialOrd for Sample {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Sample {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Exact running median over a stream of samples.
///
/// The lower half lives in a max-heap and the upper half in a min-heap. After
/// every push the lower half holds either the same number of samples as the
/// upper half or exactly one more.
#[derive(Debug, Default, Clone)]
pub struct RunningMedian {
    lower: BinaryHeap<Sample>,
    upper: BinaryHeap<Reverse<Sample>>,
}

impl RunningMedian {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        match self.lower.peek() {
            Some(top) if value > top.0 => self.upper.push(Reverse(Sample(value))),
            _ => self.lower.push(Sample(value)),
        }

        if self.lower.len() > self.upper.len() + 1 {
            if let Some(moved) = self.lower.pop() {
                self.upper.push(Reverse(moved));
            }
        } else if self.upper.len() > self.lower.len() {
            if let Some(Reverse(moved)) = self.upper.pop() {
                self.lower.push(moved);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lower.len() + self.upper.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn median(&self) -> Option<f64> {
        let low = self.lower.peek()?.0;

        if self.lower.len() > self.upper.len() {
            return Some(low);
        }

        let high = self.upper.peek().map(|Reverse(s)| s.0)?;
        Some((low + high) / 2.0)
    }
}

impl Extend<f64> for RunningMedian {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RunningMean {
    sum: f64,
    count: usize,
}

impl RunningMean {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

impl Extend<f64> for RunningMean {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

/// Median of `values`, or `None` when there are none.
pub fn median<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let mut running = RunningMedian::new();
    running.extend(values);
    running.median()
}

/// Arithmetic mean of `values`, or `None` when there are none.
pub fn mean<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let mut running = RunningMean::new();
    running.extend(values);
    running.mean()
}

/// Median and mean gathered in one pass.
#[derive(Debug, Default, Clone)]
pub struct Aggregate {
    median: RunningMedian,
    mean: RunningMean,
}

impl Aggregate {
    pub fn push(&mut self, value: f64) {
        self.median.push(value);
        self.mean.push(value);
    }

    pub fn push_opt(&mut self, value: Option<f64>) {
        if let Some(value) = value {
            self.push(value);
        }
    }

    pub fn median(&self) -> Option<f64> {
        self.median.median()
    }

    pub fn mean(&self) -> Option<f64> {
        self.mean.mean()
    }
}
