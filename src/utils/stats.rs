//! Running statistics
use num_traits::Float;
use std::iter::{Extend, FromIterator};

/// Running mean and (population) variance of a stream of values, by Welford's algorithm.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct OnlineMeanVariance<T> {
    count: u64,
    mean: T,
    /// Sum of squared differences from the running mean.
    m2: T,
}

impl<T: Float> Default for OnlineMeanVariance<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OnlineMeanVariance<T> {
    pub const fn count(&self) -> u64 {
        self.count
    }
}

impl<T: Float> OnlineMeanVariance<T> {
    pub fn new() -> Self {
        Self {
            count: 0,
            mean: T::zero(),
            m2: T::zero(),
        }
    }

    pub fn mean(&self) -> Option<T> {
        (self.count > 0).then(|| self.mean)
    }

    pub fn variance(&self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        Some(self.m2 / T::from(self.count)?)
    }

    pub fn stddev(&self) -> Option<T> {
        self.variance().map(Float::sqrt)
    }

    pub fn push(&mut self, value: T) {
        self.count += 1;
        let n = T::from(self.count).unwrap_or_else(T::infinity);
        let delta = value - self.mean;
        self.mean = self.mean + delta / n;
        self.m2 = self.m2 + delta * (value - self.mean);
    }
}

impl<T: Float> Extend<T> for OnlineMeanVariance<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

impl<T: Float> FromIterator<T> for OnlineMeanVariance<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut stats = Self::new();
        stats.extend(iter);
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_variance() {
        let stats: OnlineMeanVariance<f64> = [1.0, 2.0, 3.0, 4.0].into_iter().collect();
        assert_eq!(stats.count(), 4);
        assert_eq!(stats.mean(), Some(2.5));
        assert!((stats.variance().unwrap() - 1.25).abs() < 1e-12);
    }

    #[test]
    fn empty_has_no_statistics() {
        let stats = OnlineMeanVariance::<f32>::new();
        assert_eq!(stats.mean(), None);
        assert_eq!(stats.stddev(), None);
    }
}
