//! Fixed-capacity FIFO of recent samples.

use std::collections::VecDeque;

use crate::recorder::sample::MetricSample;

/// Keeps the most recent `capacity` samples; the oldest is evicted on overflow.
#[derive(Debug)]
pub struct CircularSampleBuffer {
    samples: VecDeque<MetricSample>,
    capacity: usize,
}

impl CircularSampleBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, returning the evicted one if the buffer was full.
    pub fn push(&mut self, sample: MetricSample) -> Option<MetricSample> {
        let evicted = if self.samples.len() >= self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(sample);
        evicted
    }

    /// The last `limit` samples, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<MetricSample> {
        let skip = self.samples.len().saturating_sub(limit);
        self.samples.iter().skip(skip).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fill level as a percentage of capacity.
    pub fn utilization(&self) -> f64 {
        self.samples.len() as f64 / self.capacity as f64 * 100.0
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(n: u64) -> MetricSample {
        MetricSample {
            operation_name: "op".into(),
            duration_ms: n,
            is_synthetic: false,
            timestamp: Utc::now(),
            error_message: None,
            error_trace: None,
        }
    }

    #[test]
    fn test_evicts_oldest() {
        let mut buffer = CircularSampleBuffer::new(3);
        for n in 0..3 {
            assert!(buffer.push(sample(n)).is_none());
        }
        let evicted = buffer.push(sample(3)).unwrap();
        assert_eq!(evicted.duration_ms, 0);
        assert_eq!(buffer.len(), 3);

        let order: Vec<u64> = buffer.iter().map(|s| s.duration_ms).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_recent_is_chronological() {
        let mut buffer = CircularSampleBuffer::new(10);
        for n in 0..6 {
            buffer.push(sample(n));
        }
        let recent: Vec<u64> = buffer.recent(2).iter().map(|s| s.duration_ms).collect();
        assert_eq!(recent, vec![4, 5]);
        assert_eq!(buffer.recent(100).len(), 6);
        assert!(buffer.recent(0).is_empty());
    }

    #[test]
    fn test_utilization() {
        let mut buffer = CircularSampleBuffer::new(8);
        buffer.push(sample(1));
        buffer.push(sample(2));
        assert_eq!(buffer.utilization(), 25.0);
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
