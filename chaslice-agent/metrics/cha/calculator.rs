// Derived CHA figures: counter deltas and per-event statistics

use crate::error::{ChaSliceError, Result};
use crate::metrics::cha::{CountsTable, TableShape};

/// Element-wise `new - old` with wraparound
pub fn calculate_cha_counters(old: &CountsTable, new: &CountsTable) -> Result<CountsTable> {
    if old.shape() != new.shape() {
        return Err(ChaSliceError::InvalidConfiguration(format!(
            "counts tables differ in shape: {:?} vs {:?}",
            old.shape(),
            new.shape()
        )));
    }

    let data = old
        .raw()
        .iter()
        .zip(new.raw())
        .map(|(&before, &after)| after.wrapping_sub(before))
        .collect();
    Ok(CountsTable::from_raw(new.shape(), data))
}

/// Mean and population standard deviation of one box over all runs
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoxStatistics {
    pub mean: f64,
    pub std_dev: f64,
}

impl BoxStatistics {
    pub fn from_samples(samples: &[u64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let n = samples.len() as f64;
        let (sum, sum_sq) = samples.iter().fold((0.0, 0.0), |(s, sq), &x| {
            let x = x as f64;
            (s + x, sq + x * x)
        });
        let mean = sum / n;
        let variance = (sum_sq / n - mean * mean).max(0.0);

        Self {
            mean,
            std_dev: variance.sqrt(),
        }
    }
}

/// Mean and maximum of one socket over runs and boxes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SocketStatistics {
    pub mean: f64,
    pub max: u64,
}

/// Aggregates of a counts table, per event
#[derive(Debug, Clone)]
pub struct ChaStatistics {
    shape: TableShape,
    overall: Vec<f64>,
    sockets: Vec<SocketStatistics>,
    boxes: Vec<BoxStatistics>,
}

impl ChaStatistics {
    pub fn compute(table: &CountsTable) -> Self {
        let shape = table.shape();
        let mut overall = vec![0.0; shape.events];
        let mut sockets = vec![SocketStatistics::default(); shape.sockets * shape.events];
        let mut boxes = Vec::with_capacity(shape.sockets * shape.boxes * shape.events);

        for socket in 0..shape.sockets {
            for cha in 0..shape.boxes {
                for event in 0..shape.events {
                    let samples = table.runs_of(socket, cha, event);
                    let total: f64 = samples.iter().map(|&x| x as f64).sum();

                    overall[event] += total;
                    let s = &mut sockets[socket * shape.events + event];
                    s.mean += total;
                    s.max = s.max.max(samples.iter().copied().max().unwrap_or(0));

                    boxes.push(BoxStatistics::from_samples(&samples));
                }
            }
        }

        let per_socket = (shape.runs * shape.boxes) as f64;
        let per_event = per_socket * shape.sockets as f64;
        if per_event > 0.0 {
            overall.iter_mut().for_each(|v| *v /= per_event);
            sockets.iter_mut().for_each(|s| s.mean /= per_socket);
        }

        Self {
            shape,
            overall,
            sockets,
            boxes,
        }
    }

    pub fn shape(&self) -> TableShape {
        self.shape
    }

    /// Mean over runs, sockets and boxes
    pub fn overall_mean(&self, event: usize) -> f64 {
        self.overall.get(event).copied().unwrap_or(0.0)
    }

    pub fn socket(&self, socket: usize, event: usize) -> SocketStatistics {
        if socket >= self.shape.sockets || event >= self.shape.events {
            return SocketStatistics::default();
        }
        self.sockets[socket * self.shape.events + event]
    }

    pub fn cha(&self, socket: usize, cha: usize, event: usize) -> BoxStatistics {
        if socket >= self.shape.sockets || cha >= self.shape.boxes || event >= self.shape.events {
            return BoxStatistics::default();
        }
        self.boxes[(socket * self.shape.boxes + cha) * self.shape.events + event]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_wraps_around() {
        let mut old = CountsTable::new(1, 1, 1, 2);
        let mut new = CountsTable::new(1, 1, 1, 2);
        old.set(0, 0, 0, 0, 100);
        new.set(0, 0, 0, 0, 250);
        old.set(0, 0, 0, 1, u64::MAX - 4);
        new.set(0, 0, 0, 1, 5);

        let delta = calculate_cha_counters(&old, &new).unwrap();
        assert_eq!(delta.get(0, 0, 0, 0), Some(150));
        assert_eq!(delta.get(0, 0, 0, 1), Some(10));
    }

    #[test]
    fn test_statistics_of_wrapped_deltas() {
        // A wrap that reads backwards yields deltas near u64::MAX
        let mut old = CountsTable::new(2, 1, 1, 1);
        let mut new = CountsTable::new(2, 1, 1, 1);
        for run in 0..2 {
            old.set(run, 0, 0, 0, 10);
            new.set(run, 0, 0, 0, 5);
        }

        let delta = calculate_cha_counters(&old, &new).unwrap();
        assert_eq!(delta.get(0, 0, 0, 0), Some(u64::MAX - 4));

        let stats = ChaStatistics::compute(&delta);
        let expected = (u64::MAX - 4) as f64;
        assert!((stats.overall_mean(0) - expected).abs() <= expected * 1e-12);
        assert!((stats.socket(0, 0).mean - expected).abs() <= expected * 1e-12);
        assert_eq!(stats.socket(0, 0).max, u64::MAX - 4);
    }

    #[test]
    fn test_delta_shape_mismatch() {
        let old = CountsTable::new(1, 1, 1, 2);
        let new = CountsTable::new(1, 1, 2, 2);
        assert!(calculate_cha_counters(&old, &new).is_err());
    }

    #[test]
    fn test_std_dev_exact_values() {
        let constant = BoxStatistics::from_samples(&[10; 10]);
        assert_eq!(constant.mean, 10.0);
        assert_eq!(constant.std_dev, 0.0);

        let spread = BoxStatistics::from_samples(&[0, 20]);
        assert_eq!(spread.mean, 10.0);
        assert_eq!(spread.std_dev, 10.0);

        assert_eq!(BoxStatistics::from_samples(&[]), BoxStatistics::default());
    }

    #[test]
    fn test_aggregation_axes() {
        // 2 runs, 2 sockets, 2 boxes, 1 event
        let mut table = CountsTable::new(2, 2, 2, 1);
        table.set(0, 0, 0, 0, 4);
        table.set(1, 0, 0, 0, 8);
        table.set(0, 0, 1, 0, 0);
        table.set(1, 0, 1, 0, 0);
        table.set(0, 1, 1, 0, 20);
        table.set(1, 1, 1, 0, 20);

        let stats = ChaStatistics::compute(&table);
        assert_eq!(stats.overall_mean(0), 52.0 / 8.0);
        assert_eq!(stats.socket(0, 0).mean, 3.0);
        assert_eq!(stats.socket(0, 0).max, 8);
        assert_eq!(stats.socket(1, 0).mean, 10.0);
        assert_eq!(stats.socket(1, 0).max, 20);
        assert_eq!(stats.cha(0, 0, 0).mean, 6.0);
        assert_eq!(stats.cha(0, 0, 0).std_dev, 2.0);
        assert_eq!(stats.cha(1, 1, 0).std_dev, 0.0);
        assert_eq!(stats.cha(5, 0, 0), BoxStatistics::default());
    }
}
