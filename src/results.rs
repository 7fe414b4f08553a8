use core::fmt;

use crate::problem::nonzero_indices;
use crate::step::dot;

/// Misuse of a [`Results`] accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// Iterations must be recorded as 1, 2, 3, ... without gaps or repeats.
    OutOfOrder { expected: usize, actual: usize },
    /// More records than the declared iteration count.
    Overflow { capacity: usize },
    /// A vector argument has the wrong length.
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// An optional history was supplied on some iterations but not others.
    InconsistentHistory { what: &'static str },
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfOrder { expected, actual } => {
                write!(f, "recorded iteration {actual}, expected {expected}")
            }
            Self::Overflow { capacity } => {
                write!(f, "results already hold {capacity} iterations")
            }
            Self::DimensionMismatch {
                what,
                expected,
                actual,
            } => write!(f, "{what} length {actual} does not match expected {expected}"),
            Self::InconsistentHistory { what } => {
                write!(f, "{what} history must be supplied on every iteration or never")
            }
        }
    }
}

impl std::error::Error for RecordError {}

/// Row-major view over a per-iteration history buffer.
#[derive(Debug, Clone, Copy)]
pub struct History<'a> {
    data: &'a [f64],
    n: usize,
}

impl<'a> History<'a> {
    /// Number of recorded iterations.
    pub fn len(&self) -> usize {
        if self.n == 0 {
            0
        } else {
            self.data.len() / self.n
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Snapshot after iteration `i + 1`.
    pub fn iteration(&self, i: usize) -> &'a [f64] {
        &self.data[i * self.n..(i + 1) * self.n]
    }

    /// Trace of coordinate `j` across iterations.
    pub fn coordinate(&self, j: usize) -> Vec<f64> {
        (0..self.len()).map(|i| self.data[i * self.n + j]).collect()
    }

    /// Snapshots restricted to `coords`, one row per iteration.
    pub fn select(&self, coords: &[usize]) -> Vec<Vec<f64>> {
        (0..self.len())
            .map(|i| {
                let row = self.iteration(i);
                coords.iter().map(|&j| row[j]).collect()
            })
            .collect()
    }

    pub fn as_slice(&self) -> &'a [f64] {
        self.data
    }
}

/// Per-iteration metrics of one solver run.
///
/// Every series has one entry per recorded iteration; entry `i` describes
/// the state after iteration `i + 1`. A completed run holds exactly
/// `max_iter` entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Results {
    max_iter: usize,
    n: usize,
    x_true: Vec<f64>,
    x_true_norm: f64,
    idx_nonzeros: Vec<usize>,
    residual_ratio: Vec<f64>,
    one_norm: Vec<f64>,
    model_error: Vec<f64>,
    x_history: Vec<f64>,
    z_history: Option<Vec<f64>>,
    t_history: Option<Vec<f64>>,
}

impl Results {
    /// Empty accumulator for `max_iter` iterations of an `n`-vector.
    pub fn new(max_iter: usize, n: usize, x_true: &[f64]) -> Result<Self, RecordError> {
        if x_true.len() != n {
            return Err(RecordError::DimensionMismatch {
                what: "x_true",
                expected: n,
                actual: x_true.len(),
            });
        }
        Ok(Self {
            max_iter,
            n,
            x_true: x_true.to_vec(),
            x_true_norm: l2_norm(x_true),
            idx_nonzeros: nonzero_indices(x_true),
            residual_ratio: Vec::with_capacity(max_iter),
            one_norm: Vec::with_capacity(max_iter),
            model_error: Vec::with_capacity(max_iter),
            x_history: Vec::with_capacity(max_iter * n),
            z_history: None,
            t_history: None,
        })
    }

    /// Appends the metrics of iteration `iteration` (1-based).
    ///
    /// `z` and `t` are optional, but each must be supplied on every
    /// iteration or on none.
    pub fn record(
        &mut self,
        iteration: usize,
        residual: &[f64],
        b_sub: &[f64],
        x: &[f64],
        z: Option<&[f64]>,
        t: Option<&[f64]>,
    ) -> Result<(), RecordError> {
        let len = self.len();
        if len == self.max_iter {
            return Err(RecordError::Overflow {
                capacity: self.max_iter,
            });
        }
        if iteration != len + 1 {
            return Err(RecordError::OutOfOrder {
                expected: len + 1,
                actual: iteration,
            });
        }
        if residual.len() != b_sub.len() {
            return Err(RecordError::DimensionMismatch {
                what: "residual",
                expected: b_sub.len(),
                actual: residual.len(),
            });
        }
        self.check_len("x", x)?;
        if let Some(z) = z {
            self.check_len("z", z)?;
        }
        if let Some(t) = t {
            self.check_len("t", t)?;
        }
        check_presence("z", len, self.z_history.is_some(), z.is_some())?;
        check_presence("t", len, self.t_history.is_some(), t.is_some())?;

        self.residual_ratio
            .push(ratio(l2_norm(residual), l2_norm(b_sub)));
        self.one_norm.push(x.iter().map(|v| v.abs()).sum());
        let err = self
            .x_true
            .iter()
            .zip(x)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt();
        self.model_error.push(ratio(err, self.x_true_norm));
        self.x_history.extend_from_slice(x);
        if let Some(z) = z {
            let cap = self.max_iter * self.n;
            self.z_history
                .get_or_insert_with(|| Vec::with_capacity(cap))
                .extend_from_slice(z);
        }
        if let Some(t) = t {
            let cap = self.max_iter * self.n;
            self.t_history
                .get_or_insert_with(|| Vec::with_capacity(cap))
                .extend_from_slice(t);
        }
        Ok(())
    }

    fn check_len(&self, what: &'static str, v: &[f64]) -> Result<(), RecordError> {
        if v.len() == self.n {
            Ok(())
        } else {
            Err(RecordError::DimensionMismatch {
                what,
                expected: self.n,
                actual: v.len(),
            })
        }
    }

    /// Number of recorded iterations.
    pub fn len(&self) -> usize {
        self.residual_ratio.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residual_ratio.is_empty()
    }

    /// Declared iteration count.
    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    /// True once `max_iter` iterations are recorded.
    pub fn is_complete(&self) -> bool {
        self.len() == self.max_iter
    }

    pub fn n(&self) -> usize {
        self.n
    }

    /// `||r||_2 / ||b_sub||_2` per iteration.
    pub fn residual_ratio(&self) -> &[f64] {
        &self.residual_ratio
    }

    /// `||x||_1` per iteration.
    pub fn one_norm(&self) -> &[f64] {
        &self.one_norm
    }

    /// `||x_true - x||_2 / ||x_true||_2` per iteration.
    pub fn model_error(&self) -> &[f64] {
        &self.model_error
    }

    pub fn x_true(&self) -> &[f64] {
        &self.x_true
    }

    /// Coordinates where `x_true` is nonzero.
    pub fn nonzero_indices(&self) -> &[usize] {
        &self.idx_nonzeros
    }

    pub fn x_history(&self) -> History<'_> {
        History {
            data: &self.x_history,
            n: self.n,
        }
    }

    pub fn z_history(&self) -> Option<History<'_>> {
        self.z_history.as_deref().map(|data| History { data, n: self.n })
    }

    pub fn t_history(&self) -> Option<History<'_>> {
        self.t_history.as_deref().map(|data| History { data, n: self.n })
    }

    /// `x` history restricted to the first `limit` true-nonzero coordinates.
    pub fn x_history_nonzeros(&self, limit: usize) -> Vec<Vec<f64>> {
        self.x_history().select(self.window(limit))
    }

    /// `z` history restricted to the first `limit` true-nonzero coordinates.
    pub fn z_history_nonzeros(&self, limit: usize) -> Option<Vec<Vec<f64>>> {
        let window = self.window(limit);
        self.z_history().map(|h| h.select(window))
    }

    /// Step-size trace of the `k`-th true-nonzero coordinate.
    pub fn t_history_at_nonzero(&self, k: usize) -> Option<Vec<f64>> {
        let j = *self.idx_nonzeros.get(k)?;
        self.t_history().map(|h| h.coordinate(j))
    }

    /// Latest recorded iterate.
    pub fn final_iterate(&self) -> Option<&[f64]> {
        let len = self.len();
        if len == 0 {
            None
        } else {
            Some(self.x_history().iteration(len - 1))
        }
    }

    /// Fraction of true-nonzero coordinates that are nonzero in the latest
    /// iterate.
    ///
    /// `0.0` before anything is recorded; `1.0` when `x_true` has no
    /// nonzeros.
    pub fn percent_nonzeros_recovered(&self) -> f64 {
        let Some(x) = self.final_iterate() else {
            return 0.0;
        };
        if self.idx_nonzeros.is_empty() {
            return 1.0;
        }
        let hits = self.idx_nonzeros.iter().filter(|&&j| x[j] != 0.0).count();
        hits as f64 / self.idx_nonzeros.len() as f64
    }

    fn window(&self, limit: usize) -> &[usize] {
        &self.idx_nonzeros[..limit.min(self.idx_nonzeros.len())]
    }
}

fn check_presence(
    what: &'static str,
    len: usize,
    has_history: bool,
    supplied: bool,
) -> Result<(), RecordError> {
    if len > 0 && has_history != supplied {
        Err(RecordError::InconsistentHistory { what })
    } else {
        Ok(())
    }
}

/// `num / den`, falling back to `num` when `den` is zero.
fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        num
    } else {
        num / den
    }
}

pub(crate) fn l2_norm(x: &[f64]) -> f64 {
    dot(x, x).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_series() {
        let mut results = Results::new(2, 3, &[1.0, 0.0, 0.0]).unwrap();
        results
            .record(1, &[3.0, 4.0], &[0.0, 10.0], &[0.5, -0.5, 0.0], None, None)
            .unwrap();
        assert_eq!(results.residual_ratio(), &[0.5]);
        assert_eq!(results.one_norm(), &[1.0]);
        assert!((results.model_error()[0] - 0.5f64.sqrt()).abs() < 1e-15);
        assert!(!results.is_complete());
    }

    #[test]
    fn rejects_out_of_order_and_overflow() {
        let mut results = Results::new(1, 1, &[1.0]).unwrap();
        assert_eq!(
            results.record(2, &[0.0], &[1.0], &[0.0], None, None),
            Err(RecordError::OutOfOrder {
                expected: 1,
                actual: 2
            })
        );
        results.record(1, &[0.0], &[1.0], &[0.0], None, None).unwrap();
        assert_eq!(
            results.record(2, &[0.0], &[1.0], &[0.0], None, None),
            Err(RecordError::Overflow { capacity: 1 })
        );
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn rejects_repeated_iteration() {
        let mut results = Results::new(3, 1, &[1.0]).unwrap();
        results.record(1, &[0.0], &[1.0], &[0.0], None, None).unwrap();
        assert_eq!(
            results.record(1, &[0.0], &[1.0], &[0.0], None, None),
            Err(RecordError::OutOfOrder {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn optional_histories_must_be_consistent() {
        let mut results = Results::new(3, 2, &[1.0, 0.0]).unwrap();
        results
            .record(1, &[1.0], &[1.0], &[0.0, 0.0], Some(&[0.1, 0.2]), None)
            .unwrap();
        assert_eq!(
            results.record(2, &[1.0], &[1.0], &[0.0, 0.0], None, None),
            Err(RecordError::InconsistentHistory { what: "z" })
        );
        assert_eq!(
            results.record(2, &[1.0], &[1.0], &[0.0], Some(&[0.0, 0.0]), None),
            Err(RecordError::DimensionMismatch {
                what: "x",
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn histories_and_recovery() {
        let x_true = [0.0, 2.0, 0.0, -1.0];
        let mut results = Results::new(2, 4, &x_true).unwrap();
        let t = [0.5; 4];
        results
            .record(1, &[1.0], &[1.0], &[0.0, 0.0, 0.0, 0.0], Some(&[0.0; 4]), Some(&t))
            .unwrap();
        results
            .record(2, &[0.5], &[1.0], &[0.0, 1.5, 0.3, 0.0], Some(&[0.0, 2.5, 1.3, -0.9]), Some(&t))
            .unwrap();
        assert!(results.is_complete());
        assert_eq!(results.nonzero_indices(), &[1, 3]);
        assert_eq!(results.x_history().len(), 2);
        assert_eq!(results.x_history().coordinate(1), vec![0.0, 1.5]);
        assert_eq!(results.x_history_nonzeros(1), vec![vec![0.0], vec![1.5]]);
        assert_eq!(
            results.z_history_nonzeros(25).unwrap(),
            vec![vec![0.0, 0.0], vec![2.5, -0.9]]
        );
        assert_eq!(results.t_history_at_nonzero(1), Some(vec![0.5, 0.5]));
        assert_eq!(results.t_history_at_nonzero(2), None);
        assert_eq!(results.percent_nonzeros_recovered(), 0.5);
    }

    #[test]
    fn rejects_truth_of_wrong_length() {
        assert_eq!(
            Results::new(3, 2, &[1.0, 0.0, 0.0]),
            Err(RecordError::DimensionMismatch {
                what: "x_true",
                expected: 2,
                actual: 3
            })
        );
    }

    #[test]
    fn recovery_edge_cases() {
        let empty = Results::new(1, 2, &[0.0, 1.0]).unwrap();
        assert_eq!(empty.percent_nonzeros_recovered(), 0.0);

        let mut zero_truth = Results::new(1, 2, &[0.0, 0.0]).unwrap();
        zero_truth
            .record(1, &[0.0], &[0.0], &[0.0, 0.0], None, None)
            .unwrap();
        assert_eq!(zero_truth.percent_nonzeros_recovered(), 1.0);
        assert_eq!(zero_truth.residual_ratio(), &[0.0]);
        assert_eq!(zero_truth.model_error(), &[0.0]);
    }
}
