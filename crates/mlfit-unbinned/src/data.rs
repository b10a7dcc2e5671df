//! Columnar datasets for unbinned likelihood evaluation.

use mlfit_core::{Error, Result, Space};

/// Columnar event storage (Structure-of-Arrays): one column per axis of the data range.
#[derive(Debug, Clone)]
pub struct Dataset {
    data_range: Space,
    n_events: usize,
    columns: Vec<Vec<f64>>,
    weights: Option<Vec<f64>>,
}

impl Dataset {
    /// Create a dataset from materialized columns.
    ///
    /// `columns[i]` holds the values of axis `data_range.axes()[i]`. All columns must have the
    /// same length and finite values; when the range is bounded and has a single box, values
    /// must lie inside it.
    pub fn from_columns(
        data_range: Space,
        columns: Vec<Vec<f64>>,
        weights: Option<Vec<f64>>,
    ) -> Result<Self> {
        if !data_range.has_limits() {
            return Err(Error::InvalidSpace(format!(
                "a dataset needs a data range with limits, got {data_range}"
            )));
        }
        if columns.len() != data_range.n_axes() {
            return Err(Error::Validation(format!(
                "expected {} column(s) for {data_range}, got {}",
                data_range.n_axes(),
                columns.len()
            )));
        }

        let n_events = columns[0].len();
        for (i, col) in columns.iter().enumerate() {
            let axis = data_range.axes()[i];
            if col.len() != n_events {
                return Err(Error::Validation(format!(
                    "column length mismatch for axis {axis}: expected {n_events}, got {}",
                    col.len()
                )));
            }
            if col.iter().any(|x| !x.is_finite()) {
                return Err(Error::Validation(format!("axis {axis} contains non-finite values")));
            }
        }
        if data_range.n_limits() == 1 {
            let (lower, upper) = data_range.limits()?;
            for (i, col) in columns.iter().enumerate() {
                let (lo, hi) = (lower[0][i], upper[0][i]);
                if col.iter().any(|&x| x < lo || x > hi) {
                    return Err(Error::Validation(format!(
                        "axis {} contains values outside the data range ({lo}, {hi})",
                        data_range.axes()[i]
                    )));
                }
            }
        }

        if let Some(w) = &weights {
            if w.len() != n_events {
                return Err(Error::Validation(format!(
                    "weights length mismatch: expected {n_events}, got {}",
                    w.len()
                )));
            }
            if w.iter().any(|x| !x.is_finite() || *x < 0.0) {
                return Err(Error::Validation("weights must be finite and >= 0".into()));
            }
        }

        Ok(Self { data_range, n_events, columns, weights })
    }

    /// One-dimensional dataset on `[low, high]` of `axis`.
    pub fn from_values(axis: usize, low: f64, high: f64, values: Vec<f64>) -> Result<Self> {
        Self::from_columns(Space::interval(axis, low, high)?, vec![values], None)
    }

    /// Concatenate datasets defined on the same data range.
    pub fn merge(datasets: &[Dataset]) -> Result<Self> {
        let Some(first) = datasets.first() else {
            return Err(Error::Validation("cannot merge an empty list of datasets".into()));
        };
        if datasets.iter().any(|d| d.data_range != first.data_range) {
            return Err(Error::Validation("datasets must share the same data range to be merged".into()));
        }
        let weighted = datasets.iter().any(|d| d.weights.is_some());
        let mut columns = vec![Vec::new(); first.columns.len()];
        let mut weights = Vec::new();
        for d in datasets {
            for (out, col) in columns.iter_mut().zip(&d.columns) {
                out.extend_from_slice(col);
            }
            if weighted {
                match &d.weights {
                    Some(w) => weights.extend_from_slice(w),
                    None => weights.extend(std::iter::repeat_n(1.0, d.n_events)),
                }
            }
        }
        Self::from_columns(first.data_range.clone(), columns, weighted.then_some(weights))
    }

    /// Range the data is defined in.
    pub fn data_range(&self) -> &Space {
        &self.data_range
    }

    /// Number of events.
    pub fn n_events(&self) -> usize {
        self.n_events
    }

    /// Column of `axis`, if present.
    pub fn column(&self, axis: usize) -> Option<&[f64]> {
        self.data_range.axis_position(axis).map(|i| self.columns[i].as_slice())
    }

    /// Columns reordered to `axes`.
    pub fn columns_for(&self, axes: &[usize]) -> Result<Vec<Vec<f64>>> {
        axes.iter()
            .map(|&a| {
                self.column(a).map(<[f64]>::to_vec).ok_or_else(|| {
                    Error::Validation(format!("dataset over {} has no axis {a}", self.data_range))
                })
            })
            .collect()
    }

    /// `true` if every axis in `axes` has a column.
    pub fn has_axes(&self, axes: &[usize]) -> bool {
        axes.iter().all(|&a| self.data_range.axis_position(a).is_some())
    }

    /// Optional per-event weights.
    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    /// Effective number of observed events: sum of weights, or the event count if unweighted.
    pub fn sum_weights(&self) -> f64 {
        match &self.weights {
            Some(w) => w.iter().sum(),
            None => self.n_events as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_reordered_by_axis() {
        let range = Space::new(vec![1, 0], vec![(0.0, 10.0), (-1.0, 1.0)]).unwrap();
        let ds = Dataset::from_columns(range, vec![vec![1.0, 2.0], vec![0.5, -0.5]], None).unwrap();
        assert_eq!(ds.n_events(), 2);
        assert_eq!(ds.column(0).unwrap(), &[0.5, -0.5]);
        assert_eq!(ds.columns_for(&[0, 1]).unwrap(), vec![vec![0.5, -0.5], vec![1.0, 2.0]]);
        assert!(ds.columns_for(&[2]).is_err());
        assert!(ds.has_axes(&[0, 1]));
    }

    #[test]
    fn test_validation() {
        assert!(Dataset::from_values(0, 0.0, 1.0, vec![0.5, 2.0]).is_err());
        assert!(Dataset::from_values(0, 0.0, 1.0, vec![f64::NAN]).is_err());
        let range = Space::interval(0, 0.0, 1.0).unwrap();
        assert!(Dataset::from_columns(range.clone(), vec![vec![0.1], vec![0.2]], None).is_err());
        assert!(Dataset::from_columns(range.clone(), vec![vec![0.1]], Some(vec![-1.0])).is_err());
        let bare = Space::axes_only(vec![0]).unwrap();
        assert!(matches!(
            Dataset::from_columns(bare, vec![vec![0.1]], None),
            Err(Error::InvalidSpace(_))
        ));
    }

    #[test]
    fn test_merge_and_weights() {
        let a = Dataset::from_values(0, 0.0, 1.0, vec![0.1, 0.2]).unwrap();
        let range = Space::interval(0, 0.0, 1.0).unwrap();
        let b = Dataset::from_columns(range, vec![vec![0.3]], Some(vec![2.5])).unwrap();
        let merged = Dataset::merge(&[a.clone(), b]).unwrap();
        assert_eq!(merged.n_events(), 3);
        assert_eq!(merged.weights().unwrap(), &[1.0, 1.0, 2.5]);
        assert_eq!(merged.sum_weights(), 4.5);
        assert_eq!(a.sum_weights(), 2.0);

        let other = Dataset::from_values(0, 0.0, 2.0, vec![1.5]).unwrap();
        assert!(Dataset::merge(&[a, other]).is_err());
    }
}
