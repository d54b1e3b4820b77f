//! Fanout-indexed propagation-delay tables.
//!
//! The delay-mode mapper looks up the propagation delay of one basic block
//! by the number of fanouts it drives. Tables are loaded from a plain-text
//! file: the first token is the number of explicit entries, each following
//! line is a `fanout delay` pair. Fanout 0 is implicitly 0.0, and queries
//! beyond the last tabulated fanout are linearly extrapolated from the last
//! two points.

use std::path::Path;

use log::debug;
use thiserror::Error;

/// A fatal delay-table parse failure; there is no partial recovery.
#[derive(Debug, Error)]
pub enum DelayTableError {
    #[error("delay table is missing the entry count")]
    MissingCount,
    #[error("delay table entry count must be at least 1, got {0}")]
    BadCount(i64),
    #[error("malformed delay table token {0:?}")]
    Malformed(String),
    #[error("negative fanout count {0}")]
    NegativeFanout(i64),
    #[error("negative delay value {0}")]
    NegativeDelay(f64),
    #[error("duplicate entry for fanout {0}")]
    DuplicateFanout(usize),
    #[error("expected {expected} entries, found {found}")]
    Truncated { expected: usize, found: usize },
    #[error("cannot read delay table: {0}")]
    Io(#[from] std::io::Error),
}

/// Propagation delay as a function of fanout count.
#[derive(Debug, Clone)]
pub struct DelayTable {
    /// `(fanout, delay)` pairs sorted by fanout, starting at fanout 0.
    entries: Vec<(usize, f64)>,
}

impl DelayTable {
    /// Build a table from a dense delay vector indexed by fanout count.
    pub fn from_delays(delays: Vec<f64>) -> Self {
        assert!(delays.len() >= 2, "need at least fanouts 0 and 1");
        let entries = delays.into_iter().enumerate().collect();
        Self { entries }
    }

    pub fn parse(text: &str) -> Result<Self, DelayTableError> {
        let mut tokens = text.split_whitespace();
        let count_token = tokens.next().ok_or(DelayTableError::MissingCount)?;
        let count: i64 = count_token
            .parse()
            .map_err(|_| DelayTableError::Malformed(count_token.to_string()))?;
        if count < 1 {
            return Err(DelayTableError::BadCount(count));
        }

        let mut entries: Vec<(usize, f64)> = Vec::with_capacity(count as usize + 1);
        for i in 0..count as usize {
            let fanout_token = match tokens.next() {
                Some(t) => t,
                None => {
                    return Err(DelayTableError::Truncated { expected: count as usize, found: i })
                }
            };
            let fanout: i64 = fanout_token
                .parse()
                .map_err(|_| DelayTableError::Malformed(fanout_token.to_string()))?;
            if fanout < 0 {
                return Err(DelayTableError::NegativeFanout(fanout));
            }
            let delay_token = match tokens.next() {
                Some(t) => t,
                None => {
                    return Err(DelayTableError::Truncated { expected: count as usize, found: i })
                }
            };
            let delay: f64 = delay_token
                .parse()
                .map_err(|_| DelayTableError::Malformed(delay_token.to_string()))?;
            if delay < 0.0 {
                return Err(DelayTableError::NegativeDelay(delay));
            }
            entries.push((fanout as usize, delay));
        }

        if entries.iter().all(|&(f, _)| f != 0) {
            entries.push((0, 0.0));
        }
        entries.sort_by_key(|&(f, _)| f);
        for pair in entries.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(DelayTableError::DuplicateFanout(pair[0].0));
            }
        }
        if entries.len() < 2 {
            // Only the fanout-0 point: no slope to extrapolate from.
            return Err(DelayTableError::Malformed("no entry beyond fanout 0".to_string()));
        }
        debug!("delay table: {} entries up to fanout {}", entries.len(), entries.last().unwrap().0);
        Ok(Self { entries })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DelayTableError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Delay for driving `fanout` sinks.
    ///
    /// Tabulated fanouts are answered exactly, gaps are linearly
    /// interpolated, and fanouts beyond the table are linearly extrapolated
    /// from the last two tabulated points.
    pub fn lookup(&self, fanout: usize) -> f64 {
        match self.entries.binary_search_by_key(&fanout, |&(f, _)| f) {
            Ok(i) => self.entries[i].1,
            Err(i) if i == self.entries.len() => {
                let (f2, d2) = self.entries[self.entries.len() - 1];
                let (f1, d1) = self.entries[self.entries.len() - 2];
                let slope = (d2 - d1) / (f2 - f1) as f64;
                d2 + slope * (fanout - f2) as f64
            }
            Err(i) => {
                let (f1, d1) = self.entries[i - 1];
                let (f2, d2) = self.entries[i];
                let slope = (d2 - d1) / (f2 - f1) as f64;
                d1 + slope * (fanout - f1) as f64
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_lookup_and_extrapolation() {
        let table = DelayTable::from_delays(vec![0.0, 2.3, 3.0, 3.9, 5.4]);
        assert_eq!(table.lookup(0), 0.0);
        assert_eq!(table.lookup(3), 3.9);
        // Beyond the table: 5.4 + (5.4 - 3.9) * (6 - 4) = 8.4.
        assert!((table.lookup(6) - 8.4).abs() < 1e-9);
    }

    #[test]
    fn test_parse() {
        let table = DelayTable::parse("4\n1 2.3\n2 3.0\n3 3.9\n4 5.4\n").unwrap();
        assert_eq!(table.lookup(0), 0.0);
        assert_eq!(table.lookup(2), 3.0);
        assert!((table.lookup(6) - 8.4).abs() < 1e-9);
    }

    #[test]
    fn test_bad_count() {
        assert!(matches!(DelayTable::parse("0\n"), Err(DelayTableError::BadCount(0))));
        assert!(matches!(DelayTable::parse(""), Err(DelayTableError::MissingCount)));
    }

    #[test]
    fn test_negative_values() {
        assert!(matches!(
            DelayTable::parse("1\n-2 1.0\n"),
            Err(DelayTableError::NegativeFanout(-2))
        ));
        assert!(matches!(
            DelayTable::parse("1\n1 -0.5\n"),
            Err(DelayTableError::NegativeDelay(_))
        ));
    }

    #[test]
    fn test_truncated() {
        assert!(matches!(
            DelayTable::parse("3\n1 2.0\n"),
            Err(DelayTableError::Truncated { expected: 3, found: 1 })
        ));
    }

    #[test]
    fn test_single_entry_extrapolates_through_origin() {
        let table = DelayTable::parse("1\n2 4.0\n").unwrap();
        // Last two points are (0, 0) and (2, 4): slope 2 per fanout.
        assert!((table.lookup(3) - 6.0).abs() < 1e-9);
        assert!((table.lookup(1) - 2.0).abs() < 1e-9);
    }
}
