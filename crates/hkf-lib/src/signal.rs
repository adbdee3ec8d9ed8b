use crate::error::AnnotationError;
use serde::{Deserialize, Serialize};

/// Basic typed time series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.fs
    }
}

/// Expert annotations aligned to a record's sample axis.
///
/// `samples[i]` and `symbols[i]` describe the same annotation; the two vectors
/// always have equal length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    samples: Vec<usize>,
    symbols: Vec<char>,
}

impl Annotation {
    pub fn new(samples: Vec<usize>, symbols: Vec<char>) -> Result<Self, AnnotationError> {
        if samples.len() != symbols.len() {
            return Err(AnnotationError::LengthMismatch {
                samples: samples.len(),
                symbols: symbols.len(),
            });
        }
        Ok(Self { samples, symbols })
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (usize, char)>,
    {
        let (samples, symbols) = pairs.into_iter().unzip();
        Self { samples, symbols }
    }

    pub fn samples(&self) -> &[usize] {
        &self.samples
    }

    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, char)> + '_ {
        self.samples.iter().copied().zip(self.symbols.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unpaired_annotation() {
        let err = Annotation::new(vec![1, 2, 3], vec!['N', 'V']).unwrap_err();
        assert_eq!(
            err,
            AnnotationError::LengthMismatch {
                samples: 3,
                symbols: 2
            }
        );
    }

    #[test]
    fn pairs_round_trip_through_iter() {
        let ann = Annotation::from_pairs([(10, 'N'), (370, 'A'), (700, '+')]);
        assert_eq!(ann.len(), 3);
        assert_eq!(ann.samples(), &[10, 370, 700]);
        let collected: Vec<_> = ann.iter().collect();
        assert_eq!(collected[1], (370, 'A'));
    }
}
