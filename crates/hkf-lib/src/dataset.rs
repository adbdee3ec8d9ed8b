use crate::error::LabelError;
use crate::segments::{BeatSegments, SEGMENT_LEN};
use serde::{Deserialize, Serialize};

/// Parallel segment/label sequences accumulated across records.
///
/// Every segment has the same width; mixing widths is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    segments: Vec<Vec<f64>>,
    labels: Vec<usize>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(segments: Vec<Vec<f64>>, labels: Vec<usize>) -> Result<Self, LabelError> {
        if segments.len() != labels.len() {
            return Err(LabelError::Unpaired {
                segments: segments.len(),
                labels: labels.len(),
            });
        }
        if let Some(first) = segments.first() {
            check_widths(first.len(), segments.iter().map(Vec::len))?;
        }
        Ok(Self { segments, labels })
    }

    pub fn push(&mut self, segment: Vec<f64>, label: usize) -> Result<(), LabelError> {
        if let Some(first) = self.segments.first() {
            check_widths(first.len(), std::iter::once(segment.len()))?;
        }
        self.segments.push(segment);
        self.labels.push(label);
        Ok(())
    }

    /// Append one record's segments in annotation order.
    ///
    /// Nothing is appended unless every segment matches the dataset width.
    pub fn extend_from(&mut self, beats: BeatSegments) -> Result<(), LabelError> {
        let expected = self
            .segments
            .first()
            .or_else(|| beats.segments.first().map(|seg| &seg.samples))
            .map(Vec::len);
        if let Some(expected) = expected {
            check_widths(expected, beats.segments.iter().map(|seg| seg.samples.len()))?;
        }
        self.segments.reserve(beats.segments.len());
        self.labels.reserve(beats.segments.len());
        for seg in beats.segments {
            self.segments.push(seg.samples);
            self.labels.push(seg.label);
        }
        Ok(())
    }

    /// Move every row of `other` onto the end of this dataset.
    pub fn append(&mut self, other: Dataset) -> Result<(), LabelError> {
        if let (Some(first), Some(incoming)) = (self.segments.first(), other.segments.first()) {
            check_widths(first.len(), std::iter::once(incoming.len()))?;
        }
        self.segments.extend(other.segments);
        self.labels.extend(other.labels);
        Ok(())
    }

    pub fn segments(&self) -> &[Vec<f64>] {
        &self.segments
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[f64], usize)> + '_ {
        self.segments
            .iter()
            .map(Vec::as_slice)
            .zip(self.labels.iter().copied())
    }

    /// Width of every segment (constant across the dataset).
    pub fn segment_len(&self) -> usize {
        self.segments.first().map_or(SEGMENT_LEN, Vec::len)
    }

    /// Rows picked by index, in the order given.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            segments: indices.iter().map(|&i| self.segments[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    pub fn into_parts(self) -> (Vec<Vec<f64>>, Vec<usize>) {
        (self.segments, self.labels)
    }

    pub fn class_counts(&self, classes: usize) -> Vec<usize> {
        let mut counts = vec![0; classes];
        for &label in &self.labels {
            if let Some(slot) = counts.get_mut(label) {
                *slot += 1;
            }
        }
        counts
    }
}

fn check_widths(
    expected: usize,
    widths: impl IntoIterator<Item = usize>,
) -> Result<(), LabelError> {
    match widths.into_iter().find(|&w| w != expected) {
        Some(found) => Err(LabelError::WidthMismatch { expected, found }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::Segment;

    #[test]
    fn extend_keeps_order_and_pairing() {
        let mut ds = Dataset::new();
        ds.push(vec![0.0; SEGMENT_LEN], 1).unwrap();
        ds.extend_from(BeatSegments {
            segments: vec![
                Segment {
                    position: 400,
                    label: 3,
                    samples: vec![1.0; SEGMENT_LEN],
                },
                Segment {
                    position: 900,
                    label: 0,
                    samples: vec![2.0; SEGMENT_LEN],
                },
            ],
            unknown_symbols: 4,
            boundary_drops: 1,
        })
        .unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.labels(), &[1, 3, 0]);
        assert_eq!(ds.segments()[2][0], 2.0);
        assert_eq!(ds.class_counts(5), vec![1, 1, 0, 1, 0]);
    }

    #[test]
    fn from_parts_requires_pairs() {
        assert!(Dataset::from_parts(vec![vec![0.0]], vec![]).is_err());
        let ds = Dataset::from_parts(vec![vec![0.0; 3], vec![1.0; 3]], vec![2, 4]).unwrap();
        assert_eq!(ds.segment_len(), 3);
        let picked = ds.select(&[1]);
        assert_eq!(picked.labels(), &[4]);
    }

    #[test]
    fn rejects_segments_of_a_different_width() {
        assert_eq!(
            Dataset::from_parts(vec![vec![0.0; 3], vec![0.0; 4]], vec![0, 1]),
            Err(LabelError::WidthMismatch {
                expected: 3,
                found: 4
            })
        );

        let mut ds = Dataset::new();
        ds.push(vec![0.0; SEGMENT_LEN], 0).unwrap();
        assert!(ds.push(vec![0.0; 10], 1).is_err());

        let mixed = BeatSegments {
            segments: vec![
                Segment {
                    position: 400,
                    label: 2,
                    samples: vec![1.0; SEGMENT_LEN],
                },
                Segment {
                    position: 900,
                    label: 2,
                    samples: vec![1.0; 12],
                },
            ],
            unknown_symbols: 0,
            boundary_drops: 0,
        };
        assert!(ds.extend_from(mixed).is_err());
        assert_eq!(ds.len(), 1);

        let narrow = Dataset::from_parts(vec![vec![0.0; 5]], vec![3]).unwrap();
        assert!(ds.append(narrow).is_err());
        assert_eq!(ds.len(), 1);
    }

    #[test]
    fn append_moves_rows_in_order() {
        let mut ds = Dataset::from_parts(vec![vec![0.0; 2]], vec![1]).unwrap();
        let more = Dataset::from_parts(vec![vec![1.0; 2], vec![2.0; 2]], vec![0, 4]).unwrap();
        ds.append(more).unwrap();
        assert_eq!(ds.labels(), &[1, 0, 4]);
        assert_eq!(ds.segments()[2][0], 2.0);
        ds.append(Dataset::new()).unwrap();
        assert_eq!(ds.len(), 3);
    }
}
