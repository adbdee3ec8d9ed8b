//! Fixed-width beat windows cut from a denoised signal around annotated beats.

use crate::error::ConfigError;
use crate::signal::Annotation;
use serde::{Deserialize, Serialize};

/// Leading annotations skipped in every record (unstable lead-in beats).
pub const TRIM_START: usize = 10;
/// Trailing annotations skipped in every record.
pub const TRIM_END: usize = 5;
/// Samples taken before the beat position; the beat lands at this offset.
pub const PRE_BEAT: usize = 99;
/// Exclusive end offset after the beat position.
pub const POST_BEAT: usize = 201;
pub const SEGMENT_LEN: usize = PRE_BEAT + POST_BEAT;

/// Ordered closed set of annotation symbols; a symbol's position is its label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<char>", into = "Vec<char>")]
pub struct ClassSet {
    symbols: Vec<char>,
}

/// Normal, atrial premature, premature ventricular, left and right bundle branch block.
pub const MITDB_CLASSES: [char; 5] = ['N', 'A', 'V', 'L', 'R'];

impl Default for ClassSet {
    fn default() -> Self {
        Self {
            symbols: MITDB_CLASSES.to_vec(),
        }
    }
}

impl TryFrom<Vec<char>> for ClassSet {
    type Error = ConfigError;

    fn try_from(symbols: Vec<char>) -> Result<Self, Self::Error> {
        ClassSet::new(symbols)
    }
}

impl From<ClassSet> for Vec<char> {
    fn from(set: ClassSet) -> Self {
        set.symbols
    }
}

impl ClassSet {
    pub fn new(symbols: Vec<char>) -> Result<Self, ConfigError> {
        if symbols.is_empty() {
            return Err(ConfigError::EmptyClassSet);
        }
        for (i, sym) in symbols.iter().enumerate() {
            if symbols[..i].contains(sym) {
                return Err(ConfigError::DuplicateClassSymbol(*sym));
            }
        }
        Ok(Self { symbols })
    }

    pub fn index_of(&self, symbol: char) -> Option<usize> {
        self.symbols.iter().position(|&s| s == symbol)
    }

    pub fn symbol(&self, label: usize) -> Option<char> {
        self.symbols.get(label).copied()
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
}

/// One labelled window of `SEGMENT_LEN` denoised samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Sample index of the annotated beat in the source record.
    pub position: usize,
    pub label: usize,
    pub samples: Vec<f64>,
}

/// Extraction output plus counts of the beats that were passed over.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeatSegments {
    pub segments: Vec<Segment>,
    /// Beats whose symbol is outside the class set.
    pub unknown_symbols: usize,
    /// Beats too close to either end of the signal for a full window.
    pub boundary_drops: usize,
}

impl BeatSegments {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of emitted segments per label.
    pub fn class_counts(&self, classes: usize) -> Vec<usize> {
        let mut counts = vec![0; classes];
        for seg in &self.segments {
            if let Some(slot) = counts.get_mut(seg.label) {
                *slot += 1;
            }
        }
        counts
    }
}

/// Window `[position - PRE_BEAT, position + POST_BEAT)` if it fits inside `signal`.
pub fn beat_window(signal: &[f64], position: usize) -> Option<&[f64]> {
    let start = position.checked_sub(PRE_BEAT)?;
    let end = position.checked_add(POST_BEAT)?;
    signal.get(start..end)
}

/// Cut labelled windows for every annotation between the trimmed ends of the list.
///
/// Unknown symbols and windows that would cross a signal edge are counted and
/// skipped; neither stops the iteration.
pub fn extract(denoised: &[f64], annotation: &Annotation, classes: &ClassSet) -> BeatSegments {
    let mut out = BeatSegments::default();
    let end = annotation.len().saturating_sub(TRIM_END);
    if end <= TRIM_START {
        return out;
    }
    let samples = annotation.samples();
    let symbols = annotation.symbols();
    for i in TRIM_START..end {
        let Some(label) = classes.index_of(symbols[i]) else {
            out.unknown_symbols += 1;
            continue;
        };
        match beat_window(denoised, samples[i]) {
            Some(window) => out.segments.push(Segment {
                position: samples[i],
                label,
                samples: window.to_vec(),
            }),
            None => out.boundary_drops += 1,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::kalman::{cascade_filter, CascadeConfig};

    /// `TRIM_START` fillers, the beats under test, then `TRIM_END` fillers.
    fn padded(beats: &[(usize, char)]) -> Annotation {
        let mut pairs = Vec::new();
        for k in 0..TRIM_START {
            pairs.push((300 + 20 * k, 'N'));
        }
        pairs.extend_from_slice(beats);
        for k in 0..TRIM_END {
            pairs.push((520 + 20 * k, 'N'));
        }
        Annotation::from_pairs(pairs)
    }

    #[test]
    fn spike_is_centred_and_smoothed() {
        let mut raw = vec![0.0; 1000];
        raw[500] = 100.0;
        let denoised = cascade_filter(&raw, &CascadeConfig::default());
        let out = extract(&denoised, &padded(&[(500, 'N')]), &ClassSet::default());
        assert_eq!(out.len(), 1);
        let seg = &out.segments[0];
        assert_eq!(seg.label, 0);
        assert_eq!(seg.position, 500);
        assert_eq!(seg.samples.len(), SEGMENT_LEN);
        let centre = seg.samples[PRE_BEAT];
        assert_eq!(centre, denoised[500]);
        assert!(centre > 0.0 && centre < 100.0, "centre {}", centre);
        assert_eq!(seg.samples[PRE_BEAT - 1], 0.0);
    }

    #[test]
    fn unknown_symbol_is_skipped_not_fatal() {
        let signal = vec![0.5; 1000];
        let ann = padded(&[(400, 'Q'), (500, 'V'), (600, '+')]);
        let out = extract(&signal, &ann, &ClassSet::default());
        assert_eq!(out.unknown_symbols, 2);
        assert_eq!(out.boundary_drops, 0);
        assert_eq!(out.len(), 1);
        assert_eq!(out.segments[0].label, 2);
    }

    #[test]
    fn beats_near_edges_are_dropped() {
        let signal = vec![1.0; 1000];
        let ann = padded(&[(50, 'N'), (98, 'A'), (99, 'A'), (799, 'L'), (800, 'R')]);
        let out = extract(&signal, &ann, &ClassSet::default());
        assert_eq!(out.boundary_drops, 3);
        let positions: Vec<_> = out.segments.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![99, 799]);
        assert!(out.segments.iter().all(|s| s.samples.len() == SEGMENT_LEN));
    }

    #[test]
    fn trimmed_annotations_never_emit() {
        let signal: Vec<f64> = (0..20_000).map(|i| i as f64).collect();
        let pairs: Vec<(usize, char)> = (0..30).map(|k| (200 + 500 * k, 'N')).collect();
        let ann = Annotation::from_pairs(pairs);
        let out = extract(&signal, &ann, &ClassSet::default());
        assert_eq!(out.len(), 30 - TRIM_START - TRIM_END);
        let first = out.segments.first().unwrap().position;
        let last = out.segments.last().unwrap().position;
        assert_eq!(first, 200 + 500 * TRIM_START);
        assert_eq!(last, 200 + 500 * (30 - TRIM_END - 1));
        // window starts PRE_BEAT samples before the beat on a ramp signal
        assert_eq!(out.segments[0].samples[0], (first - PRE_BEAT) as f64);
    }

    #[test]
    fn short_annotation_lists_yield_nothing() {
        let signal = vec![0.0; 2000];
        for len in 0..=(TRIM_START + TRIM_END) {
            let ann = Annotation::from_pairs((0..len).map(|k| (500 + k, 'N')));
            assert!(extract(&signal, &ann, &ClassSet::default()).is_empty());
        }
    }

    #[test]
    fn labels_stay_inside_class_set() {
        let signal = vec![0.0; 10_000];
        let symbols = ['N', 'A', 'V', 'L', 'R', 'Q', '/', 'f', 'j', 'E'];
        let pairs: Vec<(usize, char)> = (0..60)
            .map(|k| (150 + 150 * k, symbols[k % symbols.len()]))
            .collect();
        let classes = ClassSet::default();
        let out = extract(&signal, &Annotation::from_pairs(pairs), &classes);
        assert!(!out.is_empty());
        assert!(out.segments.iter().all(|s| s.label < classes.len()));
        assert_eq!(out.class_counts(classes.len()).iter().sum::<usize>(), out.len());
    }

    #[test]
    fn class_set_validation() {
        assert_eq!(ClassSet::new(vec![]), Err(ConfigError::EmptyClassSet));
        assert_eq!(
            ClassSet::new(vec!['N', 'V', 'N']),
            Err(ConfigError::DuplicateClassSymbol('N'))
        );
        let set = ClassSet::default();
        assert_eq!(set.index_of('R'), Some(4));
        assert_eq!(set.index_of('Q'), None);
        assert_eq!(set.symbol(1), Some('A'));
    }
}
