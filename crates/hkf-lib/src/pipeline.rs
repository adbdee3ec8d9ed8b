//! Multi-record orchestration: load, denoise, segment and accumulate.

use crate::dataset::Dataset;
use crate::error::PrepError;
use crate::filters::kalman::{cascade_filter, CascadeConfig};
use crate::io::{text as text_io, wfdb as wfdb_io};
use crate::segments::{extract, BeatSegments, ClassSet};
use crate::signal::{Annotation, TimeSeries};
use anyhow::Result;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// MIT-BIH Arrhythmia Database records used for the five-class beat dataset.
pub const MITDB_RECORDS: [&str; 43] = [
    "100", "101", "103", "105", "106", "107", "108", "109", "111", "112", "113", "114", "115",
    "116", "117", "119", "121", "122", "123", "124", "200", "201", "202", "203", "205", "208",
    "210", "212", "213", "214", "215", "217", "219", "220", "221", "222", "223", "228", "230",
    "231", "232", "233", "234",
];

/// One loaded record: a single channel plus its annotations.
#[derive(Debug, Clone)]
pub struct Record {
    pub id: String,
    pub signal: TimeSeries,
    pub annotation: Annotation,
}

/// Anything that can produce a record for an identifier.
pub trait RecordSource {
    fn load(&self, id: &str) -> Result<Record>;
}

/// Which signal of a multi-channel WFDB record to use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelSelector {
    Name(String),
    Index(usize),
}

impl Default for ChannelSelector {
    fn default() -> Self {
        ChannelSelector::Name("MLII".into())
    }
}

/// WFDB records stored as `<dir>/<id>.hea` with annotations in `<dir>/<id>.<annotator>`.
#[derive(Debug, Clone)]
pub struct WfdbDirSource {
    pub dir: PathBuf,
    pub channel: ChannelSelector,
    pub annotator: String,
}

impl WfdbDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            channel: ChannelSelector::default(),
            annotator: "atr".into(),
        }
    }
}

impl RecordSource for WfdbDirSource {
    fn load(&self, id: &str) -> Result<Record> {
        let header = self.dir.join(format!("{}.hea", id));
        let lead = match &self.channel {
            ChannelSelector::Name(name) => wfdb_io::find_channel(&header, name)?,
            ChannelSelector::Index(idx) => *idx,
        };
        let signal = wfdb_io::load_wfdb_lead(&header, lead)?;
        let annotation = wfdb_io::load_wfdb_annotation(
            &self.dir.join(format!("{}.{}", id, self.annotator)),
        )?;
        Ok(Record {
            id: id.to_string(),
            signal,
            annotation,
        })
    }
}

/// Plain-text records: `<dir>/<id>.txt` samples and `<dir>/<id>.ann` annotations.
#[derive(Debug, Clone)]
pub struct TextDirSource {
    pub dir: PathBuf,
    pub fs: f64,
}

impl TextDirSource {
    pub fn new(dir: impl Into<PathBuf>, fs: f64) -> Self {
        Self {
            dir: dir.into(),
            fs,
        }
    }
}

impl RecordSource for TextDirSource {
    fn load(&self, id: &str) -> Result<Record> {
        let data = text_io::read_f64_series(&self.dir.join(format!("{}.txt", id)))?;
        let annotation = text_io::read_annotation(&self.dir.join(format!("{}.ann", id)))?;
        Ok(Record {
            id: id.to_string(),
            signal: TimeSeries { fs: self.fs, data },
            annotation,
        })
    }
}

/// What to do when a record cannot be loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPolicy {
    /// Stop the whole build with [`PrepError::RecordLoad`].
    #[default]
    Abort,
    /// Log the identifier, list it in the report and continue.
    Skip,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrepConfig {
    pub filter: CascadeConfig,
    pub classes: ClassSet,
    pub on_load_error: LoadPolicy,
    /// Process records on the rayon pool; output order is unchanged.
    pub parallel: bool,
}

/// Per-record accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordReport {
    pub id: String,
    pub sample_count: usize,
    pub annotations: usize,
    pub beats: usize,
    pub unknown_symbols: usize,
    pub boundary_drops: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub records: Vec<RecordReport>,
    pub skipped: Vec<String>,
}

impl BuildReport {
    pub fn total_beats(&self) -> usize {
        self.records.iter().map(|r| r.beats).sum()
    }
}

/// Denoise one record and cut its labelled beat windows.
pub fn process_record(record: &Record, cfg: &PrepConfig) -> BeatSegments {
    let denoised = cascade_filter(&record.signal.data, &cfg.filter);
    extract(&denoised, &record.annotation, &cfg.classes)
}

type Loaded = (String, Result<(RecordReport, BeatSegments)>);

fn load_and_process<S: RecordSource + ?Sized>(source: &S, id: &str, cfg: &PrepConfig) -> Loaded {
    let outcome = source.load(id).map(|record| {
        let beats = process_record(&record, cfg);
        let report = RecordReport {
            id: record.id.clone(),
            sample_count: record.signal.len(),
            annotations: record.annotation.len(),
            beats: beats.len(),
            unknown_symbols: beats.unknown_symbols,
            boundary_drops: beats.boundary_drops,
        };
        (report, beats)
    });
    (id.to_string(), outcome)
}

/// Run every record in `worklist` through the filter and extractor, appending to `dataset`.
///
/// Results are appended in worklist order whether or not `cfg.parallel` is set.
/// On error `dataset` is left untouched.
pub fn build_dataset<S>(
    source: &S,
    worklist: &[&str],
    cfg: &PrepConfig,
    dataset: &mut Dataset,
) -> Result<BuildReport, PrepError>
where
    S: RecordSource + Sync + ?Sized,
{
    let loaded: Vec<Loaded> = if cfg.parallel {
        worklist
            .par_iter()
            .map(|id| load_and_process(source, id, cfg))
            .collect()
    } else {
        // Sequential path stops loading at the first failure under Abort.
        let mut out = Vec::with_capacity(worklist.len());
        for id in worklist {
            let item = load_and_process(source, id, cfg);
            let failed = item.1.is_err();
            out.push(item);
            if failed && cfg.on_load_error == LoadPolicy::Abort {
                break;
            }
        }
        out
    };

    let mut staged = Dataset::new();
    let mut report = BuildReport::default();
    for (id, outcome) in loaded {
        match outcome {
            Ok((rec, beats)) => {
                info!("loaded record {} ({} samples)", rec.id, rec.sample_count);
                debug!(
                    "record {}: {} beats, {} unknown symbols, {} boundary drops",
                    rec.id, rec.beats, rec.unknown_symbols, rec.boundary_drops
                );
                staged.extend_from(beats)?;
                report.records.push(rec);
            }
            Err(err) => match cfg.on_load_error {
                LoadPolicy::Abort => {
                    return Err(PrepError::RecordLoad {
                        record: id,
                        reason: format!("{:#}", err),
                    })
                }
                LoadPolicy::Skip => {
                    warn!("skipping record {}: {:#}", id, err);
                    report.skipped.push(id);
                }
            },
        }
    }
    dataset.append(staged)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::{SEGMENT_LEN, TRIM_END, TRIM_START};
    use std::collections::HashMap;

    struct MemorySource {
        records: HashMap<String, Record>,
    }

    impl RecordSource for MemorySource {
        fn load(&self, id: &str) -> Result<Record> {
            self.records
                .get(id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no such record"))
        }
    }

    fn synthetic_record(id: &str, beats: usize, offset: f64) -> Record {
        let spacing = 300;
        let len = spacing * (beats + 2);
        let mut data = vec![offset; len];
        let mut pairs = Vec::new();
        for k in 0..beats {
            let pos = spacing * (k + 1);
            data[pos] += 5.0;
            let symbol = ['N', 'A', 'V', 'L', 'R', 'Q'][k % 6];
            pairs.push((pos, symbol));
        }
        Record {
            id: id.to_string(),
            signal: TimeSeries { fs: 360.0, data },
            annotation: Annotation::from_pairs(pairs),
        }
    }

    fn source(ids: &[&str]) -> MemorySource {
        let records = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.to_string(), synthetic_record(id, 30 + i, i as f64)))
            .collect();
        MemorySource { records }
    }

    #[test]
    fn accumulates_records_in_worklist_order() {
        let src = source(&["a", "b"]);
        let mut ds = Dataset::new();
        let report = build_dataset(&src, &["b", "a"], &PrepConfig::default(), &mut ds).unwrap();
        assert_eq!(report.records[0].id, "b");
        assert_eq!(report.records[1].id, "a");
        assert_eq!(report.total_beats(), ds.len());
        assert!(ds.segments().iter().all(|s| s.len() == SEGMENT_LEN));
        // record "b" sits on a baseline of 1.0 so its windows come first
        assert!(ds.segments()[0].iter().all(|&v| v > 0.99));
        assert!(ds.segments()[ds.len() - 1][0] < 1.0);
        let per_record = 30 - TRIM_START - TRIM_END;
        assert_eq!(report.records[1].beats + report.records[1].unknown_symbols, per_record);
    }

    #[test]
    fn parallel_build_matches_sequential() {
        let ids = ["r0", "r1", "r2", "r3", "r4", "r5"];
        let src = source(&ids);
        let mut seq = Dataset::new();
        let mut par = Dataset::new();
        let mut cfg = PrepConfig::default();
        let seq_report = build_dataset(&src, &ids, &cfg, &mut seq).unwrap();
        cfg.parallel = true;
        let par_report = build_dataset(&src, &ids, &cfg, &mut par).unwrap();
        assert_eq!(seq, par);
        assert_eq!(seq_report, par_report);
    }

    #[test]
    fn abort_policy_surfaces_record_id() {
        let src = source(&["ok"]);
        let mut ds = Dataset::new();
        let err = build_dataset(&src, &["ok", "missing", "ok"], &PrepConfig::default(), &mut ds)
            .unwrap_err();
        match err {
            PrepError::RecordLoad { record, reason } => {
                assert_eq!(record, "missing");
                assert!(reason.contains("no such record"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(ds.is_empty());
    }

    #[test]
    fn aborted_build_keeps_existing_rows_only() {
        let src = source(&["ok"]);
        let mut ds = Dataset::new();
        build_dataset(&src, &["ok"], &PrepConfig::default(), &mut ds).unwrap();
        let before = ds.clone();
        for parallel in [false, true] {
            let cfg = PrepConfig {
                parallel,
                ..PrepConfig::default()
            };
            assert!(build_dataset(&src, &["ok", "bad"], &cfg, &mut ds).is_err());
            assert_eq!(ds, before);
        }
    }

    fn write_header(dir: &std::path::Path, id: &str) {
        let header = format!(
            "{id} 2 360 650000\n{id}.dat 212 200 11 1024 995 -22131 0 MLII\n{id}.dat 212 200 11 1024 1011 20052 0 V5\n"
        );
        std::fs::write(dir.join(format!("{}.hea", id)), header).unwrap();
    }

    #[test]
    fn wfdb_record_without_data_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_header(dir.path(), "100");
        let src = WfdbDirSource::new(dir.path());
        let cfg = PrepConfig {
            on_load_error: LoadPolicy::Skip,
            ..PrepConfig::default()
        };
        let mut ds = Dataset::new();
        let report = build_dataset(&src, &["100"], &cfg, &mut ds).unwrap();
        assert_eq!(report.skipped, vec!["100".to_string()]);
        assert!(report.records.is_empty());
        assert!(ds.is_empty());
    }

    #[test]
    fn wfdb_record_without_data_file_aborts_with_its_id() {
        let dir = tempfile::tempdir().unwrap();
        write_header(dir.path(), "101");
        let src = WfdbDirSource::new(dir.path());
        let mut ds = Dataset::new();
        match build_dataset(&src, &["101"], &PrepConfig::default(), &mut ds) {
            Err(PrepError::RecordLoad { record, reason }) => {
                assert_eq!(record, "101");
                assert!(reason.contains("101.dat"), "{}", reason);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn skip_policy_lists_skipped_records() {
        let src = source(&["ok"]);
        let mut ds = Dataset::new();
        let cfg = PrepConfig {
            on_load_error: LoadPolicy::Skip,
            ..PrepConfig::default()
        };
        let report = build_dataset(&src, &["gone", "ok"], &cfg, &mut ds).unwrap();
        assert_eq!(report.skipped, vec!["gone".to_string()]);
        assert_eq!(report.records.len(), 1);
        assert!(!ds.is_empty());
    }

    #[test]
    fn text_source_reads_record_pair() {
        let dir = tempfile::tempdir().unwrap();
        let samples: String = (0..1200).map(|i| format!("{}\n", (i % 7) as f64)).collect();
        std::fs::write(dir.path().join("r1.txt"), samples).unwrap();
        std::fs::write(dir.path().join("r1.ann"), "100 N\n400 V\n").unwrap();
        let rec = TextDirSource::new(dir.path(), 250.0).load("r1").unwrap();
        assert_eq!(rec.signal.len(), 1200);
        assert_eq!(rec.signal.fs, 250.0);
        assert_eq!(rec.annotation.symbols(), &['N', 'V']);
        assert!(TextDirSource::new(dir.path(), 250.0).load("r2").is_err());
    }

    #[test]
    fn mitdb_worklist_has_unique_ids() {
        let mut ids = MITDB_RECORDS.to_vec();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), MITDB_RECORDS.len());
    }
}
