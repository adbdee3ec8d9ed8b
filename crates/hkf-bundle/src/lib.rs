use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use hkf_lib::{
    dataset::Dataset,
    error::ConfigError,
    filters::kalman::CascadeConfig,
    pipeline::{
        build_dataset, ChannelSelector, LoadPolicy, PrepConfig, RecordReport, RecordSource,
        TextDirSource, WfdbDirSource, MITDB_RECORDS,
    },
    segments::ClassSet,
};
use log::info;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_TEST_RATIO: f64 = 0.3;

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    #[default]
    Wfdb,
    Text,
}

/// Dataset preparation settings read from TOML.
#[derive(Debug, Deserialize, Clone)]
pub struct DatasetSpec {
    pub data_dir: PathBuf,
    #[serde(default)]
    pub format: RecordFormat,
    #[serde(default)]
    pub channel: Option<ChannelSelector>,
    #[serde(default)]
    pub annotator: Option<String>,
    /// Sampling frequency assumed for text records.
    #[serde(default)]
    pub fs: Option<f64>,
    #[serde(default)]
    pub records: Option<Vec<String>>,
    #[serde(default)]
    pub classes: Option<ClassSet>,
    #[serde(default)]
    pub on_load_error: LoadPolicy,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub filter: Option<CascadeConfig>,
    #[serde(default)]
    pub split: Option<SplitSpec>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SplitSpec {
    #[serde(default)]
    pub test_ratio: Option<f64>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl DatasetSpec {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            format: RecordFormat::default(),
            channel: None,
            annotator: None,
            fs: None,
            records: None,
            classes: None,
            on_load_error: LoadPolicy::default(),
            parallel: false,
            filter: None,
            split: None,
        }
    }

    pub fn prep_config(&self) -> PrepConfig {
        PrepConfig {
            filter: self.filter.unwrap_or_default(),
            classes: self.classes.clone().unwrap_or_default(),
            on_load_error: self.on_load_error,
            parallel: self.parallel,
        }
    }

    pub fn worklist(&self) -> Vec<String> {
        match &self.records {
            Some(records) => records.clone(),
            None => MITDB_RECORDS.iter().map(|id| id.to_string()).collect(),
        }
    }

    pub fn test_ratio(&self) -> f64 {
        self.split
            .as_ref()
            .and_then(|s| s.test_ratio)
            .unwrap_or(DEFAULT_TEST_RATIO)
    }

    pub fn seed(&self) -> u64 {
        self.split.as_ref().and_then(|s| s.seed).unwrap_or(0)
    }

    pub fn source(&self) -> Box<dyn RecordSource + Sync> {
        match self.format {
            RecordFormat::Wfdb => {
                let mut source = WfdbDirSource::new(&self.data_dir);
                if let Some(channel) = &self.channel {
                    source.channel = channel.clone();
                }
                if let Some(annotator) = &self.annotator {
                    source.annotator = annotator.clone();
                }
                Box::new(source)
            }
            RecordFormat::Text => {
                Box::new(TextDirSource::new(&self.data_dir, self.fs.unwrap_or(360.0)))
            }
        }
    }
}

/// Read a dataset spec; a relative `data_dir` is resolved against the spec's directory.
pub fn read_dataset_spec(path: &Path) -> Result<DatasetSpec> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read dataset spec {}", path.display()))?;
    let mut spec: DatasetSpec = toml::from_str(&contents)
        .with_context(|| format!("parsing dataset spec {}", path.display()))?;
    if spec.data_dir.is_relative() {
        if let Some(parent) = path.parent() {
            spec.data_dir = parent.join(&spec.data_dir);
        }
    }
    Ok(spec)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub train: Dataset,
    pub test: Dataset,
}

/// Shuffle with a seeded RNG; the first `ceil(test_ratio * n)` rows become the test set.
pub fn split_dataset(dataset: &Dataset, test_ratio: f64, seed: u64) -> Result<Split, ConfigError> {
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(ConfigError::InvalidSplitRatio(test_ratio));
    }
    let n = dataset.len();
    let n_test = ((test_ratio * n as f64).ceil() as usize).min(n);
    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);
    let (test_idx, train_idx) = order.split_at(n_test);
    Ok(Split {
        train: dataset.select(train_idx),
        test: dataset.select(test_idx),
    })
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BundleManifest {
    pub classes: Vec<char>,
    pub filter: CascadeConfig,
    pub test_ratio: f64,
    pub seed: u64,
    pub segment_len: usize,
    pub total_segments: usize,
    pub train_segments: usize,
    pub test_segments: usize,
    pub train_class_counts: Vec<usize>,
    pub test_class_counts: Vec<usize>,
    pub records: Vec<RecordReport>,
    pub skipped: Vec<String>,
    pub created_unix: f64,
}

pub struct DatasetBundle {
    pub split: Split,
    pub manifest: BundleManifest,
}

/// Load every record named by `spec`, build the dataset and split it.
pub fn prepare_bundle(spec: &DatasetSpec) -> Result<DatasetBundle> {
    let cfg = spec.prep_config();
    let worklist = spec.worklist();
    let ids: Vec<&str> = worklist.iter().map(String::as_str).collect();
    let source = spec.source();
    let mut dataset = Dataset::new();
    let report = build_dataset(source.as_ref(), &ids, &cfg, &mut dataset)?;
    info!(
        "built dataset with {} segments from {} records ({} skipped)",
        dataset.len(),
        report.records.len(),
        report.skipped.len()
    );
    let test_ratio = spec.test_ratio();
    let seed = spec.seed();
    let split = split_dataset(&dataset, test_ratio, seed)?;
    let classes = cfg.classes.len();
    let created = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|dur| dur.as_secs_f64())
        .unwrap_or(0.0);
    let manifest = BundleManifest {
        classes: cfg.classes.symbols().to_vec(),
        filter: cfg.filter,
        test_ratio,
        seed,
        segment_len: dataset.segment_len(),
        total_segments: dataset.len(),
        train_segments: split.train.len(),
        test_segments: split.test.len(),
        train_class_counts: split.train.class_counts(classes),
        test_class_counts: split.test.class_counts(classes),
        records: report.records,
        skipped: report.skipped,
        created_unix: created,
    };
    Ok(DatasetBundle { split, manifest })
}

/// One row per segment: `label,s0,s1,...`.
pub fn write_dataset_csv(path: &Path, dataset: &Dataset) -> Result<()> {
    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = WriterBuilder::new().from_writer(file);
    let mut header = vec!["label".to_string()];
    header.extend((0..dataset.segment_len()).map(|i| format!("s{}", i)));
    writer.write_record(&header)?;
    for (segment, label) in dataset.iter() {
        let mut row = Vec::with_capacity(segment.len() + 1);
        row.push(label.to_string());
        row.extend(segment.iter().map(|v| v.to_string()));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_dataset_csv(path: &Path) -> Result<Dataset> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .flexible(false)
        .from_path(path)
        .with_context(|| format!("opening dataset {}", path.display()))?;
    let mut dataset = Dataset::new();
    for (idx, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("reading row {} of {}", idx + 1, path.display()))?;
        let mut fields = row.iter();
        let label: usize = fields
            .next()
            .unwrap_or_default()
            .parse()
            .with_context(|| format!("row {} has no integer label", idx + 1))?;
        let samples = fields
            .map(|field| field.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("row {} has a non-numeric sample", idx + 1))?;
        dataset
            .push(samples, label)
            .with_context(|| format!("row {} of {}", idx + 1, path.display()))?;
    }
    Ok(dataset)
}

pub fn write_manifest(path: &Path, manifest: &BundleManifest) -> Result<()> {
    let file = fs::File::create(path)?;
    serde_json::to_writer_pretty(file, manifest)?;
    Ok(())
}

pub fn read_manifest(path: &Path) -> Result<BundleManifest> {
    let file =
        fs::File::open(path).with_context(|| format!("opening manifest {}", path.display()))?;
    let manifest = serde_json::from_reader::<_, BundleManifest>(file)
        .with_context(|| format!("parsing manifest {}", path.display()))?;
    Ok(manifest)
}

/// Write `train.csv`, `test.csv` and `manifest.json` into `dir`.
pub fn write_bundle(dir: &Path, bundle: &DatasetBundle) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    write_dataset_csv(&dir.join("train.csv"), &bundle.split.train)?;
    write_dataset_csv(&dir.join("test.csv"), &bundle.split.test)?;
    write_manifest(&dir.join("manifest.json"), &bundle.manifest)?;
    info!("wrote dataset bundle to {}", dir.display());
    Ok(())
}
