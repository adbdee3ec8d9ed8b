use crate::signal::{Annotation, TimeSeries};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Simple WFDB annotation entry.
#[derive(Debug, Clone)]
pub struct WfdbAnnotation {
    pub sample: usize,
    pub code: u8,
}

/// MIT annotation mnemonics indexed by annotation code (`' '` marks unused codes).
const MIT_SYMBOLS: [char; 42] = [
    ' ', 'N', 'L', 'R', 'a', 'V', 'F', 'J', 'A', 'S', 'E', 'j', '/', 'Q', '~', ' ', '|', ' ', 's',
    'T', '*', 'D', '"', '=', 'p', 'B', '^', 't', '+', 'u', '?', '!', '[', ']', 'e', 'n', '@', 'x',
    'f', '(', ')', 'r',
];

impl WfdbAnnotation {
    pub fn symbol(&self) -> char {
        MIT_SYMBOLS
            .get(self.code as usize)
            .copied()
            .unwrap_or(' ')
    }
}

/// Load the specified signal (lead) from a WFDB header/data pair into a TimeSeries.
///
/// The header and every data file it names must be readable; `wfdb_rust` panics otherwise.
pub fn load_wfdb_lead(header_path: &Path, lead: usize) -> Result<TimeSeries> {
    check_record_files(header_path)?;
    let (header, signals) = std::panic::catch_unwind(|| wfdb_rust::parse_wfdb(header_path))
        .map_err(|_| anyhow::anyhow!("failed to decode WFDB record {}", header_path.display()))?;
    if lead >= signals.len() {
        anyhow::bail!(
            "WFDB record contains {} signals, but lead {} was requested",
            signals.len(),
            lead
        );
    }
    let spec = &header.signal_specs[lead];
    let raw = &signals[lead];
    let gain = spec.adc_gain.unwrap_or(1.0) as f64;
    let baseline = spec.baseline.or(spec.adc_zero).unwrap_or(0) as f64;
    let fs = header
        .record
        .sampling_frequency
        .map(|f| f as f64)
        .unwrap_or(360.0);
    let data = raw
        .iter()
        .map(|&sample| (sample as f64 - baseline) / gain)
        .collect();
    Ok(TimeSeries { fs, data })
}

/// Signal specification lines of a header, after the record line.
fn signal_lines(header: &str) -> Result<Vec<&str>> {
    let mut lines = header
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'));
    let record_line = lines.next().context("WFDB header has no record line")?;
    let count: usize = record_line
        .split_whitespace()
        .nth(1)
        .context("WFDB record line lacks a signal count")?
        .parse()
        .with_context(|| format!("bad signal count in record line: {}", record_line))?;
    (0..count)
        .map(|idx| {
            lines
                .next()
                .with_context(|| format!("WFDB header is missing signal line {}", idx + 1))
        })
        .collect()
}

/// Signal descriptions (e.g. `MLII`, `V5`) from the header text, in signal order.
pub fn parse_signal_names(header: &str) -> Result<Vec<String>> {
    Ok(signal_lines(header)?
        .into_iter()
        .map(|line| {
            // file, format, gain, adc resolution, adc zero, initial value, checksum, block size
            let name: Vec<&str> = line.split_whitespace().skip(8).collect();
            name.join(" ")
        })
        .collect())
}

/// Distinct data file names referenced by the header, in first-use order.
pub fn parse_signal_files(header: &str) -> Result<Vec<String>> {
    let mut files: Vec<String> = Vec::new();
    for line in signal_lines(header)? {
        let file = line.split_whitespace().next().unwrap_or_default();
        if !files.iter().any(|f| f == file) {
            files.push(file.to_string());
        }
    }
    Ok(files)
}

fn check_record_files(header_path: &Path) -> Result<()> {
    let text = fs::read_to_string(header_path)
        .with_context(|| format!("failed to read {}", header_path.display()))?;
    let files = parse_signal_files(&text)
        .with_context(|| format!("parsing {}", header_path.display()))?;
    let dir = header_path.parent().unwrap_or_else(|| Path::new(""));
    for file in files {
        let path = dir.join(&file);
        fs::File::open(&path)
            .with_context(|| format!("failed to open signal file {}", path.display()))?;
    }
    Ok(())
}

pub fn read_signal_names(header_path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(header_path)
        .with_context(|| format!("failed to read {}", header_path.display()))?;
    parse_signal_names(&text).with_context(|| format!("parsing {}", header_path.display()))
}

/// Index of the signal whose description matches `name`.
pub fn find_channel(header_path: &Path, name: &str) -> Result<usize> {
    let names = read_signal_names(header_path)?;
    names.iter().position(|n| n == name).with_context(|| {
        format!(
            "{} has no channel named {} (available: {})",
            header_path.display(),
            name,
            names.join(", ")
        )
    })
}

/// Parse MIT annotation binary stream into samples & codes.
pub fn parse_wfdb_annotations(buf: &[u8]) -> Vec<WfdbAnnotation> {
    let mut out = Vec::new();
    let mut idx = 0;
    let mut sample: usize = 0;
    while idx + 2 <= buf.len() {
        let word = u16::from_le_bytes([buf[idx], buf[idx + 1]]);
        idx += 2;
        let code = (word >> 10) as u8;
        let diff = (word & 0x03FF) as usize;
        if code == 0 && diff == 0 {
            break;
        }
        match code {
            59 => {
                if idx + 4 > buf.len() {
                    break;
                }
                let high = u16::from_le_bytes([buf[idx], buf[idx + 1]]) as u32;
                let low = u16::from_le_bytes([buf[idx + 2], buf[idx + 3]]) as u32;
                idx += 4;
                let skip = (high << 16) | low;
                sample = sample.wrapping_add(skip as usize);
            }
            // NUM/SUB/CHN carry a value, not a time step
            60..=62 => {}
            63 => {
                idx += diff;
                if diff % 2 != 0 && idx < buf.len() {
                    idx += 1;
                }
            }
            _ => {
                sample = sample.wrapping_add(diff);
                out.push(WfdbAnnotation { sample, code });
            }
        }
    }
    out
}

fn read_exact(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Read an annotation file keeping every labelled entry, beat or not.
pub fn load_wfdb_annotation(path: &Path) -> Result<Annotation> {
    let buf = read_exact(path)?;
    Ok(Annotation::from_pairs(
        parse_wfdb_annotations(&buf)
            .iter()
            .map(|ann| (ann.sample, ann.symbol())),
    ))
}
