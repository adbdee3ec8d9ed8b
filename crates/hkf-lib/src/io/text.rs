use crate::signal::Annotation;
use anyhow::{Context, Result};
use std::path::Path;

/// Parse newline-delimited floating point series, ignoring blank/comment lines.
pub fn parse_f64_series(text: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let val: f64 = trimmed
            .parse()
            .with_context(|| format!("line {} is not f64: {}", idx + 1, trimmed))?;
        out.push(val);
    }
    if out.is_empty() {
        anyhow::bail!("no numeric samples found");
    }
    Ok(out)
}

/// Read a newline-delimited floating point series from disk.
pub fn read_f64_series(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_f64_series(&text)
}

/// Parse `<sample> <symbol>` lines into an annotation.
///
/// Sample positions must be strictly increasing; blank lines and `#` comments are skipped.
pub fn parse_annotation(text: &str) -> Result<Annotation> {
    let mut pairs: Vec<(usize, char)> = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut fields = trimmed.split_whitespace();
        let sample_field = fields.next().unwrap_or_default();
        let sample: usize = sample_field.parse().with_context(|| {
            format!("line {} has no integer sample index: {}", idx + 1, trimmed)
        })?;
        let mut symbol_chars = fields
            .next()
            .with_context(|| format!("line {} has no annotation symbol", idx + 1))?
            .chars();
        let symbol = symbol_chars.next().unwrap_or(' ');
        if symbol_chars.next().is_some() {
            anyhow::bail!("line {} symbol must be a single character", idx + 1);
        }
        if let Some(&(prev, _)) = pairs.last() {
            if sample <= prev {
                anyhow::bail!(
                    "line {}: sample {} does not follow previous sample {}",
                    idx + 1,
                    sample,
                    prev
                );
            }
        }
        pairs.push((sample, symbol));
    }
    Ok(Annotation::from_pairs(pairs))
}

/// Read a text annotation file.
pub fn read_annotation(path: &Path) -> Result<Annotation> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_annotation(&text).with_context(|| format!("parsing {}", path.display()))
}
