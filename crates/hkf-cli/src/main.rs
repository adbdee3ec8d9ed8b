use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use hkf_bundle::{prepare_bundle, read_dataset_spec, write_bundle, write_dataset_csv};
use hkf_lib::{
    dataset::Dataset,
    filters::kalman::{denoise, CascadeConfig},
    io::{text as text_io, wfdb as wfdb_io},
    metrics::{confusion::ConfusionMatrix, history::read_history},
    pipeline::LoadPolicy,
    plot::{figure_from_denoised, figure_from_segment, figures_from_history, Figure, Series},
    segments::{extract, ClassSet},
    signal::{Annotation, TimeSeries},
};
use log::{info, warn};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use serde::{Deserialize, Serialize};
use std::{
    io::{self, Read},
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "hkf",
    version,
    about = "HKF: Kalman-denoised ECG beat segmentation tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where the raw signal comes from.
#[derive(Args)]
struct SignalArgs {
    /// Sampling frequency for newline-delimited input
    #[arg(long, default_value_t = 360.0)]
    fs: f64,
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long)]
    wfdb_header: Option<PathBuf>,
    /// Channel description in the WFDB header, e.g. MLII
    #[arg(long)]
    channel: Option<String>,
    #[arg(long, default_value_t = 0)]
    wfdb_lead: usize,
}

/// Noise parameters of the two filter stages.
#[derive(Args)]
struct FilterArgs {
    #[arg(long, default_value_t = 0.001)]
    q1: f64,
    #[arg(long, default_value_t = 10.0)]
    r1: f64,
    #[arg(long, default_value_t = 0.001)]
    q2: f64,
    #[arg(long, default_value_t = 1.0)]
    r2: f64,
}

impl FilterArgs {
    fn cascade(&self) -> Result<CascadeConfig> {
        CascadeConfig::new(self.q1, self.r1, self.q2, self.r2)
            .context("invalid filter parameters")
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Denoise a signal with the two-stage Kalman cascade
    Denoise {
        #[command(flatten)]
        signal: SignalArgs,
        #[command(flatten)]
        filter: FilterArgs,
        /// Render raw and denoised signal to a PNG
        #[arg(long)]
        plot: Option<PathBuf>,
    },
    /// Denoise one record and cut labelled beat windows around its annotations
    ExtractBeats {
        #[command(flatten)]
        signal: SignalArgs,
        #[command(flatten)]
        filter: FilterArgs,
        /// WFDB annotation file (.atr) or `<sample> <symbol>` text file
        #[arg(long)]
        annotations: PathBuf,
        /// Class symbols in label order
        #[arg(long, default_value = "NAVLR")]
        classes: String,
        /// Write the segments as CSV
        #[arg(long)]
        out: Option<PathBuf>,
        /// Render the first extracted segment to a PNG
        #[arg(long)]
        plot: Option<PathBuf>,
    },
    /// Build, split and write a dataset bundle from a TOML spec
    BuildDataset {
        #[arg(long)]
        config: PathBuf,
        /// Overrides `data_dir` from the spec
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        parallel: bool,
        /// Skip unreadable records instead of aborting
        #[arg(long)]
        skip_missing: bool,
    },
    /// Render a confusion matrix from a `truth,predicted` CSV
    PlotConfusion {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "NAVLR")]
        classes: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Render accuracy and loss curves from a training history JSON
    PlotHistory {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Denoise {
            signal,
            filter,
            plot,
        } => cmd_denoise(&signal, &filter, plot.as_deref())?,
        Commands::ExtractBeats {
            signal,
            filter,
            annotations,
            classes,
            out,
            plot,
        } => cmd_extract_beats(
            &signal,
            &filter,
            &annotations,
            &classes,
            out.as_deref(),
            plot.as_deref(),
        )?,
        Commands::BuildDataset {
            config,
            data_dir,
            out,
            parallel,
            skip_missing,
        } => cmd_build_dataset(&config, data_dir, &out, parallel, skip_missing)?,
        Commands::PlotConfusion {
            input,
            classes,
            out,
        } => cmd_plot_confusion(&input, &classes, &out)?,
        Commands::PlotHistory { input, out_dir } => cmd_plot_history(&input, &out_dir)?,
    }
    Ok(())
}

fn read_samples(input: Option<&Path>) -> Result<Vec<f64>> {
    match input {
        Some(path) => text_io::read_f64_series(path),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            text_io::parse_f64_series(&buf)
        }
    }
}

fn load_time_series(args: &SignalArgs) -> Result<TimeSeries> {
    if let Some(header) = &args.wfdb_header {
        let lead = match &args.channel {
            Some(name) => wfdb_io::find_channel(header, name)?,
            None => args.wfdb_lead,
        };
        wfdb_io::load_wfdb_lead(header, lead)
    } else {
        let data = read_samples(args.input.as_deref())?;
        Ok(TimeSeries { fs: args.fs, data })
    }
}

fn load_annotation(path: &Path) -> Result<Annotation> {
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("atr") => wfdb_io::load_wfdb_annotation(path),
        _ => text_io::read_annotation(path),
    }
}

fn parse_classes(symbols: &str) -> Result<ClassSet> {
    Ok(ClassSet::new(symbols.chars().collect())?)
}

fn cmd_denoise(signal: &SignalArgs, filter: &FilterArgs, plot: Option<&Path>) -> Result<()> {
    let cfg = filter.cascade()?;
    let ts = load_time_series(signal)?;
    let clean = denoise(&ts, &cfg);
    if let Some(path) = plot {
        draw_plotters_figure(path, &figure_from_denoised(&ts, &clean, 4096))?;
    }
    println!("{}", serde_json::to_string(&clean)?);
    Ok(())
}

#[derive(Serialize)]
struct ExtractSummary {
    sample_count: usize,
    annotations: usize,
    beats: usize,
    unknown_symbols: usize,
    boundary_drops: usize,
    class_counts: Vec<usize>,
}

fn cmd_extract_beats(
    signal: &SignalArgs,
    filter: &FilterArgs,
    annotations: &Path,
    classes: &str,
    out: Option<&Path>,
    plot: Option<&Path>,
) -> Result<()> {
    let cfg = filter.cascade()?;
    let classes = parse_classes(classes)?;
    let ts = load_time_series(signal)?;
    let annotation = load_annotation(annotations)?;
    let clean = denoise(&ts, &cfg);
    let beats = extract(&clean.data, &annotation, &classes);
    let summary = ExtractSummary {
        sample_count: ts.len(),
        annotations: annotation.len(),
        beats: beats.len(),
        unknown_symbols: beats.unknown_symbols,
        boundary_drops: beats.boundary_drops,
        class_counts: beats.class_counts(classes.len()),
    };
    if let Some(path) = plot {
        match beats.segments.first() {
            Some(first) => draw_plotters_figure(path, &figure_from_segment(first, 0xD62728))?,
            None => warn!("no segments extracted; skipping {}", path.display()),
        }
    }
    if let Some(path) = out {
        let mut dataset = Dataset::new();
        dataset.extend_from(beats)?;
        write_dataset_csv(path, &dataset)?;
    }
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn cmd_build_dataset(
    config: &Path,
    data_dir: Option<PathBuf>,
    out: &Path,
    parallel: bool,
    skip_missing: bool,
) -> Result<()> {
    let mut spec = read_dataset_spec(config)?;
    if let Some(dir) = data_dir {
        spec.data_dir = dir;
    }
    spec.parallel |= parallel;
    if skip_missing {
        spec.on_load_error = LoadPolicy::Skip;
    }
    let bundle = prepare_bundle(&spec)?;
    write_bundle(out, &bundle)?;
    println!("{}", serde_json::to_string(&bundle.manifest)?);
    Ok(())
}

#[derive(Deserialize)]
struct PredictionRow {
    truth: usize,
    predicted: usize,
}

fn cmd_plot_confusion(input: &Path, classes: &str, out: &Path) -> Result<()> {
    let classes = parse_classes(classes)?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(input)
        .with_context(|| format!("opening predictions {}", input.display()))?;
    let mut truth = Vec::new();
    let mut predicted = Vec::new();
    for (idx, row) in reader.deserialize::<PredictionRow>().enumerate() {
        let row = row.with_context(|| format!("parsing prediction row {}", idx + 1))?;
        truth.push(row.truth);
        predicted.push(row.predicted);
    }
    let matrix = ConfusionMatrix::from_labels(&truth, &predicted, classes.len())?;
    draw_confusion_matrix(out, &matrix, &classes)?;
    info!("wrote confusion matrix to {}", out.display());
    println!("{}", serde_json::to_string(&matrix)?);
    Ok(())
}

fn cmd_plot_history(input: &Path, out_dir: &Path) -> Result<()> {
    let history = read_history(input)?;
    let (accuracy, loss) = figures_from_history(&history);
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    draw_plotters_figure(&out_dir.join("accuracy.png"), &accuracy)?;
    draw_plotters_figure(&out_dir.join("loss.png"), &loss)?;
    info!("wrote training curves to {}", out_dir.display());
    Ok(())
}

fn rgb(color: hkf_lib::plot::Color) -> RGBColor {
    let (r, g, b) = color.rgb();
    RGBColor(r, g, b)
}

fn draw_plotters_figure(path: &Path, fig: &Figure) -> Result<()> {
    let Some((x_min, mut x_max, mut y_min, mut y_max)) = fig.bounds() else {
        bail!("figure {:?} has no points to draw", fig.title);
    };
    if x_max <= x_min {
        x_max = x_min + 1.0;
    }
    if y_max <= y_min {
        y_min -= 0.5;
        y_max += 0.5;
    }
    let backend = BitMapBackend::new(path, (800, 800));
    let root = backend.into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(
            fig.title.clone().unwrap_or_else(|| "Plot".into()),
            ("sans-serif", 24),
        )
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    chart
        .configure_mesh()
        .x_desc(fig.x.label.clone().unwrap_or_default())
        .y_desc(fig.y.label.clone().unwrap_or_default())
        .draw()?;
    for series in &fig.series {
        match series {
            Series::Line(line) => {
                let color = rgb(line.style.color);
                chart
                    .draw_series(LineSeries::new(
                        line.points.iter().map(|p| (p[0], p[1])),
                        color.stroke_width(line.style.width.round().max(1.0) as u32),
                    ))?
                    .label(line.name.clone())
                    .legend(move |(x, y)| {
                        PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
                    });
            }
        }
    }
    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

/// White-to-blue ramp for heatmap cells.
fn blues(t: f64) -> RGBColor {
    let t = t.clamp(0.0, 1.0);
    let lerp = |from: u8, to: u8| (from as f64 + (to as f64 - from as f64) * t).round() as u8;
    RGBColor(lerp(247, 8), lerp(251, 48), lerp(255, 107))
}

fn draw_confusion_matrix(path: &Path, matrix: &ConfusionMatrix, classes: &ClassSet) -> Result<()> {
    let n = matrix.classes;
    let max = matrix.max_count().max(1) as f64;
    let backend = BitMapBackend::new(path, (800, 800));
    let root = backend.into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption("Confusion Matrix", ("sans-serif", 24))
        .x_label_area_size(50)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0..n as f64, 0.0..n as f64)?;
    let tick_label = |v: &f64| {
        let idx = v.floor() as usize;
        classes.symbol(idx).map(String::from).unwrap_or_default()
    };
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(n + 1)
        .y_labels(n + 1)
        .x_label_formatter(&tick_label)
        .y_label_formatter(&tick_label)
        .x_desc("Predicted labels")
        .y_desc("True labels")
        .draw()?;

    let cells: Vec<(usize, usize, usize)> = matrix
        .counts
        .iter()
        .enumerate()
        .flat_map(|(t, row)| row.iter().enumerate().map(move |(p, &c)| (t, p, c)))
        .collect();
    chart.draw_series(cells.iter().map(|&(t, p, count)| {
        let (x, y) = (p as f64, t as f64);
        Rectangle::new(
            [(x, y), (x + 1.0, y + 1.0)],
            blues(count as f64 / max).filled(),
        )
    }))?;
    let centred = Pos::new(HPos::Center, VPos::Center);
    chart.draw_series(cells.iter().map(|&(t, p, count)| {
        let ink = if count as f64 / max > 0.5 { WHITE } else { BLACK };
        Text::new(
            count.to_string(),
            (p as f64 + 0.5, t as f64 + 0.5),
            ("sans-serif", 20).into_font().color(&ink).pos(centred),
        )
    }))?;
    root.present()?;
    Ok(())
}
