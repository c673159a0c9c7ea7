use clap::{Parser, Subcommand};
use cli::{load_mask, write_outputs, SeparationJob};
use color_eyre::eyre::Result;
use films::{ExportFormat, Exporter, FilmConfig, FilmPipeline, StrokeWidthAnalyzer};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Separate artwork using an existing job file (.toml or .json)
    Process {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Separate artwork with command line settings
    Separate {
        /// Path to the artwork
        #[arg(short, long)]
        input: PathBuf,
        /// Output directory for films
        #[arg(short, long)]
        output_dir: PathBuf,
        /// Number of inks
        #[arg(short = 'k', long, default_value = "4")]
        colors: usize,
        #[arg(long, default_value = "300")]
        dpi: f32,
        /// Export formats, comma separated (pdf, svg, png)
        #[arg(short, long, value_delimiter = ',', default_value = "pdf")]
        formats: Vec<ExportFormat>,
        /// Screen every film into halftone dots
        #[arg(long)]
        halftone: bool,
        /// Grow strokes below the minimum width instead of only reporting them
        #[arg(long)]
        auto_thicken: bool,
        #[arg(long)]
        no_preview: bool,
        /// Also save the settings as a reusable job file
        #[arg(long)]
        save_job: Option<PathBuf>,
    },
    /// Check one film against a minimum stroke width
    Validate {
        /// Film image, black ink on white
        #[arg(short, long)]
        mask: PathBuf,
        #[arg(long, default_value = "0.5")]
        min_width_mm: f32,
        #[arg(long, default_value = "300")]
        dpi: f32,
        /// The mask stores ink as white
        #[arg(long)]
        white_ink: bool,
        /// Write a stroke width heatmap here
        #[arg(long)]
        heatmap: Option<PathBuf>,
        /// Write a thickened copy of the film here
        #[arg(long)]
        thicken: Option<PathBuf>,
    },
    /// Print the JSON schema of job files
    Schema {
        /// Only the film settings, without job paths
        #[arg(long)]
        films_only: bool,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process { config } => {
            let job = SeparationJob::from_file(&config)?;
            run_job(&job)?;
        }
        Commands::Separate {
            input,
            output_dir,
            colors,
            dpi,
            formats,
            halftone,
            auto_thicken,
            no_preview,
            save_job,
        } => {
            let mut job = SeparationJob::new(
                input.to_string_lossy().to_string(),
                output_dir.to_string_lossy().to_string(),
            );
            job.formats = formats;
            job.preview = !no_preview;
            job.films.dpi = dpi;
            job.films.quantization.colors = colors;
            job.films.halftone.enabled = halftone;
            job.films.stroke.auto_thicken = auto_thicken;

            if let Some(path) = save_job {
                match path.extension().and_then(|ext| ext.to_str()) {
                    Some("toml") => job.to_toml_file(&path)?,
                    _ => job.to_json_file(&path)?,
                }
                info!("Job saved to {:?}", path);
            }
            run_job(&job)?;
        }
        Commands::Validate {
            mask,
            min_width_mm,
            dpi,
            white_ink,
            heatmap,
            thicken,
        } => {
            validate_film(
                &mask,
                min_width_mm,
                dpi,
                white_ink,
                heatmap.as_deref(),
                thicken.as_deref(),
            )?;
        }
        Commands::Schema { films_only } => {
            let schema = if films_only {
                FilmConfig::schema()
            } else {
                schemars::schema_for!(SeparationJob)
            };
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }

    Ok(())
}

fn run_job(job: &SeparationJob) -> Result<()> {
    let pipeline = FilmPipeline::from_config(job.films.clone())?;
    info!("{}", pipeline.info());

    let source = job.load_source()?;
    let set = pipeline.process(&source)?;

    for color in set.color_info() {
        info!(
            "  {} {} {:>5.1}% ({} px)",
            color.name, color.hex, color.percentage, color.pixel_count
        );
    }

    let exporter = Exporter::for_formats(&job.formats, &job.films.vector);
    let batch = exporter.encode(&set.films);
    let (written, report) = write_outputs(&job.output_dir, &set, &batch, job.preview)?;

    for film in report.films.iter().filter(|f| !f.warnings.is_empty()) {
        for warning in &film.warnings {
            warn!("{}: {:?}", film.name, warning);
        }
    }
    if !report.export_failures.is_empty() {
        warn!("{} exports failed, see metadata.json", report.export_failures.len());
    }

    info!("Wrote {} files to {}", written.len(), job.output_dir);
    Ok(())
}

fn validate_film(
    mask_path: &Path,
    min_width_mm: f32,
    dpi: f32,
    white_ink: bool,
    heatmap: Option<&Path>,
    thicken: Option<&Path>,
) -> Result<()> {
    let mask = load_mask(mask_path, white_ink)?;
    let analyzer = StrokeWidthAnalyzer::new(dpi);
    let report = analyzer.validate(&mask, min_width_mm);

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.valid {
        info!("{:?} prints at {} mm", mask_path, min_width_mm);
    } else {
        warn!(
            "{:?}: {} strokes below {} mm (narrowest {:.3} mm)",
            mask_path, report.violations, min_width_mm, report.min_width_mm
        );
    }

    if let Some(path) = heatmap {
        analyzer.heatmap(&mask).save(path)?;
        info!("Heatmap saved to {:?}", path);
    }
    if let Some(path) = thicken {
        let thick = analyzer.thicken(&mask, min_width_mm);
        films::io::film_image(&thick, Default::default()).save(path)?;
        info!("Thickened film saved to {:?}", path);
    }

    Ok(())
}
