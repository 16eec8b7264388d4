//! sigrec CLI
//!
//! Inspect biosignal recordings and cut them into tag-driven windows.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use sigrec::{
    config::{Config, ExtractionConfig},
    core::SELF_MARKER,
    ByteOrder, Recording, RecordingPaths, SampleType, TagQuery, WindowSpecification, VERSION,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "sigrec")]
#[command(version = VERSION)]
#[command(about = "Biosignal recording store and tag-driven segment extraction", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the parameters of a recording
    Info {
        /// Any of the recording's .obci.xml, .obci.raw or .obci.tag files
        path: PathBuf,
    },

    /// List the tags of a recording
    Tags {
        /// Any of the recording's .obci.xml, .obci.raw or .obci.tag files
        path: PathBuf,

        /// Only tags with this name
        #[arg(long)]
        name: Option<String>,

        /// Only tags starting at or after this timestamp
        #[arg(long)]
        from: Option<f64>,

        /// Only tags starting within this many seconds of --from
        #[arg(long, requires = "from")]
        duration: Option<f64>,
    },

    /// Cut one recording per window and write them to disk
    Extract {
        /// Any of the recording's .obci.xml, .obci.raw or .obci.tag files
        path: PathBuf,

        /// Name of the tags that open windows
        #[arg(long)]
        start_tag: String,

        /// Fixed window length in seconds
        #[arg(long, conflicts_with = "end_tags", required_unless_present = "end_tags")]
        duration: Option<f64>,

        /// Comma-separated names of tags that close windows ("self" for the start tag itself)
        #[arg(long)]
        end_tags: Option<String>,

        /// Shift applied to window starts, in seconds
        #[arg(long, allow_hyphen_values = true)]
        start_offset: Option<f64>,

        /// Shift applied to window ends, in seconds
        #[arg(long, allow_hyphen_values = true)]
        end_offset: Option<f64>,

        /// Output directory for the extracted recordings
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show configuration, or update it when any option is given
    Config {
        /// Write the configuration file even if nothing changed
        #[arg(long)]
        init: bool,

        /// Default output directory for extracted recordings
        #[arg(long)]
        output: Option<PathBuf>,

        /// Log filter used when RUST_LOG is not set
        #[arg(long)]
        log_filter: Option<String>,

        /// Sample width of written recordings (float32 or float64)
        #[arg(long, value_parser = parse_sample_type)]
        sample_type: Option<SampleType>,

        /// Byte order of written recordings (little or big)
        #[arg(long, value_parser = parse_byte_order)]
        byte_order: Option<ByteOrder>,

        /// Default shift applied to window starts, in seconds
        #[arg(long, allow_hyphen_values = true)]
        start_offset: Option<f64>,

        /// Default shift applied to window ends, in seconds
        #[arg(long, allow_hyphen_values = true)]
        end_offset: Option<f64>,
    },
}

fn parse_sample_type(s: &str) -> Result<SampleType, String> {
    match s.to_ascii_lowercase().as_str() {
        "float32" | "float" => Ok(SampleType::Float32),
        "float64" | "double" => Ok(SampleType::Float64),
        other => Err(format!("unknown sample type: {other}")),
    }
}

fn parse_byte_order(s: &str) -> Result<ByteOrder, String> {
    match s.to_ascii_lowercase().as_str() {
        "little" | "little_endian" => Ok(ByteOrder::LittleEndian),
        "big" | "big_endian" => Ok(ByteOrder::BigEndian),
        other => Err(format!("unknown byte order: {other}")),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load().unwrap_or_default();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Info { path } => cmd_info(&path),
        Commands::Tags {
            path,
            name,
            from,
            duration,
        } => cmd_tags(&path, name.as_deref(), from, duration),
        Commands::Extract {
            path,
            start_tag,
            duration,
            end_tags,
            start_offset,
            end_offset,
            output,
        } => {
            let start_offset = start_offset.unwrap_or(config.extraction.start_offset);
            let end_offset = end_offset.unwrap_or(config.extraction.end_offset);
            let specification = match (duration, end_tags) {
                (Some(duration), _) => WindowSpecification::duration(start_tag, duration),
                (None, Some(end_tags)) => {
                    let names = ExtractionConfig::end_tags_from_csv(&end_tags);
                    if names.is_empty() {
                        bail!("--end-tags needs at least one name (or \"{SELF_MARKER}\")");
                    }
                    WindowSpecification::paired(start_tag, names)
                }
                (None, None) => bail!("either --duration or --end-tags is required"),
            }
            .with_offsets(start_offset, end_offset);
            cmd_extract(&path, specification, output, &config)
        }
        Commands::Config {
            init,
            output,
            log_filter,
            sample_type,
            byte_order,
            start_offset,
            end_offset,
        } => {
            let mut config = config;
            let mut changed = init;
            if let Some(output) = output {
                config.output_path = output;
                changed = true;
            }
            if let Some(log_filter) = log_filter {
                config.log_filter = log_filter;
                changed = true;
            }
            if let Some(sample_type) = sample_type {
                config.sample_type = sample_type;
                changed = true;
            }
            if let Some(byte_order) = byte_order {
                config.byte_order = byte_order;
                changed = true;
            }
            if let Some(start_offset) = start_offset {
                config.extraction.start_offset = start_offset;
                changed = true;
            }
            if let Some(end_offset) = end_offset {
                config.extraction.end_offset = end_offset;
                changed = true;
            }
            if changed {
                config.save().context("Could not save configuration")?;
                println!("Configuration saved.");
                println!();
            }
            cmd_config(&config);
            Ok(())
        }
    }
}

fn open_recording(path: &Path) -> anyhow::Result<(RecordingPaths, Recording)> {
    let paths = RecordingPaths::from_any(path).with_context(|| {
        format!(
            "{} is not a .obci.xml, .obci.raw or .obci.tag file",
            path.display()
        )
    })?;
    let recording = Recording::open(&paths)
        .with_context(|| format!("Could not open recording {}", paths.info.display()))?;
    Ok((paths, recording))
}

fn cmd_info(path: &Path) -> anyhow::Result<()> {
    let (paths, recording) = open_recording(path)?;

    println!("Recording");
    println!("=========");
    println!();
    println!("Info file: {:?}", paths.info);
    println!("Data file: {:?}", paths.data);
    if let Some(tags) = &paths.tags {
        println!("Tags file: {:?}", tags);
    }
    println!();
    println!("  Sampling frequency: {} Hz", recording.sampling_frequency()?);
    println!("  Channels: {}", recording.channel_names()?.join(", "));
    println!("  Samples: {}", recording.number_of_samples()?);
    println!("  Duration: {:.3}s", recording.duration()?);
    match recording.start_datetime() {
        Ok(Some(start)) => println!("  Started: {}", start.to_rfc3339()),
        _ => println!("  Started: unknown"),
    }
    println!("  Tags: {}", recording.all_tags().len());
    println!();
    println!("Parameters:");
    println!("{}", serde_json::to_string_pretty(&recording.params())?);
    Ok(())
}

fn cmd_tags(
    path: &Path,
    name: Option<&str>,
    from: Option<f64>,
    duration: Option<f64>,
) -> anyhow::Result<()> {
    let (_, recording) = open_recording(path)?;

    let mut query = match name {
        Some(name) => TagQuery::named(name),
        None => TagQuery::all(),
    };
    if let Some(from) = from {
        query = query.from(from);
    }
    if let Some(duration) = duration {
        query = query.duration(duration);
    }

    let tags = recording.tags(&query);
    for tag in &tags {
        let channels = tag.channels.as_deref().unwrap_or("all");
        println!(
            "{:>12.4} {:>12.4}  {:<20} channels={}",
            tag.start_timestamp, tag.end_timestamp, tag.name, channels
        );
        for (key, value) in &tag.description {
            println!("{:>27}{key}={value}", "");
        }
    }
    println!();
    println!("{} tag(s)", tags.len());
    Ok(())
}

fn cmd_extract(
    path: &Path,
    specification: WindowSpecification,
    output: Option<PathBuf>,
    config: &Config,
) -> anyhow::Result<()> {
    let (paths, mut recording) = open_recording(path)?;
    let config = match output {
        Some(output) => config.clone().with_output_path(output),
        None => config.clone(),
    };
    config
        .ensure_directories()
        .with_context(|| format!("Could not create {}", config.output_path.display()))?;
    let output = &config.output_path;

    let stem = paths
        .info
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(&format!(".{}", sigrec::core::recording::INFO_EXTENSION)))
        .unwrap_or("recording")
        .to_string();
    let start_tag_name = specification.start_tag_name().to_string();

    let extractor = recording.smart_tags(specification)?;
    println!("Planned {} window(s)", extractor.len());
    let (smart_tags, report) = extractor.collect_all()?;

    for (i, smart_tag) in smart_tags.into_iter().enumerate() {
        let name = format!("{stem}_{start_tag_name}_{i:04}");
        let target = RecordingPaths::from_base(output, &name);
        println!(
            "  [{:.3}s, {:.3}s) -> {} ({} samples)",
            smart_tag.start_timestamp(),
            smart_tag.end_timestamp(),
            name,
            smart_tag.sample_count()
        );
        let mut window = smart_tag.into_recording();
        window
            .save_with(&target, config.save_options())
            .with_context(|| format!("Could not write {}", target.info.display()))?;
    }

    println!();
    println!("{}", report.summary());
    Ok(())
}

fn cmd_config(config: &Config) {
    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(config).unwrap_or_else(|_| "Error".to_string())
    );
}
