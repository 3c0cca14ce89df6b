use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use geomag_store::app::{App, ProgressSink, check_file};
use geomag_store::batch::Batch;
use geomag_store::codec::{BenmoreCodec, Calibration, Codec, FluxgateCodec, GsmCodec, RawCodec};
use geomag_store::config::{Config, ConfigLoader, ResolvedConfig};
use geomag_store::domain::{FormatKind, Reading};
use geomag_store::error::GeomagError;
use geomag_store::output::{JsonOutput, LogOutput, OutputMode};
use geomag_store::schedule::{TimeWindow, parse_time, ticks};
use geomag_store::source::FileSource;
use geomag_store::store::{Store, StoreAction};
use geomag_store::template::PathTemplate;

#[derive(Parser)]
#[command(name = "geomag")]
#[command(about = "Build periodic geomagnetic observatory files, merging with what is already stored")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Store readings from input files into periodic files")]
    Store(StoreArgs),
    #[command(about = "Decode a file and summarise its readings")]
    Check(CheckArgs),
    #[command(about = "Render a path template for a label and time")]
    Path(PathArgs),
}

#[derive(Args, Clone)]
struct StoreArgs {
    inputs: Vec<Utf8PathBuf>,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    format: Option<FormatKind>,

    #[arg(long, help = "store all readings under this label instead of their own tags")]
    label: Option<String>,

    #[arg(long, help = "number of decimal places for raw data")]
    precision: Option<usize>,

    #[arg(long, help = "base output directory")]
    base: Option<Utf8PathBuf>,

    #[arg(long, help = "file name template")]
    path: Option<String>,

    #[arg(long, value_parser = humantime::parse_duration, help = "time interval to split files into")]
    truncate: Option<Duration>,

    #[arg(long, help = "optional time to process from, e.g. 2018-06-23T04:00:00")]
    starttime: Option<String>,

    #[arg(long, help = "optional time to process to")]
    endtime: Option<String>,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "1h")]
    length: Duration,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "0s", help = "interval to process continuously")]
    interval: Duration,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "0s", help = "offset from the interval boundary")]
    offset: Duration,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "0s", help = "delay to remove from the processing end time")]
    delay: Duration,
}

#[derive(Args)]
struct CheckArgs {
    file: Utf8PathBuf,

    #[arg(long, default_value = "raw")]
    format: FormatKind,
}

#[derive(Args)]
struct PathArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    path: Option<String>,

    #[arg(long, default_value = "unknown")]
    label: String,

    #[arg(long, help = "time to render, defaults to now")]
    time: Option<String>,
}

struct JobContext<'a> {
    inputs: &'a [Utf8PathBuf],
    store: &'a Store,
    window: &'a TimeWindow,
    bounded: bool,
    output_mode: OutputMode,
}

struct Job {
    format: FormatKind,
    precision: usize,
    label: Option<String>,
    streams: Vec<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<GeomagError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &GeomagError) -> u8 {
    match error {
        GeomagError::MissingConfig
        | GeomagError::ConfigRead(_)
        | GeomagError::ConfigParse(_)
        | GeomagError::InvalidTime(_)
        | GeomagError::InvalidFormat(_) => 2,
        GeomagError::Decode { .. } | GeomagError::Template(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Log
    };

    match cli.command {
        Commands::Store(args) => run_store(args, output_mode),
        Commands::Check(args) => run_check(args, output_mode),
        Commands::Path(args) => run_path(args),
    }
}

fn load_config(path: Option<&str>) -> Result<ResolvedConfig, GeomagError> {
    match ConfigLoader::resolve(path) {
        Err(GeomagError::MissingConfig) if path.is_none() => {
            ConfigLoader::resolve_config(Config::default())
        }
        other => other,
    }
}

fn optional_time(value: Option<&str>) -> Result<Option<DateTime<Utc>>, GeomagError> {
    value.map(parse_time).transpose()
}

fn run_store(args: StoreArgs, output_mode: OutputMode) -> miette::Result<()> {
    let config = load_config(args.config.as_deref())?;

    let template = match &args.path {
        Some(path) => PathTemplate::parse(path)?,
        None => config.template.clone(),
    };
    let base = args.base.clone().unwrap_or_else(|| config.base.clone());
    let truncate = args.truncate.unwrap_or(config.truncate);
    let store = Store::with_template(base, template, truncate);

    let jobs = build_jobs(&args, &config);
    let start = optional_time(args.starttime.as_deref())?;
    let end = optional_time(args.endtime.as_deref())?;
    let bounded = start.is_some() || end.is_some();

    loop {
        if !bounded {
            let wait = ticks(Utc::now(), args.interval, args.offset)?;
            if !wait.is_zero() {
                info!(wait_secs = wait.as_secs(), "waiting for next interval");
                thread::sleep(wait);
            }
        }
        let window = TimeWindow::resolve(start, end, args.length, Utc::now(), args.delay)?;
        let ctx = JobContext {
            inputs: &args.inputs,
            store: &store,
            window: &window,
            bounded,
            output_mode,
        };

        for job in &jobs {
            match job.format {
                FormatKind::Raw => run_job(RawCodec::new(job.precision), &ctx, job)?,
                FormatKind::Gsm => run_job(GsmCodec, &ctx, job)?,
                FormatKind::Benmore => run_job(BenmoreCodec, &ctx, job)?,
                FormatKind::Fluxgate => {
                    run_job(FluxgateCodec::new(config.calibration.clone()), &ctx, job)?
                }
            }
        }

        if bounded || args.interval.is_zero() {
            break Ok(());
        }
    }
}

fn build_jobs(args: &StoreArgs, config: &ResolvedConfig) -> Vec<Job> {
    if args.label.is_some() || config.streams.is_empty() {
        return vec![Job {
            format: args.format.unwrap_or(config.format),
            precision: args.precision.unwrap_or(config.precision),
            label: args.label.clone(),
            streams: config.streams.iter().map(|s| s.label.clone()).collect(),
        }];
    }

    let mut jobs: Vec<Job> = Vec::new();
    for stream in &config.streams {
        let format = args.format.unwrap_or(stream.format);
        let precision = args.precision.unwrap_or(stream.precision);
        match jobs
            .iter_mut()
            .find(|job| job.format == format && job.precision == precision)
        {
            Some(job) => job.streams.push(stream.label.clone()),
            None => jobs.push(Job {
                format,
                precision,
                label: None,
                streams: vec![stream.label.clone()],
            }),
        }
    }
    jobs
}

fn run_job<C: Codec>(codec: C, ctx: &JobContext<'_>, job: &Job) -> miette::Result<()> {
    let output_mode = ctx.output_mode;
    let source = FileSource::new(ctx.inputs.to_vec(), codec.clone()).with_window_filter(ctx.bounded);
    let mut app = App::new(source, codec, ctx.store.clone()).with_streams(job.streams.clone());
    if let Some(label) = &job.label {
        app = app.with_label(label.clone());
    }

    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Log => &LogOutput,
    };
    let result = app.run(ctx.window, sink)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_run(&result).into_diagnostic()?,
        OutputMode::Log => {
            for report in &result.reports {
                for bucket in &report.buckets {
                    println!(
                        "{} {} ({} readings)",
                        format_action(bucket.action),
                        bucket.path,
                        bucket.readings
                    );
                }
            }
        }
    }
    Ok(())
}

fn format_action(action: StoreAction) -> &'static str {
    match action {
        StoreAction::Written => "wrote",
        StoreAction::Unchanged => "unchanged",
    }
}

fn run_check(args: CheckArgs, output_mode: OutputMode) -> miette::Result<()> {
    let format = args.format.to_string();
    let result = match args.format {
        FormatKind::Raw => check_file(&args.file, &RawCodec::default(), &format)?,
        FormatKind::Gsm => check_file(&args.file, &GsmCodec, &format)?,
        FormatKind::Benmore => check_file(&args.file, &BenmoreCodec, &format)?,
        FormatKind::Fluxgate => {
            check_file(&args.file, &FluxgateCodec::new(Calibration::default()), &format)?
        }
    };

    match output_mode {
        OutputMode::Json => JsonOutput::print_check(&result).into_diagnostic()?,
        OutputMode::Log => {
            let span = match (result.first, result.last) {
                (Some(first), Some(last)) => format!("{first} .. {last}"),
                _ => "empty".to_string(),
            };
            println!("{} [{}]: {} readings, {}", result.path, result.format, result.readings, span);
        }
    }
    Ok(())
}

fn run_path(args: PathArgs) -> miette::Result<()> {
    let path = render_path(args)?;
    println!("{path}");
    Ok(())
}

fn render_path(args: PathArgs) -> Result<Utf8PathBuf, GeomagError> {
    let config = load_config(args.config.as_deref())?;
    let template = match &args.path {
        Some(path) => PathTemplate::parse(path)?,
        None => config.template,
    };
    let at = optional_time(args.time.as_deref())?.unwrap_or_else(Utc::now);

    let batch = Batch::with_readings(
        args.label,
        RawCodec::default(),
        vec![Reading::new(at, "", Vec::new())],
    );
    template.build_path(&config.base, &batch)
}
