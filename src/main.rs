use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fiscal_bi::{
    config::Settings,
    indicators::{chart_title, project, IndicatorTable},
    keys::{KeyStore, WriteMode},
    scan::{DirectoryCamera, IterationReport, QrDecoder, ScanLoop, ScanOutcome, ScanSession},
};
use std::{ops::ControlFlow, path::PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "QR fiscal receipt reader and economic indicator viewer"
)]
struct Args {
    /// YAML settings file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `keys_csv`
    #[arg(long)]
    keys_csv: Option<PathBuf>,
    /// Overrides `indicators_csv`
    #[arg(long)]
    indicators_csv: Option<PathBuf>,
    /// Overrides `write_mode` (rewrite|append)
    #[arg(long)]
    write_mode: Option<WriteMode>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode QR codes in one image and record new access keys
    ScanImage { path: PathBuf },
    /// Scan a directory of frames as a live camera feed
    ScanFrames {
        dir: PathBuf,
        #[arg(long, default_value = "*.png")]
        pattern: String,
        /// Stop after this many iterations
        #[arg(long)]
        max_frames: Option<u64>,
    },
    /// Handle already-decoded QR text
    Decode { text: String },
    /// List every record, newest first
    Records {
        #[arg(long)]
        json: bool,
    },
    /// Key counts and the most recent keys
    Stats,
    /// Copy the key file elsewhere
    Export { dest: PathBuf },
    /// Delete every record
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// Print the indicator table
    Table,
    /// List localities and variables available for charting
    Dims,
    /// Numeric series for one locality and variable
    Series {
        #[arg(long)]
        locality: String,
        #[arg(long)]
        variable: String,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    // ─── 2) settings: file, then flags ───────────────────────────────
    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(p) = args.keys_csv {
        settings.keys_csv = p;
    }
    if let Some(p) = args.indicators_csv {
        settings.indicators_csv = p;
    }
    if let Some(m) = args.write_mode {
        settings.write_mode = m;
    }

    // ─── 3) dispatch ─────────────────────────────────────────────────
    match args.command {
        Command::ScanImage { path } => scan_image(&settings, path),
        Command::ScanFrames {
            dir,
            pattern,
            max_frames,
        } => scan_frames(&settings, dir, &pattern, max_frames),
        Command::Decode { text } => {
            let mut session = open_session(&settings);
            report(&session.handle_decoded_text(&text));
            Ok(())
        }
        Command::Records { json } => records(&settings, json),
        Command::Stats => stats(&settings),
        Command::Export { dest } => {
            let store = KeyStore::open(&settings.keys_csv, settings.write_mode);
            let bytes = store.export(&dest)?;
            println!("exported {} bytes to {}", bytes, dest.display());
            Ok(())
        }
        Command::Clear { yes } => {
            if !yes {
                bail!("refusing to delete {} without --yes", settings.keys_csv.display());
            }
            let mut store = KeyStore::open(&settings.keys_csv, settings.write_mode);
            store.clear()?;
            println!("All data cleared!");
            Ok(())
        }
        Command::Table => table(&settings),
        Command::Dims => dims(&settings),
        Command::Series {
            locality,
            variable,
            json,
        } => series(&settings, &locality, &variable, json),
    }
}

fn open_session(settings: &Settings) -> ScanSession<QrDecoder> {
    let store = KeyStore::open(&settings.keys_csv, settings.write_mode);
    ScanSession::new(store, QrDecoder)
}

fn report(outcome: &ScanOutcome) {
    match outcome {
        ScanOutcome::Saved(_) => println!("✅ {}", outcome),
        ScanOutcome::Duplicate(_) => println!("⚠️ {}", outcome),
        ScanOutcome::DecodeTextInvalid | ScanOutcome::Failed { .. } => println!("❌ {}", outcome),
    }
}

fn scan_image(settings: &Settings, path: PathBuf) -> Result<()> {
    let mut session = open_session(settings);
    match session.scan_image_file(&path) {
        Ok(scans) => {
            for scan in &scans {
                report(&scan.outcome);
            }
            Ok(())
        }
        Err(e) => {
            error!("Error processing image: {}", e);
            println!("❌ {}", e);
            Ok(())
        }
    }
}

fn scan_frames(
    settings: &Settings,
    dir: PathBuf,
    pattern: &str,
    max_frames: Option<u64>,
) -> Result<()> {
    let camera = DirectoryCamera::new(&dir, pattern)
        .with_context(|| format!("opening frame directory {}", dir.display()))?;
    let mut session = open_session(settings);
    let mut scan_loop = ScanLoop::new(camera);

    let mut frames = 0u64;
    let mut saved = 0usize;
    scan_loop.run(&mut session, |iteration| {
        match iteration {
            IterationReport::Scanned(scans) => {
                for scan in scans {
                    if scan.outcome.is_saved() {
                        saved += 1;
                    }
                    report(&scan.outcome);
                }
            }
            IterationReport::CaptureFailed => println!("❌ Could not capture frame from camera"),
            IterationReport::DeviceError(e) => info!("frame source closed: {}", e),
            IterationReport::NotScanning => {}
        }
        frames += 1;
        match max_frames {
            Some(max) if frames >= max => ControlFlow::Break(()),
            _ => ControlFlow::Continue(()),
        }
    });

    info!(iterations = scan_loop.iterations(), saved, "scanning finished");
    Ok(())
}

fn records(settings: &Settings, json: bool) -> Result<()> {
    let store = KeyStore::open(&settings.keys_csv, settings.write_mode);
    let records = store.records_newest_first()?;
    if records.is_empty() {
        println!("No data collected yet. Start scanning QR codes!");
        return Ok(());
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    println!("Total records: {}", records.len());
    println!("Unique keys: {}", store.unique_key_count()?);
    for r in &records {
        println!("{}  {}", r.timestamp, r.access_key);
    }
    Ok(())
}

fn stats(settings: &Settings) -> Result<()> {
    let store = KeyStore::open(&settings.keys_csv, settings.write_mode);
    println!("Total keys collected: {}", store.seen_count());
    if !store.path().exists() {
        return Ok(());
    }
    println!("Total scans: {}", store.record_count()?);
    println!("Recent keys:");
    for r in store.recent(settings.recent_limit)? {
        println!("  {}  ({})", r.short_key(20), r.timestamp);
    }
    Ok(())
}

fn table(settings: &Settings) -> Result<()> {
    let table = IndicatorTable::load(&settings.indicators_csv)?;
    println!("Localidade\tVariável\t{}", table.years().join("\t"));
    for row in table.rows() {
        println!("{}\t{}\t{}", row.locality, row.variable, row.values.join("\t"));
    }
    Ok(())
}

fn dims(settings: &Settings) -> Result<()> {
    let table = IndicatorTable::load(&settings.indicators_csv)?;
    println!("Localities:");
    for l in table.localities() {
        println!("  {}", l);
    }
    println!("Variables:");
    for v in table.variables() {
        println!("  {}", v);
    }
    Ok(())
}

fn series(settings: &Settings, locality: &str, variable: &str, json: bool) -> Result<()> {
    let table = IndicatorTable::load(&settings.indicators_csv)?;
    let series = match project(&table, locality, variable) {
        Ok(s) => s,
        Err(e) => {
            warn!("{}", e);
            return Err(e.into());
        }
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&series)?);
        return Ok(());
    }
    println!("{}", chart_title(locality, variable));
    for (year, value) in series.points() {
        println!("{}\t{}", year, value);
    }
    Ok(())
}
