//! screenscout: command-line shell over the capture and search engine
//!
//! Results are printed as JSON on stdout; logs go to stderr. Engine failures
//! are printed as an error report (code, category, message, hint) and exit
//! with status 1.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::json;
use screenscout::{
    Scout, ScoutError,
    capture::{MockBackend, SessionConfig},
    model::{CaptureMode, Region, TargetDescriptor, WindowId},
    search::{Matcher, SearchRequest, SourceImage, TemplateStore},
    util::encode::FrameEncoding,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(name = "screenscout", version, about = "Find template images in windows, screens and image files")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Search one template in an image file
    Find {
        /// Image to search in
        #[arg(long)]
        image:     PathBuf,
        /// Template image
        #[arg(long)]
        template:  PathBuf,
        #[arg(long, default_value_t = 0.9)]
        threshold: f64,
        /// Region of interest as x,y,w,h
        #[arg(long, value_parser = parse_region)]
        roi:       Option<Region>,
    },
    /// Run a JSON list of searches against one image file
    Batch {
        #[arg(long)]
        image:    PathBuf,
        /// JSON array of {"template": path, "roi": {...}?, "threshold": f64}
        #[arg(long)]
        requests: PathBuf,
    },
    /// Capture a window for a while and optionally search its latest frame
    Watch(WatchArgs),
}

#[derive(Debug, Args)]
struct WatchArgs {
    /// Executable name of the target process
    #[arg(long, conflicts_with_all = ["pid", "window"])]
    process: Option<String>,
    #[arg(long, conflicts_with = "window")]
    pid: Option<u32>,
    /// Window handle (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_window)]
    window: Option<WindowId>,
    /// Case-insensitive substring of the window title
    #[arg(long)]
    title: Option<String>,
    #[arg(long, default_value_t = CaptureMode::Auto)]
    mode: CaptureMode,
    /// How long to capture before stopping
    #[arg(long, default_value_t = 1000)]
    duration_ms: u64,
    /// Write the latest frame here (.bmp or .png)
    #[arg(long)]
    save: Option<PathBuf>,
    /// Template to search in the latest frame
    #[arg(long)]
    template: Option<PathBuf>,
    #[arg(long, default_value_t = 0.9)]
    threshold: f64,
    /// Use the synthetic mock backend instead of the platform backend
    #[arg(long)]
    mock: bool,
}

/// One line of a batch request file
#[derive(Debug, Deserialize)]
struct BatchEntry {
    template:  PathBuf,
    #[serde(default)]
    roi:       Option<Region>,
    threshold: f64,
}

#[derive(Debug, Serialize)]
struct BatchOutput {
    template: PathBuf,
    handle:   i32,
    x:        i32,
    y:        i32,
    score:    f64,
}

fn parse_region(value: &str) -> Result<Region, String> {
    let parts: Vec<i32> = value
        .split(',')
        .map(|part| part.trim().parse::<i32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid region '{value}': {e}"))?;
    match parts.as_slice() {
        [x, y, w, h] => Ok(Region::new(*x, *y, *w, *h)),
        _ => Err(format!("region must be x,y,w,h, got '{value}'")),
    }
}

fn parse_window(value: &str) -> Result<WindowId, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };
    parsed
        .map(WindowId)
        .map_err(|e| format!("invalid window handle '{value}': {e}"))
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("screenscout=info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn find(image: &Path, template: &Path, threshold: f64, roi: Option<Region>) -> Result<serde_json::Value> {
    let store = Arc::new(TemplateStore::new());
    let handle = store.load(template)?;
    let scene = image::open(image)
        .with_context(|| format!("failed to open {}", image.display()))?
        .to_rgb8();

    let mut request = SearchRequest::new(handle, threshold);
    request.roi = roi;
    let result = Matcher::new(store).search_image(scene, &request);
    Ok(json!({ "found": result.is_found(), "result": result }))
}

fn batch(image: &Path, requests: &Path) -> Result<serde_json::Value> {
    let entries: Vec<BatchEntry> = serde_json::from_str(
        &std::fs::read_to_string(requests)
            .with_context(|| format!("failed to read {}", requests.display()))?,
    )
    .with_context(|| format!("{} is not a valid request list", requests.display()))?;

    let store = Arc::new(TemplateStore::new());
    let mut search_requests = Vec::with_capacity(entries.len());
    for entry in &entries {
        // Failed loads keep their negative code so the slot reports not-found
        let handle = store.load(&entry.template).map(|h| h.get()).unwrap_or_else(|e| e.code());
        let mut request = SearchRequest::new(handle.into(), entry.threshold);
        request.roi = entry.roi;
        search_requests.push(request);
    }

    let bytes = std::fs::read(image).with_context(|| format!("failed to read {}", image.display()))?;
    let results = Matcher::new(store).search_batch_source(SourceImage::Encoded(&bytes), &search_requests);

    let output: Vec<BatchOutput> = entries
        .into_iter()
        .zip(results)
        .map(|(entry, item)| BatchOutput {
            template: entry.template,
            handle:   item.template.get(),
            x:        item.x,
            y:        item.y,
            score:    item.score,
        })
        .collect();
    Ok(serde_json::to_value(output)?)
}

async fn watch(args: WatchArgs) -> Result<serde_json::Value> {
    let kind = match (&args.process, args.pid, args.window) {
        (Some(name), _, _) => TargetDescriptor::process_name(name.clone()),
        (None, Some(pid), _) => TargetDescriptor::process(pid),
        (None, None, Some(window)) => TargetDescriptor::window(window),
        (None, None, None) => anyhow::bail!("one of --process, --pid or --window is required"),
    };
    let mut target = kind.with_mode(args.mode);
    if let Some(title) = &args.title {
        target = target.with_title_filter(title.clone());
    }

    let encoding = args
        .save
        .as_deref()
        .and_then(|path| path.extension())
        .and_then(|ext| FrameEncoding::from_extension(&ext.to_string_lossy()))
        .unwrap_or_default();
    let config = SessionConfig::builder().encoding(encoding).build();

    let scout = if args.mock {
        Scout::with_backend(Arc::new(MockBackend::new()))
    } else {
        Scout::new()?
    }
    .with_session_config(config);

    let handle = match &args.template {
        Some(path) => Some(scout.try_load_template(path)?),
        None => None,
    };

    scout.start_capture_session(target).await?;
    tokio::time::sleep(Duration::from_millis(args.duration_ms)).await;

    let session = scout.session_info();
    let matched = handle.map(|h| scout.search_latest_frame(h.get(), None, args.threshold));
    if let Some(path) = &args.save {
        let bytes = scout.get_latest_frame();
        if bytes.is_empty() {
            tracing::warn!("No frame available to save");
        } else {
            std::fs::write(path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), bytes = bytes.len(), "Saved latest frame");
        }
    }
    scout.stop_capture_session().await?;

    Ok(json!({ "session": session, "match": matched }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let outcome = match cli.command {
        Command::Find {
            image,
            template,
            threshold,
            roi,
        } => find(&image, &template, threshold, roi),
        Command::Batch { image, requests } => batch(&image, &requests),
        Command::Watch(args) => watch(args).await,
    };

    match outcome {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => match e.downcast_ref::<ScoutError>() {
            Some(scout_error) => {
                println!("{}", serde_json::to_string_pretty(&scout_error.report())?);
                std::process::exit(1);
            }
            None => Err(e),
        },
    }
}
