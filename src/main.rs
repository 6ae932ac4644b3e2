use clap::{Parser, Subcommand};
use delayed_variations::config::ServerConfig;
use delayed_variations::imaging::RustBackend;
use delayed_variations::options::Cropping;
use delayed_variations::sizer::Sizer;
use delayed_variations::source::SourceImage;
use delayed_variations::{config, queue, serve};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "delayed-variations")]
#[command(about = "Deferred image variation server")]
#[command(long_about = "\
Deferred image variation server

Derived image sizes are named eagerly but generated lazily. Requesting a
variation writes a small JSON record next to the would-be file:

  files/
  ├── 1001/
  │   ├── photo.jpg                      # Original
  │   ├── photo.jpg.focus                # Optional focus point sidecar
  │   ├── photo.600x400.jpg              # Materialized variation
  │   └── photo.260x180-nw.jpg.queue     # Pending record (JSON)

The `serve` command exposes the tree over HTTP. A request for a derived
filename that is missing on disk but has a pending record triggers the real
resize on the spot; the rendered bytes are served immediately and every
later request hits the file directly.

Variation filenames encode the full request:

  photo.600x400.jpg            600x400, default center crop
  photo.600x400-nw.jpg         northwest anchor crop
  photo.600x0.jpg              width 600, height from aspect
  photo.600x400-thumb.jpg      with suffix \"thumb\"
  photo.600x400-hidpi.jpg      HiDPI variant (reduced quality)

Run 'delayed-variations gen-config' to generate a documented config file.")]
#[command(version = env!("BUILD_VERSION"))]
struct Cli {
    /// Config file
    #[arg(long, default_value = "delayed-variations.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

/// Request shape for the `resize` command.
#[derive(clap::Args, Clone)]
struct ResizeArgs {
    /// Source image path (under the configured root)
    source: PathBuf,

    /// Target width (0 = derive from height)
    #[arg(long, default_value_t = 0)]
    width: u32,

    /// Target height (0 = derive from width)
    #[arg(long, default_value_t = 0)]
    height: u32,

    /// Generate now instead of deferring
    #[arg(long)]
    no_delay: bool,

    /// Discard any existing variation and regenerate
    #[arg(long)]
    force_new: bool,

    /// Crop mode: center|none|n|ne|e|se|s|sw|w|nw|"50%,30%"|"120,80"
    #[arg(long)]
    crop: Option<String>,

    /// Encoder quality 1-100
    #[arg(long)]
    quality: Option<u32>,

    /// Rotate by ±90, ±180 or ±270 degrees
    #[arg(long)]
    rotate: Option<i32>,

    /// Flip: h (horizontal) or v (vertical)
    #[arg(long)]
    flip: Option<String>,

    /// Filename suffix (repeatable)
    #[arg(long)]
    suffix: Vec<String>,

    /// Name and encode as a HiDPI variant
    #[arg(long)]
    hidpi: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the asset tree over HTTP, materializing deferred variations
    Serve,
    /// Request a variation of one image (deferred unless --no-delay)
    Resize(ResizeArgs),
    /// Remove pending records belonging to a source image
    Clean {
        /// Source image path whose records should be removed
        source: PathBuf,
    },
    /// Validate the config and report pending records under the root
    Check,
    /// Print a stock config file with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = ServerConfig::load_or_default(&cli.config)?;

    match cli.command {
        Command::Serve => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
                )
                .init();
            let sizer = Sizer::new(config, RustBackend::new());
            tokio::runtime::Runtime::new()?.block_on(serve::run(sizer))?;
        }
        Command::Resize(args) => {
            let source = SourceImage::from_path(&config, &args.source)
                .ok_or_else(|| format!("not a source image under root: {}", args.source.display()))?;
            let mut options = config.sizer_options();
            options.no_delay = args.no_delay;
            options.force_new = args.force_new;
            options.hidpi = args.hidpi;
            options.suffix = args.suffix;
            if let Some(crop) = &args.crop {
                options.cropping = Cropping::parse(crop);
            }
            if let Some(q) = args.quality {
                options.quality = q;
            }
            if let Some(r) = args.rotate {
                options.rotate = r;
            }
            if let Some(f) = &args.flip {
                if !matches!(f.to_ascii_lowercase().chars().next(), Some('h' | 'v')) {
                    return Err(format!("invalid flip: {f} (use h or v)").into());
                }
                options.flip = f.clone();
            }

            let sizer = Sizer::new(config, RustBackend::new());
            let variation = sizer.size(&source, args.width, args.height, &options)?;
            if variation.is_materialized() {
                println!("materialized: {}", variation.path.display());
            } else {
                println!("deferred: {}", variation.path.display());
                println!("record:   {}", queue::record_path(&variation.path).display());
            }
        }
        Command::Clean { source } => {
            let report = queue::cleanup_records(&source)?;
            for path in &report.removed {
                println!("removed {}", path.display());
            }
            for (path, e) in &report.failed {
                eprintln!("failed to remove {}: {e}", path.display());
            }
            println!("==> {report}");
        }
        Command::Check => {
            config.validate()?;
            println!("==> Config is valid");
            if !config.root.is_dir() {
                return Err(format!("root does not exist: {}", config.root.display()).into());
            }
            let (pending, orphaned) = scan_records(&config);
            println!("==> {pending} pending record(s) under {}", config.root.display());
            if orphaned > 0 {
                println!("==> {orphaned} record(s) point at deleted originals (run `clean`)");
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Walk the root counting pending records, and how many of those refer to an
/// original that no longer exists.
fn scan_records(config: &ServerConfig) -> (usize, usize) {
    let mut pending = 0;
    let mut orphaned = 0;
    for entry in WalkDir::new(&config.root).into_iter().flatten() {
        let path = entry.path();
        if !entry.file_type().is_file() || !queue::is_record_path(path) {
            continue;
        }
        pending += 1;
        match queue::read_record(path) {
            Ok(record) => {
                let missing = config
                    .url_to_path(&record.original)
                    .is_none_or(|p| !p.is_file());
                if missing {
                    orphaned += 1;
                }
            }
            Err(_) => orphaned += 1,
        }
    }
    (pending, orphaned)
}
