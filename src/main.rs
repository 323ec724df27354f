use clap::{Parser, Subcommand};
use flac_image::session::{self, Operation, Options, Report};
use log::LevelFilter;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "flac-image", version, about = "Store and retrieve images in FLAC APPLICATION blocks")]
struct Cli {
    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Do everything except writing the FLAC files back
    #[arg(long, global = true)]
    dry_run: bool,
    /// Leave padding blocks where they are instead of merging them at the end
    #[arg(long, global = true)]
    no_sort_padding: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert an image (or any file) into each FLAC file
    #[command(visible_alias = "i")]
    Import {
        image: PathBuf,
        /// Label to store instead of guessing from the extension
        #[arg(short = 't', long = "type")]
        label: Option<String>,
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },
    /// Extract image blocks into a directory
    #[command(visible_alias = "x")]
    Export {
        /// Only blocks whose label starts with this
        #[arg(short = 't', long = "type")]
        label: Option<String>,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },
    /// Delete image blocks, leaving padding in their place
    #[command(visible_alias = "d")]
    Delete {
        /// Only blocks whose label starts with this
        #[arg(short = 't', long = "type")]
        label: Option<String>,
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },
    /// Extract only the smallest image/* block
    #[command(visible_alias = "n")]
    Thumbnail {
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },
    /// List recognised image blocks
    #[command(visible_alias = "l")]
    List {
        /// Only blocks whose label starts with this
        #[arg(short = 't', long = "type")]
        label: Option<String>,
        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut opts = Options {
        sort_padding: !cli.no_sort_padding,
        dry_run:      cli.dry_run,
        ..Options::default()
    };
    let mut json = false;

    let (op, files) = match cli.command {
        Commands::Import { image, label, files } => {
            (Operation::Import { source: image, label }, files)
        }
        Commands::Export { label, output_dir, files } => {
            opts.label_filter = label;
            opts.output_dir   = output_dir;
            (Operation::ExportAll, files)
        }
        Commands::Delete { label, files } => {
            opts.label_filter = label;
            (Operation::Delete, files)
        }
        Commands::Thumbnail { output_dir, files } => {
            opts.output_dir = output_dir;
            (Operation::ExportSmallest, files)
        }
        Commands::List { label, json: as_json, files } => {
            opts.label_filter = label;
            json = as_json;
            (Operation::List, files)
        }
    };

    let mut failures = 0usize;
    for path in &files {
        if files.len() > 1 && !json {
            println!("{}:", path.display());
        }
        match session::run(path, &op, &opts) {
            Ok(report) => print_report(&op, &report, json),
            Err(e) => {
                eprintln!("ERROR: {}: {e}", path.display());
                failures += 1;
            }
        }
    }

    if failures > 0 { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn print_report(op: &Operation, report: &Report, json: bool) {
    if json {
        match serde_json::to_string_pretty(&report.found) {
            Ok(s)  => println!("{s}"),
            Err(e) => eprintln!("ERROR: can't encode listing: {e}"),
        }
    } else {
        print_summary(op, report);
    }

    for warning in &report.warnings {
        eprintln!("WARNING: {warning}");
    }
    if report.committed {
        log::debug!("Committed {}", report.path.display());
    }
}

fn print_summary(op: &Operation, report: &Report) {
    match op {
        Operation::Import { .. } => {
            if let Some(imported) = &report.imported {
                println!("Inserting block with mime-type {}: {} bytes",
                    imported.header.mime_label_lossy(), imported.block_len);
            }
        }
        Operation::Delete => {
            eprintln!("Deleted {} block(s).", report.deleted);
        }
        Operation::List => {
            for info in &report.found {
                println!("Found image block: type {}, size {}", info.mime_label, info.payload_size);
                println!("Name: {}  {}", info.filename,
                    info.fingerprint.as_deref().unwrap_or("-"));
            }
            eprintln!("Found {} recognized block(s).", report.found.len());
        }
        Operation::ExportAll | Operation::ExportSmallest => {
            for info in &report.found {
                println!("Found image block: type {}, size {}", info.mime_label, info.payload_size);
                println!("Extracting to file: {}", info.filename);
            }
            if matches!(op, Operation::ExportAll) {
                eprintln!("Found {} recognized block(s).", report.found.len());
            }
        }
    }
}
