// letter-extract: rebuild letter records from an Omeka SQL dump.
// Scan INSERTs for the bound tables, join items with their metadata, tags and
// files in memory, print a summary, then write one record per letter.

use clap::{CommandFactory, Parser};
use letter_extract::output::{self, ManifestEntry};
use letter_extract::parser::insert::InsertScanner;
use letter_extract::reconstruct::{self, Selector};
use letter_extract::report::RunReport;
use letter_extract::{logger, progress, ColumnBinding, SchemaVersion, TableStore};
use log::{debug, info};
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::time::Instant;

// Command-line flags and positional arguments.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Enable debug logging (disables progress bars).
    #[arg(long)]
    debug: bool,

    /// Built-in column layout: `omeka` or `legacy`.
    #[arg(long, default_value = "omeka")]
    schema: SchemaVersion,

    /// JSON column binding file; overrides --schema.
    #[arg(long)]
    schema_file: Option<PathBuf>,

    /// Dump table name prefix.
    #[arg(long)]
    table_prefix: Option<String>,

    /// Item type id that marks a letter.
    #[arg(long, default_value_t = 1)]
    item_type: i64,

    /// Explicit item ids to extract, comma separated (ignores --item-type).
    #[arg(long, value_delimiter = ',', conflicts_with = "all")]
    ids: Vec<i64>,

    /// Extract every item regardless of type.
    #[arg(long)]
    all: bool,

    /// Write one NNNN.json per letter here. If omitted, prints JSON Lines to stdout.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Write a digest manifest of the written letters.
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Write the run summary as JSON.
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Reconstruction worker threads (0 = num CPU).
    #[arg(long, default_value_t = 0)]
    workers: usize,

    /// Read the dump with buffered I/O instead of a memory map.
    #[arg(long)]
    no_mmap: bool,

    /// Refuse to write output unless the extraction is clean.
    #[arg(long)]
    strict: bool,

    /// SQL dump file path.
    dump: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let wall_start = Instant::now();
    if std::env::args().len() == 1 {
        Args::command().print_help()?;
        eprintln!();
        std::process::exit(1);
    }
    let args = Args::parse();
    let _logger = logger::init(args.debug).map_err(|e| format!("logger init: {e}"))?;

    debug!("main: dump file {}", args.dump.display());

    let mut binding = match &args.schema_file {
        Some(path) => ColumnBinding::from_json_file(path)?,
        None => ColumnBinding::for_version(args.schema),
    };
    if let Some(prefix) = &args.table_prefix {
        binding = binding.with_prefix(prefix.clone());
    }
    // A binding that cannot serve the join must fail before the scan.
    reconstruct::check_binding(&binding)?;

    // Progress bars are disabled in debug mode to avoid mangled output.
    let progress = progress::ProgressManager::new(!logger::is_debug());

    let scan_start = Instant::now();
    let mut store = TableStore::new();
    let mut scanner = InsertScanner::new(binding.watched_tables());
    let bar = progress.new_file_bar(&args.dump, "Scanning dump");
    scanner.scan_file(&args.dump, !args.no_mmap, &mut store, bar.as_ref())?;
    let stats = scanner.finish();
    debug!(
        "Timing: scan took {:?}, {} rows loaded",
        scan_start.elapsed(),
        store.total_rows()
    );

    let selector = if !args.ids.is_empty() {
        Selector::Ids(args.ids.iter().copied().collect())
    } else if args.all {
        Selector::All
    } else {
        Selector::ItemType(args.item_type)
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.workers)
        .build()?;
    let join_start = Instant::now();
    let result = pool.install(|| reconstruct::reconstruct(&store, &binding, &selector))?;
    debug!("Timing: reconstruction took {:?}", join_start.elapsed());

    let mut report = RunReport::new(&stats, &store, &result);

    // Print summary before any output is written.
    report.write_summary(&mut io::stderr())?;

    if let Some(path) = args.report_json.as_ref() {
        report.wall_ms = wall_start.elapsed().as_millis() as u64;
        report.write_json(path)?;
    }

    if args.strict && !report.clean {
        log::error!("extraction is not clean; nothing written (--strict)");
        std::process::exit(2);
    }

    let manifest: Vec<ManifestEntry> = match &args.out_dir {
        Some(dir) => {
            let bar = progress.new_count_bar(result.letters.len() as u64, "Writing letters");
            let written = output::write_letter_dir(dir, &result.letters, bar.as_ref())?;
            info!("wrote {} letters to {}", written.len(), dir.display());
            written
        }
        None => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            output::write_json_lines(&mut out, &result.letters)?
        }
    };

    if let Some(path) = args.manifest.as_ref() {
        output::write_manifest(path, &manifest)?;
    }

    debug!("Timing: total wall time {:?}", wall_start.elapsed());
    Ok(())
}
