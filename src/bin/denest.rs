//! denest: flatten nested JSON records into table rows using a mapping spec
//!
//! Usage:
//!   # Flatten a file with a mapping document, rows to stdout
//!   denest data.json --spec mapping.json
//!
//!   # Read from stdin
//!   echo '{"id": 1, "items": [{"sku": "a"}]}' | denest --spec mapping.json
//!
//!   # Use a job file and write per-table .jsonl files
//!   denest deals.json --jobs jobs.json --job deals --output-dir ./rows
//!
//!   # Emit an INSERT statement instead of JSON rows
//!   denest data.json --spec mapping.json --sql --table accounts --columns id,name --nums id

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use denest::mapping::{JobSet, MappingNode};
use denest::sink::{Columns, RowFilter, RowSink, SinkOptions};
use denest::source::{FileSource, RecordSource};
use denest::{FetchError, FlattenConfig, Flattener, Record, Row, SingleWriter, TableWriter};
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, Read};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "denest")]
#[command(about = "Flatten nested JSON records into table rows", long_about = None)]
struct Args {
    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<String>,

    /// Mapping document
    #[arg(long, conflicts_with = "jobs")]
    spec: Option<String>,

    /// Job document (mapping, tables, columns per job)
    #[arg(long)]
    jobs: Option<String>,

    /// Job to run from --jobs (defaults to the first one)
    #[arg(long, requires = "jobs")]
    job: Option<String>,

    /// Process newline-delimited JSON (one record per line)
    #[arg(long)]
    ndjson: bool,

    /// Output directory for one .jsonl file per table.
    /// If omitted, rows are written to stdout
    #[arg(long, short = 'o')]
    output_dir: Option<String>,

    /// Target table name
    #[arg(long)]
    table: Option<String>,

    /// Emit one INSERT statement instead of JSON rows
    #[arg(long)]
    sql: bool,

    /// Comma-separated target columns (default: every field seen)
    #[arg(long)]
    columns: Option<String>,

    /// Comma-separated columns written as numbers
    #[arg(long)]
    nums: Option<String>,

    /// Comma-separated columns that must not be null
    #[arg(long)]
    notnull: Option<String>,

    /// Quote literals with double quotes
    #[arg(long)]
    dquotes: bool,

    /// Maximum record nesting depth (default: 64)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Everything needed to process one input, from --spec or a job
struct Plan {
    spec: MappingNode,
    table: Option<String>,
    columns: Option<Columns>,
    options: SinkOptions,
    filter: RowFilter,
    links: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let mut plan = load_plan(&args)?;

    let mut config = FlattenConfig::default();
    if let Some(depth) = args.max_depth {
        config.max_depth = depth;
    }

    if let Some(table) = &args.table {
        plan.table = Some(table.clone());
    }
    if let Some(columns) = &args.columns {
        plan.columns = Some(Columns::from_names(split_list(columns)));
    }
    if let Some(nums) = &args.nums {
        plan.options.nums.extend(split_list(nums));
    }
    if let Some(notnull) = &args.notnull {
        plan.options.notnull.extend(split_list(notnull));
    }
    if args.dquotes {
        plan.options.double_quotes = true;
    }

    let records = if args.input.is_none() && !plan.links.is_empty() {
        fetch_links(&plan.links)?
    } else {
        read_records(args.input.as_deref(), args.ndjson)?
    };
    info!(records = records.len(), "input loaded");

    let flattener = Flattener::new(config);
    let mut rows: Vec<Row> = Vec::new();
    for (idx, record) in records.iter().enumerate() {
        let flat = flattener
            .flatten(record, &plan.spec)
            .with_context(|| format!("Failed to flatten record {}", idx + 1))?;
        debug!(record = idx + 1, rows = flat.len(), "record flattened");
        rows.extend(flat.into_rows());
    }

    if !plan.filter.is_empty() {
        let before = rows.len();
        rows = plan.filter.apply(rows);
        info!(dropped = before - rows.len(), "rows filtered");
    }

    if let Some(bad) = rows.iter().position(|r| !r.is_flat()) {
        warn!(row = bad + 1, "row holds nested values");
    }

    if args.sql {
        write_sql(&plan, &rows)?;
    } else if let Some(output_dir) = &args.output_dir {
        let table = plan.table.as_deref().unwrap_or("rows");
        let mut writer = TableWriter::new(output_dir)?;
        writer.write_rows(table, &rows)?;
        writer.flush()?;
        info!(rows = rows.len(), table, dir = %output_dir, "rows written");
    } else {
        let mut writer = SingleWriter::new(std::io::stdout().lock());
        writer.write_rows(plan.table.as_deref(), &rows)?;
        writer.flush()?;
    }

    Ok(())
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("denest={}", level).parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn load_plan(args: &Args) -> Result<Plan> {
    if let Some(spec_path) = &args.spec {
        let spec = MappingNode::from_path(spec_path)
            .with_context(|| format!("Failed to load mapping: {}", spec_path))?;
        return Ok(Plan {
            spec,
            table: None,
            columns: None,
            options: SinkOptions::default(),
            filter: RowFilter::default(),
            links: Vec::new(),
        });
    }

    let Some(jobs_path) = &args.jobs else {
        bail!("either --spec or --jobs is required");
    };
    let jobs = JobSet::from_path(jobs_path)
        .with_context(|| format!("Failed to load jobs: {}", jobs_path))?;
    let job = match &args.job {
        Some(name) => jobs.get(name)?,
        None => match jobs.iter().next() {
            Some(job) => job,
            None => bail!("{} defines no jobs", jobs_path),
        },
    };

    info!(job = %job.name, links = job.links.len(), "using job");

    Ok(Plan {
        spec: job.controls.clone(),
        table: job.table().map(str::to_string),
        columns: job.columns.clone(),
        options: job.options.clone(),
        filter: job.filter.clone(),
        links: job.links.clone(),
    })
}

fn write_sql(plan: &Plan, rows: &[Row]) -> Result<()> {
    let Some(table) = plan.table.as_deref() else {
        bail!("--sql needs a table (--table or the job's tables)");
    };
    let columns = match &plan.columns {
        Some(columns) => columns.clone(),
        None => Columns::from_names(field_union(rows)),
    };

    let sink = RowSink::new(columns, plan.options.clone());
    let mut writer = SingleWriter::new(std::io::stdout().lock());
    match sink.insert(table, rows)? {
        Some(statement) => writer.write_line(&statement)?,
        None => warn!(table, "no rows left to insert"),
    }
    writer.flush()
}

/// Every field name seen across `rows`, in first-seen order
fn field_union(rows: &[Row]) -> Vec<String> {
    let mut names: indexmap::IndexSet<String> = indexmap::IndexSet::new();
    for row in rows {
        names.extend(row.keys().cloned());
    }
    names.into_iter().collect()
}

/// Fetch every job link that resolves locally. Remote links are skipped.
fn fetch_links(links: &[String]) -> Result<Vec<Record>> {
    let source = FileSource::new();
    let mut records = Vec::new();
    for link in links {
        match source.fetch(link) {
            Ok(Record::List(items)) => records.extend(items),
            Ok(record) => records.push(record),
            Err(FetchError::Unsupported(link)) => warn!(%link, "remote source skipped"),
            Err(e) => return Err(e).context("Failed to fetch job source"),
        }
    }
    Ok(records)
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Read records using SIMD-accelerated JSON parsing when possible
fn read_records(input: Option<&str>, ndjson: bool) -> Result<Vec<Record>> {
    let reader = if let Some(file_path) = input {
        Box::new(BufReader::new(
            File::open(file_path).with_context(|| format!("Failed to open {}", file_path))?,
        )) as Box<dyn Read>
    } else {
        Box::new(std::io::stdin()) as Box<dyn Read>
    };

    let mut content = Vec::new();
    let mut buf_reader = BufReader::new(reader);
    buf_reader.read_to_end(&mut content)?;

    let mut records = Vec::new();
    if !ndjson {
        match simd_json::to_owned_value(&mut content.clone()) {
            Ok(simd_json::OwnedValue::Array(arr)) => {
                // JSON array - every element is a record
                for elem in arr.iter() {
                    let json_str = simd_json::to_string(elem)?;
                    let value: Value = serde_json::from_str(&json_str)?;
                    records.push(Record::from(value));
                }
                return Ok(records);
            }
            Ok(elem) => {
                let json_str = simd_json::to_string(&elem)?;
                let value: Value = serde_json::from_str(&json_str)?;
                records.push(Record::from(value));
                return Ok(records);
            }
            Err(e) => {
                debug!(error = %e, "not a single JSON document, reading as NDJSON");
            }
        }
    }

    // NDJSON, or input simd-json could not take as one document
    let content_str = String::from_utf8_lossy(&content);
    for (idx, line) in content_str.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line)
            .with_context(|| format!("Failed to parse JSON on line {}", idx + 1))?;
        records.push(Record::from(value));
    }

    Ok(records)
}
