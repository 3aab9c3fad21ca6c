//! heapstore - command-line driver for heap files

use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use heapstore::access::{
    create_heap_file, destroy_heap_file, Datatype, HeapFile, HeapFileScan, InsertFileScan,
    Operator,
};
use heapstore::storage::{BufferPoolConfig, BufferPoolManager, PageId};
use log::info;
use std::io::{self, BufRead};
use std::path::PathBuf;

/// heapstore - heap files of variable-length records
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory
    #[arg(short = 'D', long, default_value = "./heap_data")]
    data_dir: PathBuf,

    /// Number of buffer pool frames
    #[arg(short, long, default_value = "64")]
    frames: usize,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty heap file
    Create { name: String },

    /// Delete a heap file
    Destroy { name: String },

    /// Append records; reads one record per line from stdin when none are given
    Insert { name: String, records: Vec<String> },

    /// Print the records of a heap file, optionally filtered
    Scan {
        name: String,

        /// Byte offset of the compared attribute
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Attribute width in bytes; defaults to the width of the value
        #[arg(long)]
        length: Option<usize>,

        /// Attribute type: string, integer or float
        #[arg(long = "type", default_value = "string")]
        datatype: Datatype,

        /// Comparison operator: lt, lte, eq, gte, gt or ne
        #[arg(long, default_value = "eq")]
        op: Operator,

        /// Filter value; without it every record is printed
        #[arg(long)]
        value: Option<String>,
    },

    /// Print record and page counts
    Stats { name: String },
}

fn encode_filter(datatype: Datatype, value: &str) -> Result<Vec<u8>> {
    let bytes = match datatype {
        Datatype::String => value.as_bytes().to_vec(),
        Datatype::Integer => value
            .parse::<i32>()
            .with_context(|| format!("Invalid integer: {}", value))?
            .to_le_bytes()
            .to_vec(),
        Datatype::Float => value
            .parse::<f32>()
            .with_context(|| format!("Invalid float: {}", value))?
            .to_le_bytes()
            .to_vec(),
    };
    if bytes.is_empty() {
        bail!("Filter value must not be empty");
    }
    Ok(bytes)
}

fn insert(pool: &BufferPoolManager, name: &str, records: Vec<String>) -> Result<()> {
    let mut inserter = InsertFileScan::open(pool, name)?;

    let records = if records.is_empty() {
        io::stdin().lock().lines().collect::<io::Result<Vec<_>>>()?
    } else {
        records
    };

    for record in &records {
        let rid = inserter.insert_record(record.as_bytes())?;
        println!("{}", rid);
    }
    inserter.close()?;

    info!("Inserted {} records into {}", records.len(), name);
    Ok(())
}

fn scan(
    pool: &BufferPoolManager,
    name: &str,
    offset: usize,
    length: Option<usize>,
    datatype: Datatype,
    op: Operator,
    value: Option<String>,
) -> Result<()> {
    let mut scan = HeapFileScan::open(pool, name)?;

    if let Some(value) = value {
        let filter = encode_filter(datatype, &value)?;
        let length = length.unwrap_or(filter.len());
        scan.start_scan(offset, length, datatype, Some(&filter), op)?;
    }

    let mut matched = 0;
    while let Some(rid) = scan.scan_next()? {
        let record = scan.current_record()?;
        println!("{}\t{}", rid, String::from_utf8_lossy(&record.data));
        matched += 1;
    }
    scan.close()?;

    info!("{} records matched in {}", matched, name);
    Ok(())
}

fn stats(pool: &BufferPoolManager, name: &str) -> Result<()> {
    let heap = HeapFile::open(pool, name)?;
    let show = |page: Option<PageId>| page.map_or_else(|| "-".to_string(), |id| id.to_string());

    println!("name:    {}", heap.name());
    println!("records: {}", heap.record_count());
    println!("pages:   {}", heap.page_count());
    println!("first:   {}", show(heap.first_page()));
    println!("last:    {}", show(heap.last_page()));

    heap.close()?;
    Ok(())
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let pool = BufferPoolManager::new(BufferPoolConfig {
        data_dir: args.data_dir.clone(),
        max_frames: args.frames,
    })
    .context("Failed to open data directory")?;

    match args.command {
        Command::Create { name } => {
            create_heap_file(&pool, &name)?;
            info!("Created heap file {} in {}", name, args.data_dir.display());
        }
        Command::Destroy { name } => {
            destroy_heap_file(&pool, &name)?;
            info!("Destroyed heap file {}", name);
        }
        Command::Insert { name, records } => insert(&pool, &name, records)?,
        Command::Scan {
            name,
            offset,
            length,
            datatype,
            op,
            value,
        } => scan(&pool, &name, offset, length, datatype, op, value)?,
        Command::Stats { name } => stats(&pool, &name)?,
    }

    Ok(())
}
