use anyhow::Result;
use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::time::Instant;

use jsonlview::index::{IndexUpdate, LineIndex, Progress};
use tracing_subscriber::EnvFilter;

fn format_duration(millis: u128) -> String {
    if millis < 1000 {
        format!("{} ms", millis)
    } else {
        format!("{:.2} s", millis as f64 / 1000.0)
    }
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

fn format_throughput(bytes: u64, millis: u128) -> String {
    if millis == 0 {
        return "N/A".to_string();
    }
    let bytes_per_sec = (bytes as f64 / millis as f64) * 1000.0;
    format_size(bytes_per_sec as u64) + "/s"
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <jsonl_file>", args[0]);
        eprintln!();
        eprintln!("Example:");
        eprintln!("  RUST_LOG=jsonlview=debug {} app.jsonl", args[0]);
        std::process::exit(1);
    }

    let path = PathBuf::from(&args[1]);
    if !path.exists() {
        eprintln!("Error: file not found: {}", path.display());
        std::process::exit(1);
    }

    let size = std::fs::metadata(&path)?.len();

    println!("Line Index Build Benchmark");
    println!("==========================");
    println!();
    println!("File:        {}", path.display());
    println!("Size:        {}", format_size(size));
    println!();

    let (tx, rx) = channel();
    let progress = Progress::new(tx).every(1_000_000);

    let start = Instant::now();
    let mut index = LineIndex::build(&path, Some(&progress))?;
    let elapsed = start.elapsed();
    let elapsed_millis = elapsed.as_millis();

    for report in rx.try_iter() {
        println!(
            "  {:>12} lines  {:>10} / {}",
            report.lines,
            format_size(report.bytes),
            format_size(report.total_bytes)
        );
    }

    println!("Full build:");
    println!("-----------");
    println!("Total lines:  {}", index.total_lines());
    println!("Partial tail: {}", index.has_partial_tail());
    println!("Time:         {}", format_duration(elapsed_millis));
    println!("Throughput:   {}", format_throughput(size, elapsed_millis));
    println!(
        "Lines/sec:    {:.0}",
        index.total_lines() as f64 / elapsed.as_secs_f64()
    );
    println!(
        "Offsets:      {}",
        format_size((index.offsets().len() * std::mem::size_of::<u64>()) as u64)
    );
    println!();

    // Nothing changed on disk, so this only stats and compares.
    let start = Instant::now();
    let outcome = index.update(&path, None)?;
    let elapsed = start.elapsed();

    println!("Incremental update:");
    println!("-------------------");
    match outcome {
        IndexUpdate::Unchanged => println!("Outcome:      unchanged"),
        IndexUpdate::Appended { previous_lines } => println!(
            "Outcome:      appended {} lines",
            index.total_lines() - previous_lines
        ),
        IndexUpdate::Rebuilt => println!("Outcome:      rebuilt"),
    }
    println!("Time:         {} us", elapsed.as_micros());

    Ok(())
}
