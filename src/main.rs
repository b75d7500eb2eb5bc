use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode, WriteLogger};

use pdfshrink::cli::Args;
use pdfshrink::filename::compressed_output_path;
use pdfshrink::panic_handler::initialize_panic_handler;
use pdfshrink::pdf::{
    CompressionRequest, CompressionResult, Compressor, DocumentLoader, MupdfLoader, ProgressEvent,
    WorkerMessage, WorkerResponse, decide, estimate_compressed_size, format_file_size,
    recommend_level,
};
use pdfshrink::settings::{Settings, load_settings};

fn init_logging(args: &Args) -> Result<()> {
    let level = args.log_level();
    if let Some(path) = &args.log_file {
        let file = File::create(path)
            .with_context(|| format!("Failed to create log file: {}", path.display()))?;
        WriteLogger::init(level, Config::default(), file)?;
    } else {
        TermLogger::init(
            level,
            Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        )?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;
    initialize_panic_handler();

    info!("Starting pdfshrink {}", env!("CARGO_PKG_VERSION"));

    let settings = args.apply(load_settings(args.config.as_deref()));
    let source = fs::read(&args.input)
        .with_context(|| format!("Failed to read input file: {}", args.input.display()))?;

    if args.estimate {
        return print_estimate(&source, &settings);
    }

    let compressor = Compressor::new(Arc::new(MupdfLoader))
        .with_failure_policy(settings.page_failure)
        .with_execution(settings.execution);
    let request = CompressionRequest::new(source, settings.level, settings.fast_mode);

    if args.json {
        run_json(&compressor, request, args.output.as_deref())
    } else {
        run_interactive(&compressor, request, &args, &settings)
    }
}

fn run_interactive(
    compressor: &Compressor,
    request: CompressionRequest,
    args: &Args,
    settings: &Settings,
) -> Result<()> {
    let mut stderr = io::stderr();
    let result = compressor.compress(request, |event: ProgressEvent| {
        let _ = write!(stderr, "\rCompressing... {:>3.0}%", event.percent);
        let _ = stderr.flush();
    });
    eprintln!();
    let result = result.with_context(|| format!("Failed to compress {}", args.input.display()))?;

    if !result.skipped_pages.is_empty() {
        warn!(
            "{} page(s) could not be rendered and were left out: {:?}",
            result.skipped_pages.len(),
            result.skipped_pages
        );
    }

    let output = args.output.clone().unwrap_or_else(|| {
        compressed_output_path(
            &args.input,
            &settings.output_template,
            result.savings_percent(),
            settings.level,
        )
    });
    write_output(&output, &result)?;

    println!(
        "{} -> {} ({}% smaller), {} page(s) written to {}",
        format_file_size(result.original_size as u64),
        format_file_size(result.compressed_size as u64),
        result.savings_percent(),
        result.page_count,
        output.display()
    );
    Ok(())
}

/// Machine-readable mode: one JSON message per line on stdout
fn run_json(
    compressor: &Compressor,
    request: CompressionRequest,
    output: Option<&Path>,
) -> Result<()> {
    let stdout = io::stdout();
    let emit = |message: WorkerMessage| -> Result<()> {
        let mut out = stdout.lock();
        serde_json::to_writer(&mut out, &message)?;
        writeln!(out)?;
        out.flush()?;
        Ok(())
    };

    let outcome = compressor.compress(request, |event| {
        if let Err(e) = emit(WorkerResponse::Progress(event).into()) {
            warn!("Failed to emit progress: {e}");
        }
    });

    match outcome {
        Ok(result) => {
            if let Some(path) = output {
                write_output(path, &result)?;
            }
            emit(WorkerResponse::Done(result).into())
        }
        Err(e) => {
            let message = e.to_string();
            emit(WorkerResponse::Failed(e).into())?;
            anyhow::bail!(message)
        }
    }
}

fn write_output(path: &Path, result: &CompressionResult) -> Result<()> {
    fs::write(path, &result.pdf_bytes)
        .with_context(|| format!("Failed to write output file: {}", path.display()))?;
    info!("Wrote {} bytes to {}", result.compressed_size, path.display());
    Ok(())
}

fn print_estimate(source: &[u8], settings: &Settings) -> Result<()> {
    let doc = MupdfLoader.open(source).context("Failed to open PDF")?;
    let page_count = doc.page_count();
    let render = decide(settings.level, page_count, settings.fast_mode);
    let original = source.len() as u64;
    let estimate = estimate_compressed_size(original, settings.level);
    let recommendation = recommend_level(original);

    println!("Pages:          {page_count}");
    println!("Original size:  {}", format_file_size(original));
    println!(
        "Level:          {} (scale {:.2}, JPEG quality {})",
        settings.level,
        render.scale,
        render.jpeg_quality()
    );
    println!(
        "Expected size:  {} ({} - {})",
        format_file_size(estimate.expected),
        format_file_size(estimate.min),
        format_file_size(estimate.max)
    );
    println!(
        "Recommended:    {} - {}",
        recommendation.level, recommendation.reason
    );
    Ok(())
}
