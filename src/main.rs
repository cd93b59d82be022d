use clap::Parser;
use episode_courier::{Config, ProgressEvent, ProviderKind, RunSummary, SkipReason, run};
use humansize::{DECIMAL, format_size};
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use std::path::PathBuf;
use std::process;

/// Fetch, tag and file episodic video content
#[derive(Parser)]
#[command(name = "episode-courier", version, long_about = None)]
struct Cli {
    /// Configuration file (defaults to config.toml in the system config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Video provider to use instead of the configured one
    #[arg(short, long, value_enum)]
    provider: Option<ProviderKind>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logger(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    // RUST_LOG still wins over the flag
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_secs()
        .init();
}

fn transfer_bar(name: &str) -> ProgressBar {
    let style = ProgressStyle::with_template(
        "  {wide_msg} {binary_bytes_per_sec:>14} {bytes:>10}/{total_bytes:<10} [{bar:30}] {eta:>5}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ");

    let bar = ProgressBar::new(0).with_style(style);
    bar.set_message(name.to_string());
    bar
}

/// Handles progress events and prints formatted output to stdout
///
/// `bar` holds the transfer bar of the episode currently downloading.
fn handle_progress_event(event: ProgressEvent, bar: &mut Option<ProgressBar>) {
    match event {
        ProgressEvent::SeriesStarted {
            index,
            total,
            series_id,
        } => {
            println!("\n[{}/{}] Series {}", index + 1, total, series_id);
        }
        ProgressEvent::MetadataReady {
            title,
            episode_count,
        } => {
            println!("Found {} episode(s) for '{}'", episode_count, title);
        }
        ProgressEvent::SearchingProvider { provider, title } => {
            println!("Searching {} for '{}'...", provider, title);
        }
        ProgressEvent::SeriesNotFound { title } => {
            println!("'{}' is not available, moving on.", title);
        }
        ProgressEvent::ListingFound { title, entry_count } => {
            println!("Listing '{}' has {} episode(s)\n", title, entry_count);
        }
        ProgressEvent::EpisodeAlreadyDone {
            number,
            destination,
        } => {
            println!("  {:>3}: already in {}", number, destination.display());
        }
        ProgressEvent::EpisodeSkipped {
            display_name,
            reason,
        } => {
            let reason = match reason {
                SkipReason::NoEpisodeNumber => "no episode number",
                SkipReason::NoRendition => "no rendition available",
            };
            println!("  Skipping '{}': {}", display_name, reason);
        }
        ProgressEvent::FetchingArtwork { .. } => {}
        ProgressEvent::DownloadingEpisode {
            number,
            name,
            quality,
            ..
        } => {
            println!("  {:>3}: {} [{}]", number, name, quality);
            *bar = Some(transfer_bar(&name));
        }
        ProgressEvent::Transfer(progress) => {
            if let Some(bar) = bar {
                if let Some(total) = progress.total {
                    bar.set_length(total);
                }
                bar.set_position(progress.transferred);
            }
        }
        ProgressEvent::TaggingEpisode { .. } => {
            if let Some(bar) = bar.take() {
                bar.finish_and_clear();
            }
            println!("       tagging...");
        }
        ProgressEvent::EpisodeDelivered {
            destination, bytes, ..
        } => {
            println!(
                "       {} -> {}",
                format_size(bytes, DECIMAL),
                destination.display()
            );
        }
        ProgressEvent::SeriesComplete { title } => {
            println!("\nFinished '{}'", title);
        }
        ProgressEvent::Complete { .. } => {
            if let Some(bar) = bar.take() {
                bar.finish_and_clear();
            }
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!("\n=== Summary ===\n");
    println!(
        "  Delivered:       {} ({})",
        summary.delivered,
        format_size(summary.delivered_bytes, DECIMAL)
    );
    println!("  Already done:    {}", summary.already_done);
    println!("  Skipped:         {}", summary.skipped);
    println!("  Series missing:  {}", summary.series_not_found);
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let config_path = match cli.config {
        Some(path) => path,
        None => match Config::default_path() {
            Ok(path) => path,
            Err(e) => {
                log::error!("{}", e);
                process::exit(1);
            }
        },
    };

    let mut config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            process::exit(1);
        }
    };

    if let Some(provider) = cli.provider {
        config.provider = provider;
    }
    log::debug!("Loaded configuration from {}", config_path.display());

    let mut bar = None;
    match run(&config, |event| handle_progress_event(event, &mut bar)) {
        Ok(summary) => print_summary(&summary),
        Err(e) => {
            if let Some(bar) = bar.take() {
                bar.abandon();
            }
            log::error!("{}", e);
            log::debug!("{:?}", e);
            process::exit(1);
        }
    }
}
