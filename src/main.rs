mod catalog;
mod cli;
mod extractor;
mod io;
mod layout;
mod listing;
mod logging;
mod outside;
mod pipeline;
mod result;
mod settings;
mod sidecar;
mod types;
mod validate;

use clap::Parser;
use miette::{IntoDiagnostic, WrapErr};
use time::UtcOffset;
use tracing::{debug, info, warn};

use crate::{
    catalog::Catalog,
    cli::{Cli, Command, DownloadArgs, ExtractArgs, SelectionArgs},
    extractor::{ExtractOutcome, SegmentExtractor},
    layout::Layout,
    outside::{Ffmpeg, HttpThumbnails, TwitchDownloader},
    pipeline::{CancellationWatcher, Orchestrator, PipelineOptions, PipelineState, Selection},
    result::{Error, Result},
    settings::Settings,
    types::Timeframe,
};

fn main() -> miette::Result<()> {
    // Only reliable while no other thread is running
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);

    let cli = Cli::parse();
    logging::init_logging(cli.log_level(), offset)?;

    let settings = Settings::load(cli.settings.as_deref())?;
    debug!("{settings:?}");

    run(cli, settings, offset).map_err(miette::Report::from)
}

fn run(cli: Cli, settings: Settings, offset: UtcOffset) -> Result<()> {
    let command = cli
        .command
        .unwrap_or_else(|| Command::Download(DownloadArgs::default()));

    let config_dir = cli.config_dir.unwrap_or_else(|| settings.config_dir.clone());
    let layout = Layout::new(cli.output_dir.unwrap_or_else(|| settings.output_dir.clone()))
        .with_offset(offset);
    let load = || load_catalog(&config_dir, &settings);

    match command {
        Command::Download(args) => download(args, &load()?, &layout, &settings, cli.dry_run),
        Command::ListCollections => listing::list_collections(&load()?, &mut std::io::stdout()),
        Command::ListDuplicateTitles => {
            listing::list_duplicate_titles(&load()?, &mut std::io::stdout())
        }
        Command::ListVideos(args) => {
            let catalog = load()?;
            let selection = selection(&catalog, &args)?;
            listing::list_videos(&catalog, &selection, &mut std::io::stdout())
        }
        // Works on any media file, without the catalog
        Command::Extract(args) => extract(args, &settings, cli.dry_run),
        Command::Validate => {
            let catalog = load()?;
            let ffmpeg = Ffmpeg::new(&settings.ffmpeg, &settings.ffprobe)?;
            let report = validate::validate_durations(&catalog, &layout, &ffmpeg);
            if !report.mismatches.is_empty() {
                let ids: Vec<String> = report.mismatches.iter().map(|m| m.id.to_string()).collect();
                let missing = report
                    .mismatches
                    .iter()
                    .map(|m| m.expected.saturating_sub(m.actual).as_millis())
                    .sum();
                warn!(
                    "Videos {} may be incomplete ({} missing), delete them to download them again",
                    ids.join(", "),
                    types::Timestamp::from_millis(missing)
                );
            }
            Ok(())
        }
    }
}

/// Load and resolve the catalog, refusing to go on if any collection entry is unresolved
fn load_catalog(config_dir: &std::path::Path, settings: &Settings) -> Result<Catalog> {
    let mut catalog = Catalog::load(config_dir, settings.accepted_types.as_deref())?;
    info!(
        "{} videos and {} collections in the catalog",
        catalog.items.len(),
        catalog.groups.len()
    );

    let errors = catalog.resolve();
    if !errors.is_empty() {
        return Err(Error::Resolution(errors.len()));
    }
    Ok(catalog)
}

fn selection(catalog: &Catalog, args: &SelectionArgs) -> Result<Selection> {
    if args.non_collections {
        return Ok(Selection::NonCollections);
    }
    if args.collections.is_empty() {
        return Ok(Selection::All);
    }

    args.collections
        .iter()
        .map(|name| {
            catalog
                .group_by_title(name)
                .ok_or_else(|| Error::Configuration(format!("Unknown collection: {name}")))
        })
        .collect::<Result<_>>()
        .map(Selection::Collections)
}

fn download(
    args: DownloadArgs,
    catalog: &Catalog,
    layout: &Layout,
    settings: &Settings,
    dry_run: bool,
) -> Result<()> {
    let selection = selection(catalog, &args.selection)?;

    let max_concurrent_finalization = args
        .max_finalizations
        .unwrap_or(settings.max_concurrent_finalization);
    if max_concurrent_finalization < 1 {
        return Err(Error::Configuration(
            "--max-finalizations must be at least 1".to_owned(),
        ));
    }

    info!("Archiving into {}", layout.output_dir().display());
    if !args.download_video && !args.download_chat && !args.download_thumbnail {
        info!("Nothing is downloaded, only writing the metadata");
    }

    let downloader = TwitchDownloader::new(
        args.downloader_cli
            .unwrap_or_else(|| settings.downloader_cli.clone()),
        args.temp_dir.or_else(|| settings.temp_dir.clone()),
    );

    let thumbnails = HttpThumbnails::new();

    let state = PipelineState::new(PipelineState::time_limit_from_minutes(args.time_limit));
    // Restores the terminal when dropped, whatever the outcome of the run
    let _watcher = if args.no_watcher || dry_run {
        None
    } else {
        let watcher = CancellationWatcher::spawn(settings.stop_key, state.clone())
            .into_diagnostic()
            .wrap_err("Could not start the stop key watcher")?;
        Some(watcher)
    };

    let options = PipelineOptions {
        download_video: args.download_video,
        download_chat: args.download_chat,
        order: args.order,
        max_concurrent_finalization,
        dry_run,
    };
    let mut orchestrator = Orchestrator::new(catalog, layout, &downloader, options, state.clone());
    if args.download_thumbnail {
        orchestrator = orchestrator.with_thumbnails(&thumbnails);
    }
    let summary = orchestrator.run(&selection)?;

    info!(
        "{} videos processed, {} downloaded in {} minutes",
        summary.items_processed,
        summary.transfers_launched,
        state.elapsed().as_secs() / 60
    );
    if summary.stopped_early {
        info!("Stopped before the end, run again to continue");
    }
    Ok(())
}

fn extract(args: ExtractArgs, settings: &Settings, dry_run: bool) -> Result<()> {
    let timeframe = Timeframe::new(args.start, args.stop);
    if !timeframe.is_ordered() {
        return Err(Error::Configuration(format!(
            "The start of the part must not be after its end ({timeframe})"
        )));
    }

    let ffmpeg = if dry_run {
        Ffmpeg::unchecked(&settings.ffmpeg, &settings.ffprobe)
    } else {
        Ffmpeg::new(&settings.ffmpeg, &settings.ffprobe)?
    };

    match SegmentExtractor::new(&ffmpeg).extract(&args.file, timeframe, dry_run)? {
        ExtractOutcome::Extracted(plan) => info!(
            "Written {} ({} long, starting {} earlier than asked)",
            plan.output.display(),
            plan.duration,
            args.start.saturating_sub(plan.seek)
        ),
        ExtractOutcome::Skipped(_) | ExtractOutcome::Planned(_) => {}
    }
    Ok(())
}
