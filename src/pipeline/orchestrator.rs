use std::{path::Path, sync::Arc, thread, time::Duration};

use crossbeam_channel::{unbounded, Receiver, Sender};
use miette::{Context, IntoDiagnostic};
use tracing::{debug, error, info, warn};

use super::{
    request::{expand, traversal, DownloadRequest, Selection},
    slot::DownloadSlot,
    state::PipelineState,
};
use crate::{
    catalog::{Catalog, WorkItem},
    io::{write_if_changed, WriteOutcome},
    layout::Layout,
    outside::{MediaDownloader, ThumbnailFetcher},
    result::{Error, Result},
    sidecar::Sidecar,
    types::Order,
};

/// Polling interval of the orchestrator while waiting for finalizations
const SLOT_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub download_video: bool,
    pub download_chat: bool,
    pub order: Order,
    /// Maximum number of videos being finalized at once, at least 1
    pub max_concurrent_finalization: usize,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub items_processed: usize,
    pub transfers_launched: usize,
    /// The run ended because of a stop request or the time limit
    pub stopped_early: bool,
}

/// Drive the downloads of the selected items.
///
/// Only one video transfer runs at a time. Once a transfer is over, its
/// finalization continues in the background while the next item is processed,
/// with at most `max_concurrent_finalization` finalizations at once.
pub struct Orchestrator<'a> {
    catalog: &'a Catalog,
    layout: &'a Layout,
    downloader: &'a dyn MediaDownloader,
    thumbnails: Option<&'a dyn ThumbnailFetcher>,
    options: PipelineOptions,
    state: Arc<PipelineState>,

    workers: Vec<thread::JoinHandle<()>>,
    failure_send: Sender<Error>,
    failure_receive: Receiver<Error>,
    failure: Option<Error>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        catalog: &'a Catalog,
        layout: &'a Layout,
        downloader: &'a dyn MediaDownloader,
        options: PipelineOptions,
        state: Arc<PipelineState>,
    ) -> Self {
        let (failure_send, failure_receive) = unbounded();
        Self {
            catalog,
            layout,
            downloader,
            thumbnails: None,
            options: PipelineOptions {
                max_concurrent_finalization: options.max_concurrent_finalization.max(1),
                ..options
            },
            state,
            workers: vec![],
            failure_send,
            failure_receive,
            failure: None,
        }
    }

    /// Also fetch the thumbnails of the items that have one.
    /// Failing to do so is only reported.
    pub fn with_thumbnails(mut self, fetcher: &'a dyn ThumbnailFetcher) -> Self {
        self.thumbnails = Some(fetcher);
        self
    }

    /// Process the selected items, then wait for every finalization before returning.
    ///
    /// A failing download does not interrupt the others: no new download is
    /// started, the running ones are waited for, and the first failure is returned.
    pub fn run(mut self, selection: &Selection) -> Result<RunSummary> {
        let items = traversal(self.catalog, selection, self.options.order);
        info!("{} videos to process", items.len());

        let outcome = self.process_items(&items);
        self.drain();

        self.collect_failures();
        match (outcome, self.failure.take()) {
            (Err(err), other) => {
                if other.is_some() {
                    debug!("Another download failed too");
                }
                Err(err)
            }
            (Ok(_), Some(err)) => Err(err),
            (Ok(summary), None) => Ok(summary),
        }
    }

    fn process_items(&mut self, items: &[&WorkItem]) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        for item in items {
            if self.collect_failures() {
                warn!("A download failed, not starting new ones");
                break;
            }

            for request in expand(item) {
                if self.process_request(&request)? {
                    summary.transfers_launched += 1;
                }
            }
            summary.items_processed += 1;

            if self.state.should_stop() {
                if self.state.stop_requested() {
                    info!("Stop requested, not starting new downloads");
                } else {
                    info!(
                        "Time limit reached after {} minutes, not starting new downloads",
                        self.state.elapsed().as_secs() / 60
                    );
                }
                summary.stopped_early = true;
                break;
            }
        }

        Ok(summary)
    }

    /// Write the metadata of the request and, for the primary one, fetch the assets.
    /// Returns whether a video transfer has been launched.
    fn process_request(&mut self, request: &DownloadRequest<'_>) -> Result<bool> {
        let (catalog, item, context) = (self.catalog, request.item, request.context);
        let prefix = Layout::display_prefix(catalog, item, context);

        let metadata_path = self.layout.metadata_path(catalog, item, context);
        match Sidecar::new(catalog, item, context).write(&metadata_path, self.options.dry_run)? {
            WriteOutcome::Created => {
                info!("Creating:    {prefix}{}", self.layout.metadata_filename(item, context))
            }
            WriteOutcome::Updated => {
                info!("Updating:    {prefix}{}", self.layout.metadata_filename(item, context))
            }
            WriteOutcome::Unchanged => {}
        }

        if request.is_external() {
            return Ok(false);
        }

        if self.options.download_chat {
            let chat_path = self.layout.chat_path(catalog, item);
            if !chat_path.exists() {
                info!("Downloading: {prefix}{}", self.layout.chat_filename(item));
                if !self.options.dry_run {
                    create_parent(&chat_path)?;
                    self.downloader.download_chat(item.id, &chat_path)?;
                }
            }
        }

        if let (Some(fetcher), Some(url)) = (self.thumbnails, item.thumbnail_url.as_deref()) {
            let thumbnail_path = self.layout.thumbnail_path(catalog, item);
            if !thumbnail_path.exists() {
                info!("Downloading: {prefix}{}", self.layout.thumbnail_filename(item));
                if !self.options.dry_run {
                    if let Err(err) = save_thumbnail(fetcher, url, &thumbnail_path) {
                        warn!(
                            "No thumbnail for '{}': {:?}",
                            item.title,
                            miette::Report::from(err)
                        );
                    }
                }
            }
        }

        if self.options.download_video {
            let video_path = self.layout.video_path(catalog, item);
            if !video_path.exists() {
                info!("Downloading: {prefix}{}", self.layout.video_filename(item));
                if !self.options.dry_run {
                    create_parent(&video_path)?;
                    return self.transfer_video(item, video_path.as_path());
                }
            }
        }

        Ok(false)
    }

    /// Launch the download of a video and return once its transfer phase is over.
    /// Returns false if a stop was requested while waiting for a finalization slot.
    fn transfer_video(&mut self, item: &WorkItem, output: &Path) -> Result<bool> {
        let cap = self.options.max_concurrent_finalization;
        if self.state.active_finalizations() >= cap {
            debug!("{cap} videos are finalizing, waiting for one to finish");
        }
        while self.state.active_finalizations() >= cap {
            if self.state.should_stop() {
                info!("Stopping while waiting, '{}' is not downloaded", item.title);
                return Ok(false);
            }
            thread::sleep(SLOT_POLL);
        }

        let handoff = DownloadSlot::launch(
            self.workers.len(),
            self.downloader,
            item.id,
            &item.title,
            output.to_path_buf(),
            &self.state,
            self.failure_send.clone(),
        )?;

        // Only one transfer at a time: the next item waits for this handoff
        self.workers.push(handoff.wait_transfer_done());
        Ok(true)
    }

    /// Move the failures reported by the workers, keep the first one.
    /// Returns whether a failure has been seen.
    fn collect_failures(&mut self) -> bool {
        for err in self.failure_receive.try_iter() {
            if self.failure.is_none() {
                self.failure = Some(err);
            } else {
                error!("{:?}", miette::Report::from(err));
            }
        }
        self.failure.is_some()
    }

    /// Block until every launched download has finished finalizing
    fn drain(&mut self) {
        let active = self.state.active_finalizations();
        if active > 0 {
            info!("Waiting for {active} downloads to finish finalizing");
        }
        while self.state.active_finalizations() > 0 {
            thread::sleep(SLOT_POLL);
        }

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("A download worker panicked");
            }
        }
    }
}

fn save_thumbnail(fetcher: &dyn ThumbnailFetcher, url: &str, output: &Path) -> Result<()> {
    let image = fetcher.fetch(url)?;
    write_if_changed(output, &image, false)?;
    Ok(())
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .into_diagnostic()
            .wrap_err_with(|| format!("Could not create directory {}", dir.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        path::PathBuf,
        sync::Mutex,
        thread::JoinHandle,
    };

    use super::*;
    use crate::{catalog::tests::item, outside::RunningTransfer};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Chat(u64),
        Launch(u64),
        Transferred(u64),
        Finalized(u64),
    }

    type Events = Arc<Mutex<Vec<Event>>>;

    /// Stands in for the download tool: writes the output file after `transfer`,
    /// then exits `finalize` later with `exit_code`
    struct FakeDownloader {
        events: Events,
        transfer: Duration,
        finalize: Duration,
        exit_code: i32,
        fail_launch: bool,
        stop_on_launch: Option<Arc<PipelineState>>,
    }

    impl FakeDownloader {
        fn new(transfer_ms: u64, finalize_ms: u64) -> Self {
            Self {
                events: Arc::default(),
                transfer: Duration::from_millis(transfer_ms),
                finalize: Duration::from_millis(finalize_ms),
                exit_code: 0,
                fail_launch: false,
                stop_on_launch: None,
            }
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    struct FakeTransfer {
        thread: Option<JoinHandle<i32>>,
        exited: Option<i32>,
    }

    impl RunningTransfer for FakeTransfer {
        fn try_wait(&mut self) -> Result<Option<bool>> {
            if self.thread.as_ref().is_some_and(|t| t.is_finished()) {
                self.wait()?;
            }
            Ok(self.exited.map(|code| code == 0))
        }

        fn wait(&mut self) -> Result<Option<i32>> {
            if let Some(thread) = self.thread.take() {
                self.exited = Some(thread.join().unwrap());
            }
            Ok(self.exited)
        }
    }

    impl MediaDownloader for FakeDownloader {
        fn program(&self) -> &str {
            "fake-downloader"
        }

        fn download_chat(&self, video_id: u64, output: &Path) -> Result<()> {
            self.events.lock().unwrap().push(Event::Chat(video_id));
            std::fs::write(output, b"[]")?;
            Ok(())
        }

        fn start_video(&self, video_id: u64, output: &Path) -> Result<Box<dyn RunningTransfer>> {
            if self.fail_launch {
                return Err(Error::Launch {
                    program: self.program().into(),
                    source: io::Error::new(io::ErrorKind::NotFound, "not installed"),
                });
            }

            self.events.lock().unwrap().push(Event::Launch(video_id));
            if let Some(state) = &self.stop_on_launch {
                state.toggle_stop();
            }

            let (events, output) = (self.events.clone(), output.to_path_buf());
            let (transfer, finalize, code) = (self.transfer, self.finalize, self.exit_code);
            let thread = thread::spawn(move || {
                thread::sleep(transfer);
                // Recorded first so that it always precedes what the handoff triggers
                events.lock().unwrap().push(Event::Transferred(video_id));
                std::fs::write(&output, b"video").unwrap();
                thread::sleep(finalize);
                events.lock().unwrap().push(Event::Finalized(video_id));
                code
            });

            Ok(Box::new(FakeTransfer {
                thread: Some(thread),
                exited: None,
            }))
        }
    }

    /// Serves a fixed image, or fails every fetch
    struct FakeThumbnails {
        fail: bool,
        fetched: Mutex<Vec<String>>,
    }

    impl FakeThumbnails {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                fetched: Mutex::default(),
            }
        }
    }

    impl ThumbnailFetcher for FakeThumbnails {
        fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.fetched.lock().unwrap().push(url.to_owned());
            if self.fail {
                return crate::result::bail(format!("Fetching {url} failed (status=503)"));
            }
            Ok(b"jpeg".to_vec())
        }
    }

    fn catalog(count: u64) -> Catalog {
        Catalog::new(
            (1..=count)
                .map(|id| item(id, &format!("Video {id}"), 60, id as u8))
                .collect(),
            vec![],
        )
    }

    fn options(max_concurrent_finalization: usize) -> PipelineOptions {
        PipelineOptions {
            download_video: true,
            download_chat: false,
            order: Order::OldestFirst,
            max_concurrent_finalization,
            dry_run: false,
        }
    }

    fn run(
        catalog: &Catalog,
        out: &Path,
        downloader: &FakeDownloader,
        options: PipelineOptions,
        state: &Arc<PipelineState>,
    ) -> Result<RunSummary> {
        let layout = Layout::new(out);
        Orchestrator::new(catalog, &layout, downloader, options, state.clone()).run(&Selection::All)
    }

    fn with_thumbnail_urls(mut catalog: Catalog) -> Catalog {
        for item in &mut catalog.items {
            item.thumbnail_url = Some(format!("https://img.example/{}.jpg", item.id));
        }
        catalog
    }

    fn position(events: &[Event], event: Event) -> usize {
        events.iter().position(|&e| e == event).unwrap()
    }

    fn files_in(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .map(|entries| entries.flatten().map(|e| e.path()).collect())
            .unwrap_or_default();
        files.sort();
        files
    }

    #[test]
    fn cap_of_one_waits_for_the_whole_finalization() {
        let out = tempfile::tempdir().unwrap();
        let catalog = catalog(2);
        let downloader = FakeDownloader::new(20, 300);
        let state = PipelineState::new(None);

        let summary = run(&catalog, out.path(), &downloader, options(1), &state).unwrap();

        use Event::*;
        assert_eq!(
            downloader.events(),
            [Launch(1), Transferred(1), Finalized(1), Launch(2), Transferred(2), Finalized(2)]
        );
        assert_eq!(summary.transfers_launched, 2);
        assert_eq!(state.active_finalizations(), 0);
    }

    #[test]
    fn finalizations_overlap_but_transfers_do_not() {
        let out = tempfile::tempdir().unwrap();
        let catalog = catalog(3);
        let downloader = FakeDownloader::new(30, 600);
        let state = PipelineState::new(None);

        run(&catalog, out.path(), &downloader, options(3), &state).unwrap();

        use Event::*;
        let events = downloader.events();
        for id in 1..3 {
            assert!(position(&events, Transferred(id)) < position(&events, Launch(id + 1)));
        }
        assert!(position(&events, Launch(2)) < position(&events, Finalized(1)));
        assert!(position(&events, Launch(3)) < position(&events, Finalized(1)));
        assert_eq!(events.len(), 9);
        assert_eq!(state.active_finalizations(), 0);
    }

    #[test]
    fn stop_lets_the_running_download_complete() {
        let out = tempfile::tempdir().unwrap();
        let catalog = catalog(3);
        let state = PipelineState::new(None);
        let mut downloader = FakeDownloader::new(20, 200);
        downloader.stop_on_launch = Some(state.clone());

        let summary = run(&catalog, out.path(), &downloader, options(4), &state).unwrap();

        use Event::*;
        assert_eq!(downloader.events(), [Launch(1), Transferred(1), Finalized(1)]);
        assert!(summary.stopped_early);
        assert_eq!(summary.items_processed, 1);
        assert_eq!(state.active_finalizations(), 0);
    }

    #[test]
    fn stop_while_waiting_for_a_finalization_slot_launches_nothing() {
        let out = tempfile::tempdir().unwrap();
        let catalog = catalog(2);
        let downloader = FakeDownloader::new(20, 400);
        let state = PipelineState::new(None);

        // Item 1 is transferred but still finalizing, item 2 waits for its slot
        let stopper = {
            let state = state.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(150));
                state.toggle_stop();
            })
        };
        let summary = run(&catalog, out.path(), &downloader, options(1), &state).unwrap();
        stopper.join().unwrap();

        use Event::*;
        assert_eq!(downloader.events(), [Launch(1), Transferred(1), Finalized(1)]);
        assert!(summary.stopped_early);
        assert_eq!(summary.transfers_launched, 1);
        assert_eq!(state.active_finalizations(), 0);
        let layout = Layout::new(out.path());
        assert!(!layout.video_path(&catalog, &catalog.items[1]).exists());
    }

    #[test]
    fn time_limit_stops_between_items() {
        let out = tempfile::tempdir().unwrap();
        let catalog = catalog(3);
        let downloader = FakeDownloader::new(0, 0);
        let state = PipelineState::new(Some(Duration::ZERO));
        let options = PipelineOptions {
            download_video: false,
            ..options(1)
        };

        let summary = run(&catalog, out.path(), &downloader, options, &state).unwrap();

        assert!(summary.stopped_early);
        assert_eq!(summary.items_processed, 1);
        assert_eq!(files_in(out.path()).len(), 1);
    }

    #[test]
    fn failed_finalization_is_reported_after_the_drain() {
        let out = tempfile::tempdir().unwrap();
        let catalog = catalog(1);
        let mut downloader = FakeDownloader::new(10, 50);
        downloader.exit_code = 1;
        let state = PipelineState::new(None);

        let err = run(&catalog, out.path(), &downloader, options(2), &state).unwrap_err();

        assert!(matches!(err, Error::Finalize { code: Some(1), .. }));
        assert!(downloader.events().contains(&Event::Finalized(1)));
        assert_eq!(state.active_finalizations(), 0);
    }

    #[test]
    fn launch_failure_aborts_the_run() {
        let out = tempfile::tempdir().unwrap();
        let catalog = catalog(2);
        let mut downloader = FakeDownloader::new(0, 0);
        downloader.fail_launch = true;
        let state = PipelineState::new(None);

        let err = run(&catalog, out.path(), &downloader, options(2), &state).unwrap_err();

        assert!(matches!(err, Error::Launch { .. }));
        assert_eq!(state.active_finalizations(), 0);
        // Only the metadata of the first item has been written
        assert_eq!(files_in(out.path()).len(), 1);
    }

    #[test]
    fn dry_run_launches_and_writes_nothing() {
        let out = tempfile::tempdir().unwrap();
        let catalog = catalog(2);
        let downloader = FakeDownloader::new(0, 0);
        let state = PipelineState::new(None);
        let options = PipelineOptions {
            download_chat: true,
            dry_run: true,
            ..options(1)
        };

        let summary = run(&catalog, out.path(), &downloader, options, &state).unwrap();

        assert_eq!(summary.items_processed, 2);
        assert_eq!(summary.transfers_launched, 0);
        assert!(downloader.events().is_empty());
        assert!(files_in(out.path()).is_empty());
    }

    #[test]
    fn existing_assets_are_not_downloaded_again() {
        let out = tempfile::tempdir().unwrap();
        let catalog = catalog(1);
        let downloader = FakeDownloader::new(0, 0);
        let state = PipelineState::new(None);
        let layout = Layout::new(out.path());
        std::fs::write(layout.video_path(&catalog, &catalog.items[0]), b"done").unwrap();
        let options = PipelineOptions {
            download_chat: true,
            ..options(1)
        };

        let summary = run(&catalog, out.path(), &downloader, options, &state).unwrap();

        assert_eq!(summary.transfers_launched, 0);
        assert_eq!(downloader.events(), [Event::Chat(1)]);
    }

    #[test]
    fn external_requests_only_write_metadata() {
        let out = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::new(
            vec![item(9, "Shared", 60, 1)],
            vec![
                crate::catalog::tests::group("Main", &[("Shared", 60)]),
                crate::catalog::tests::group("Also", &[("Shared", 60)]),
            ],
        );
        assert!(catalog.resolve().is_empty());
        let downloader = FakeDownloader::new(10, 10);
        let state = PipelineState::new(None);

        let summary = run(&catalog, out.path(), &downloader, options(1), &state).unwrap();

        assert_eq!(summary.transfers_launched, 1);
        assert_eq!(files_in(&out.path().join("Main")).len(), 2);
        let also = files_in(&out.path().join("Also"));
        assert_eq!(also.len(), 1);
        assert!(also[0].to_string_lossy().ends_with("metadata (external).json"));
    }

    #[test]
    fn thumbnail_failure_does_not_abort_the_run() {
        let out = tempfile::tempdir().unwrap();
        let catalog = with_thumbnail_urls(catalog(2));
        let downloader = FakeDownloader::new(10, 10);
        let thumbnails = FakeThumbnails::new(true);
        let state = PipelineState::new(None);
        let layout = Layout::new(out.path());

        let summary = Orchestrator::new(&catalog, &layout, &downloader, options(2), state.clone())
            .with_thumbnails(&thumbnails)
            .run(&Selection::All)
            .unwrap();

        assert_eq!(summary.transfers_launched, 2);
        assert_eq!(thumbnails.fetched.lock().unwrap().len(), 2);
        assert!(!layout.thumbnail_path(&catalog, &catalog.items[0]).exists());
        assert!(layout.video_path(&catalog, &catalog.items[1]).exists());
    }

    #[test]
    fn thumbnails_are_fetched_once() {
        let out = tempfile::tempdir().unwrap();
        let mut catalog = with_thumbnail_urls(catalog(2));
        catalog.items[1].thumbnail_url = None;
        let downloader = FakeDownloader::new(0, 0);
        let thumbnails = FakeThumbnails::new(false);
        let state = PipelineState::new(None);
        let layout = Layout::new(out.path());
        let options = PipelineOptions {
            download_video: false,
            ..options(1)
        };

        for _ in 0..2 {
            Orchestrator::new(&catalog, &layout, &downloader, options.clone(), state.clone())
                .with_thumbnails(&thumbnails)
                .run(&Selection::All)
                .unwrap();
        }

        assert_eq!(*thumbnails.fetched.lock().unwrap(), ["https://img.example/1.jpg"]);
        let thumbnail = layout.thumbnail_path(&catalog, &catalog.items[0]);
        assert_eq!(std::fs::read(thumbnail).unwrap(), b"jpeg");
    }
}
