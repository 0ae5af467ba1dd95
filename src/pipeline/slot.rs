//! One in-flight video download, split in a transfer and a finalize phase.
//!
//! The downloader does not report when it stops fetching data and starts
//! post-processing, so the first bytes landing in the output file are taken as
//! that boundary. This is an approximation: depending on the tool and on the
//! filesystem, the file may grow before the last chunk is fetched.

use std::{
    path::PathBuf,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, info};

use super::state::{FinalizationToken, PipelineState};
use crate::{
    outside::{MediaDownloader, RunningTransfer},
    result::{Error, Result},
};

/// Polling interval while waiting for the output file to appear
const APPEAR_POLL: Duration = Duration::from_millis(10);

/// Polling interval while waiting for the output file to be non-empty
const GROWTH_POLL: Duration = Duration::from_millis(100);

pub struct DownloadSlot {
    id: usize,
    title: String,
    output: PathBuf,
    program: String,
    transfer: Box<dyn RunningTransfer>,
    token: FinalizationToken,
}

/// The orchestrator side of a launched slot
pub struct Handoff {
    transfer_done: Receiver<()>,
    ack: Sender<()>,
    worker: JoinHandle<()>,
}

impl Handoff {
    /// Block until the worker leaves its transfer phase, then let it finalize.
    /// Returns the worker handle, to be joined once the finalization is over.
    ///
    /// Returns early if the worker stopped before reaching the handoff.
    pub fn wait_transfer_done(self) -> JoinHandle<()> {
        if self.transfer_done.recv().is_ok() {
            // The worker is blocked on the other end, this cannot fail
            let _ = self.ack.send(());
        }
        self.worker
    }
}

impl DownloadSlot {
    /// Start the download process and the worker thread following it.
    ///
    /// The process is started from the calling thread so that a launch failure
    /// is reported to the caller directly. Failures happening later are sent to `failures`.
    pub fn launch(
        id: usize,
        downloader: &dyn MediaDownloader,
        video_id: u64,
        title: &str,
        output: PathBuf,
        state: &Arc<PipelineState>,
        failures: Sender<Error>,
    ) -> Result<Handoff> {
        let token = state.begin_finalization();
        let transfer = downloader.start_video(video_id, &output)?;

        let slot = DownloadSlot {
            id,
            title: title.to_owned(),
            output,
            program: downloader.program().to_owned(),
            transfer,
            token,
        };

        // Zero capacity: each send blocks until the other side receives
        let (done_send, done_receive) = bounded(0);
        let (ack_send, ack_receive) = bounded(0);

        let worker = thread::Builder::new()
            .name(format!("slot-{id}"))
            .spawn(move || slot.run(done_send, ack_receive, failures))?;

        Ok(Handoff {
            transfer_done: done_receive,
            ack: ack_send,
            worker,
        })
    }

    fn run(mut self, transfer_done: Sender<()>, ack: Receiver<()>, failures: Sender<Error>) {
        debug!("{}: Waiting for '{}' to be transferred", self.id, self.title);

        let outcome = match self.wait_transfer_phase() {
            Ok(()) => {
                info!("{}: Done downloading '{}', finalizing", self.id, self.title);
                if transfer_done.send(()).is_ok() {
                    let _ = ack.recv();
                }
                drop(transfer_done);
                self.finalize()
            }
            Err(err) => {
                drop(transfer_done);
                Err(err)
            }
        };

        match outcome {
            Ok(()) => info!("{}: Finished '{}'", self.id, self.title),
            Err(err) => {
                error!("{}: Download of '{}' failed", self.id, self.title);
                // Report before the token is released, so the orchestrator
                // sees the failure once the active count reaches zero
                let _ = failures.send(err);
            }
        }

        drop(self.token);
    }

    /// Wait for the output file to exist and be non-empty.
    ///
    /// Stops waiting if the process exits first, its exit status then tells what happened.
    fn wait_transfer_phase(&mut self) -> Result<()> {
        while !self.output.exists() {
            if self.transfer.try_wait()?.is_some() {
                return Ok(());
            }
            thread::sleep(APPEAR_POLL);
        }

        // Query the metadata again each time, never reuse a cached handle
        while std::fs::metadata(&self.output).map_or(true, |m| m.len() == 0) {
            if self.transfer.try_wait()?.is_some() {
                return Ok(());
            }
            thread::sleep(GROWTH_POLL);
        }

        Ok(())
    }

    /// Wait for the process to exit, which is when post-processing is over
    fn finalize(&mut self) -> Result<()> {
        match self.transfer.wait()? {
            Some(0) => Ok(()),
            code => Err(Error::Finalize {
                program: self.program.clone(),
                code,
                what: format!("download the video '{}'", self.title),
            }),
        }
    }
}
