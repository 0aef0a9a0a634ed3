use std::thread;

use serde::Serialize;
use tracing::info;

use crate::assembler::{AssembledArchive, Assembler, NoProgress, ProgressSink, Summary};
use crate::config::ItemRequest;
use crate::delivery::{Delivery, DeliverySink};
use crate::domain::{ItemIdentity, ResourceRequests, RoleFailure};
use crate::error::AdxError;
use crate::fetch::{CancelToken, ResourceFetcher};
use crate::notify::{self, JobStatus, Notification, Notifier};

/// Everything a front end needs to render the end of one job.
#[derive(Debug, Serialize)]
pub struct JobReport {
    pub job_id: u64,
    pub artist: String,
    pub title: String,
    #[serde(flatten)]
    pub status: JobStatus,
    pub summary: Option<Summary>,
    pub delivery: Option<Delivery>,
    pub failures: Vec<RoleFailure>,
    #[serde(skip)]
    pub error: Option<AdxError>,
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        matches!(self.status, JobStatus::Success(_))
    }
}

#[derive(Debug, Serialize)]
pub struct BatchResult {
    pub jobs: Vec<JobReport>,
}

pub struct App<F: ResourceFetcher, S: DeliverySink> {
    assembler: Assembler<F>,
    sink: S,
    notifier: &'static dyn Notifier,
}

impl<F: ResourceFetcher, S: DeliverySink> App<F, S> {
    pub fn new(fetcher: F, sink: S) -> Self {
        Self::with_notifier(fetcher, sink, notify::center())
    }

    pub fn with_notifier(fetcher: F, sink: S, notifier: &'static dyn Notifier) -> Self {
        Self {
            assembler: Assembler::new(fetcher),
            sink,
            notifier,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn download_item(
        &self,
        artist: &str,
        title: &str,
        resources: ResourceRequests,
    ) -> JobReport {
        self.download_item_with(
            ItemIdentity::new(artist, title),
            &resources,
            &NoProgress,
            &CancelToken::new(),
        )
    }

    /// Runs one job to its terminal transition: `loading`, then exactly one of
    /// `success` or `failure`. The sink is only called for a built archive.
    pub fn download_item_with(
        &self,
        item: ItemIdentity,
        resources: &ResourceRequests,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> JobReport {
        let job_id = notify::next_job_id();
        self.notifier.enqueue(Notification {
            job_id,
            status: JobStatus::Loading(format!("Downloading {item}...")),
        });

        let (status, summary, delivery, failures, error) =
            match self.run_job(&item, resources, progress, cancel) {
                Ok((archive, delivery)) => (
                    JobStatus::Success(archive.summary.message()),
                    Some(archive.summary),
                    Some(delivery),
                    archive.failures,
                    None,
                ),
                Err(err) => {
                    let (summary, failures) = match &err {
                        AdxError::NoFilesDownloaded {
                            requested,
                            failures,
                        } => (
                            Some(Summary {
                                succeeded: 0,
                                requested: *requested,
                            }),
                            failures.clone(),
                        ),
                        _ => (None, Vec::new()),
                    };
                    (
                        JobStatus::Failure(format!("Failed to download: {err}")),
                        summary,
                        None,
                        failures,
                        Some(err),
                    )
                }
            };

        self.notifier.enqueue(Notification {
            job_id,
            status: status.clone(),
        });
        JobReport {
            job_id,
            artist: item.artist,
            title: item.title,
            status,
            summary,
            delivery,
            failures,
            error,
        }
    }

    /// Runs independent jobs side by side. Reports keep the input order.
    pub fn download_items(
        &self,
        items: &[ItemRequest],
        progress: &dyn ProgressSink,
    ) -> BatchResult {
        info!(jobs = items.len(), "starting batch");
        let jobs = thread::scope(|scope| {
            let handles: Vec<_> = items
                .iter()
                .map(|request| {
                    scope.spawn(move || {
                        self.download_item_with(
                            request.item.clone(),
                            &request.resources,
                            progress,
                            &CancelToken::new(),
                        )
                    })
                })
                .collect();
            handles
                .into_iter()
                .zip(items)
                .map(|(handle, request)| {
                    handle.join().unwrap_or_else(|_| JobReport {
                        job_id: 0,
                        artist: request.item.artist.clone(),
                        title: request.item.title.clone(),
                        status: JobStatus::Failure(
                            "Failed to download: worker panicked".to_string(),
                        ),
                        summary: None,
                        delivery: None,
                        failures: Vec::new(),
                        error: None,
                    })
                })
                .collect()
        });
        BatchResult { jobs }
    }

    fn run_job(
        &self,
        item: &ItemIdentity,
        resources: &ResourceRequests,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<(AssembledArchive, Delivery), AdxError> {
        let archive = self.assembler.assemble(item, resources, progress, cancel)?;
        let delivery = self.sink.deliver(&archive.blob, &archive.filename())?;
        Ok((archive, delivery))
    }
}
