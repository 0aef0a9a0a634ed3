use std::thread;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::archive::{ArchiveBlob, build_archive};
use crate::domain::{
    ArchiveEntry, FetchFailure, FetchOutcome, ItemIdentity, ResourceRequests, ResourceRole,
    RoleFailure,
};
use crate::error::AdxError;
use crate::fetch::{CancelToken, ResourceFetcher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started { role: ResourceRole, url: String },
    Progress { role: ResourceRole, percent: u8 },
    Completed { role: ResourceRole, bytes: usize },
    Failed { role: ResourceRole, reason: FetchFailure },
}

impl ProgressEvent {
    pub fn role(&self) -> ResourceRole {
        match self {
            ProgressEvent::Started { role, .. }
            | ProgressEvent::Progress { role, .. }
            | ProgressEvent::Completed { role, .. }
            | ProgressEvent::Failed { role, .. } => *role,
        }
    }
}

/// Per-resource progress observer. Called from fetch threads, possibly for
/// several items at once when a batch is running.
pub trait ProgressSink: Sync {
    fn event(&self, item: &ItemIdentity, event: ProgressEvent);
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn event(&self, _item: &ItemIdentity, _event: ProgressEvent) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub succeeded: usize,
    pub requested: usize,
}

impl Summary {
    pub fn is_partial(&self) -> bool {
        self.succeeded < self.requested
    }

    pub fn message(&self) -> String {
        format!("Downloaded {}/{} files", self.succeeded, self.requested)
    }
}

#[derive(Debug, Clone)]
pub struct AssembledArchive {
    pub item: ItemIdentity,
    pub blob: ArchiveBlob,
    pub summary: Summary,
    pub failures: Vec<RoleFailure>,
}

impl AssembledArchive {
    pub fn filename(&self) -> String {
        self.item.archive_filename()
    }
}

/// State of one invocation. Only the collecting thread mutates it.
#[derive(Debug)]
pub struct ArchiveJob {
    item: ItemIdentity,
    requested: usize,
    entries: Vec<(ResourceRole, ArchiveEntry)>,
    failures: Vec<RoleFailure>,
}

impl ArchiveJob {
    pub fn new(item: ItemIdentity, requested: usize) -> Self {
        Self {
            item,
            requested,
            entries: Vec::with_capacity(requested),
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, role: ResourceRole, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Bytes { payload, extension } => {
                let name = role.entry_name(&extension);
                self.entries.push((role, ArchiveEntry { name, payload }));
            }
            FetchOutcome::Failed(reason) => self.failures.push(RoleFailure { role, reason }),
        }
    }

    pub fn completed(&self) -> usize {
        self.entries.len() + self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.completed() == self.requested
    }

    /// Terminal transition: either an archive or a total failure.
    pub fn finish(mut self) -> Result<AssembledArchive, AdxError> {
        debug_assert!(self.is_complete());
        self.failures.sort_by_key(|failure| failure.role);
        if self.entries.is_empty() {
            return Err(AdxError::NoFilesDownloaded {
                requested: self.requested,
                failures: self.failures,
            });
        }

        self.entries.sort_by_key(|(role, _)| *role);
        let mut taken: Vec<String> = Vec::with_capacity(self.entries.len());
        for (role, entry) in &mut self.entries {
            // A derived name may shadow a fixed one (an `.mp4` jacket next to the video).
            if taken.contains(&entry.name) {
                let fallback = role.entry_name("");
                warn!(%role, name = %entry.name, %fallback, "entry name already taken");
                entry.name = fallback;
            }
            taken.push(entry.name.clone());
        }
        let entries: Vec<ArchiveEntry> = self.entries.into_iter().map(|(_, entry)| entry).collect();
        let blob = build_archive(&entries)?;

        Ok(AssembledArchive {
            item: self.item,
            blob,
            summary: Summary {
                succeeded: entries.len(),
                requested: self.requested,
            },
            failures: self.failures,
        })
    }
}

#[derive(Clone)]
pub struct Assembler<F: ResourceFetcher> {
    fetcher: F,
}

impl<F: ResourceFetcher> Assembler<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn assemble(
        &self,
        item: &ItemIdentity,
        requests: &ResourceRequests,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<AssembledArchive, AdxError> {
        let present = requests.present();
        if present.is_empty() {
            return Err(AdxError::NoResources);
        }
        info!(item = %item, requested = present.len(), "assembling archive");

        let mut job = ArchiveJob::new(item.clone(), present.len());
        let outcomes = thread::scope(|scope| {
            let handles: Vec<_> = present
                .iter()
                .map(|&(role, url)| {
                    let handle = scope.spawn(move || self.fetch_one(item, role, url, sink, cancel));
                    (role, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(role, handle)| {
                    let outcome = handle.join().unwrap_or_else(|_| {
                        FetchOutcome::Failed(FetchFailure::Transport(
                            "fetch worker panicked".to_string(),
                        ))
                    });
                    (role, outcome)
                })
                .collect::<Vec<_>>()
        });
        for (role, outcome) in outcomes {
            job.record(role, outcome);
        }

        if cancel.is_cancelled() {
            warn!(item = %item, "archive job cancelled");
            return Err(AdxError::Cancelled);
        }

        let result = job.finish();
        match &result {
            Ok(archive) => info!(
                item = %item,
                succeeded = archive.summary.succeeded,
                requested = archive.summary.requested,
                bytes = archive.blob.len(),
                "archive assembled"
            ),
            Err(err) => warn!(item = %item, error = %err, "archive job failed"),
        }
        result
    }

    fn fetch_one(
        &self,
        item: &ItemIdentity,
        role: ResourceRole,
        url: &str,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> FetchOutcome {
        sink.event(
            item,
            ProgressEvent::Started {
                role,
                url: url.to_string(),
            },
        );
        let progress = |percent: u8| sink.event(item, ProgressEvent::Progress { role, percent });
        let outcome = self.fetcher.fetch(url, &progress, cancel);
        match &outcome {
            FetchOutcome::Bytes { payload, .. } => {
                debug!(%item, %role, bytes = payload.len(), "resource ready");
                sink.event(
                    item,
                    ProgressEvent::Completed {
                        role,
                        bytes: payload.len(),
                    },
                );
            }
            FetchOutcome::Failed(reason) => {
                warn!(%item, %role, url, reason = %reason, "resource failed");
                sink.event(
                    item,
                    ProgressEvent::Failed {
                        role,
                        reason: reason.clone(),
                    },
                );
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn bytes(payload: &[u8], extension: &str) -> FetchOutcome {
        FetchOutcome::Bytes {
            payload: payload.to_vec(),
            extension: extension.to_string(),
        }
    }

    #[test]
    fn job_orders_entries_by_role() {
        let mut job = ArchiveJob::new(ItemIdentity::new("a", "t"), 3);
        job.record(ResourceRole::Data, bytes(b"chart", "txt"));
        job.record(ResourceRole::Audio, FetchOutcome::Failed(FetchFailure::Status(404)));
        job.record(ResourceRole::Image, bytes(b"img", "png"));
        assert!(job.is_complete());

        let archive = job.finish().unwrap();
        assert_eq!(archive.blob.entry_names(), ["bg.png", "maidata.txt"]);
        assert_eq!(
            archive.summary,
            Summary {
                succeeded: 2,
                requested: 3
            }
        );
        assert_eq!(archive.failures[0].role, ResourceRole::Audio);
    }

    #[test]
    fn job_without_entries_is_total_failure() {
        let mut job = ArchiveJob::new(ItemIdentity::new("a", "t"), 1);
        job.record(ResourceRole::Video, FetchOutcome::Failed(FetchFailure::TimedOut));
        let err = job.finish().unwrap_err();
        assert_eq!(err.to_string(), "no files were downloaded");
        assert_matches!(err, AdxError::NoFilesDownloaded { requested: 1, failures } => {
            assert_eq!(failures[0].role, ResourceRole::Video);
            assert_eq!(failures[0].reason, FetchFailure::TimedOut);
        });
    }

    #[test]
    fn colliding_names_fall_back_to_defaults() {
        let mut job = ArchiveJob::new(ItemIdentity::new("a", "t"), 2);
        job.record(ResourceRole::Image, bytes(b"jacket", "mp4"));
        job.record(ResourceRole::Video, bytes(b"video", "mp4"));

        let archive = job.finish().unwrap();
        assert_eq!(archive.blob.entry_names(), ["bg.mp4", "bg.jpg"]);
        assert_eq!(archive.summary.succeeded, 2);
    }

    #[test]
    fn summary_message() {
        let summary = Summary {
            succeeded: 1,
            requested: 2,
        };
        assert!(summary.is_partial());
        assert_eq!(summary.message(), "Downloaded 1/2 files");
    }
}
