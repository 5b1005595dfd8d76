//! Transcription service port and polling.
//!
//! Transcription runs out-of-process: the pipeline submits a job for an audio
//! object and polls until a transcript document appears or the job fails. The
//! [`TranscriptionService`] trait is the seam; [`StoreTranscription`] adapts a
//! deployment where an external worker watches the store's `transcript/`
//! prefix and drops finished documents there.

use crate::foundation::error::{ReelError, ReelResult};
use crate::store::{self, ObjectStore};
use std::time::{Duration, Instant};

/// Opaque transcription job handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobId(pub String);

/// Observed state of a transcription job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    /// Job is still running.
    Pending,
    /// Job finished; the value is the store key of the transcript document.
    Completed(String),
    /// Job failed with the given reason.
    Failed(String),
}

/// Asynchronous speech-to-text seam.
pub trait TranscriptionService {
    /// Submit a job for the audio object at `media_key`, in `language`
    /// (BCP-47, e.g. `en-US`).
    fn submit(&self, media_key: &str, language: &str) -> ReelResult<JobId>;

    /// Check a previously submitted job.
    fn poll(&self, job: &JobId) -> ReelResult<JobStatus>;
}

/// Polling cadence and deadline for [`wait_for_transcript`].
#[derive(Clone, Copy, Debug)]
pub struct PollOpts {
    /// Delay between status checks.
    pub interval: Duration,
    /// Give up after this much wall-clock time.
    pub timeout: Duration,
}

impl Default for PollOpts {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Poll `job` until it completes, fails, or the deadline expires. Returns the
/// transcript's store key on success.
pub fn wait_for_transcript(
    service: &dyn TranscriptionService,
    job: &JobId,
    opts: PollOpts,
) -> ReelResult<String> {
    let deadline = Instant::now() + opts.timeout;
    loop {
        match service.poll(job)? {
            JobStatus::Completed(key) => return Ok(key),
            JobStatus::Failed(reason) => {
                return Err(ReelError::transcription(format!(
                    "job '{}' failed: {reason}",
                    job.0
                )));
            }
            JobStatus::Pending => {}
        }
        if Instant::now() >= deadline {
            return Err(ReelError::transcription(format!(
                "job '{}' did not finish within {:?}",
                job.0, opts.timeout
            )));
        }
        std::thread::sleep(opts.interval);
    }
}

/// [`TranscriptionService`] over an [`ObjectStore`]: submission names the
/// expected transcript key `transcript/<stem>.json`, and polling checks
/// whether that key has appeared under the `transcript/` prefix.
pub struct StoreTranscription<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> StoreTranscription<'a> {
    /// Wrap `store`.
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }
}

impl TranscriptionService for StoreTranscription<'_> {
    fn submit(&self, media_key: &str, _language: &str) -> ReelResult<JobId> {
        let stem = store::key_stem(media_key);
        if stem.is_empty() {
            return Err(ReelError::transcription(format!(
                "cannot derive a job name from media key '{media_key}'"
            )));
        }
        Ok(JobId(format!("{}/{stem}.json", store::prefix::TRANSCRIPT)))
    }

    fn poll(&self, job: &JobId) -> ReelResult<JobStatus> {
        let keys = self.store.list(store::prefix::TRANSCRIPT)?;
        if keys.iter().any(|k| k == &job.0) {
            Ok(JobStatus::Completed(job.0.clone()))
        } else {
            Ok(JobStatus::Pending)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct ScriptedService {
        pending_polls: Cell<u32>,
        outcome: JobStatus,
    }

    impl TranscriptionService for ScriptedService {
        fn submit(&self, media_key: &str, _language: &str) -> ReelResult<JobId> {
            Ok(JobId(media_key.to_owned()))
        }

        fn poll(&self, _job: &JobId) -> ReelResult<JobStatus> {
            if self.pending_polls.get() > 0 {
                self.pending_polls.set(self.pending_polls.get() - 1);
                Ok(JobStatus::Pending)
            } else {
                Ok(self.outcome.clone())
            }
        }
    }

    fn fast_opts() -> PollOpts {
        PollOpts {
            interval: Duration::from_millis(1),
            timeout: Duration::from_millis(250),
        }
    }

    #[test]
    fn waits_through_pending_to_completion() {
        let svc = ScriptedService {
            pending_polls: Cell::new(3),
            outcome: JobStatus::Completed("transcript/a.json".to_owned()),
        };
        let job = svc.submit("voices/a.wav", "en-US").unwrap();
        let key = wait_for_transcript(&svc, &job, fast_opts()).unwrap();
        assert_eq!(key, "transcript/a.json");
    }

    #[test]
    fn failed_jobs_surface_the_reason() {
        let svc = ScriptedService {
            pending_polls: Cell::new(0),
            outcome: JobStatus::Failed("no speech".to_owned()),
        };
        let job = JobId("j".to_owned());
        let err = wait_for_transcript(&svc, &job, fast_opts()).unwrap_err();
        assert!(err.to_string().contains("no speech"));
    }

    #[test]
    fn deadline_expiry_is_a_transcription_error() {
        let svc = ScriptedService {
            pending_polls: Cell::new(u32::MAX),
            outcome: JobStatus::Pending,
        };
        let job = JobId("j".to_owned());
        let err = wait_for_transcript(&svc, &job, fast_opts()).unwrap_err();
        assert!(err.to_string().contains("did not finish"));
    }

    #[test]
    fn store_transcription_names_jobs_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::store::FsObjectStore::new(dir.path()).unwrap();
        let svc = StoreTranscription::new(&store);

        let job = svc.submit("voices/clip_a.wav", "en-US").unwrap();
        assert_eq!(job.0, "transcript/clip_a.json");
        assert_eq!(svc.poll(&job).unwrap(), JobStatus::Pending);

        let doc = dir.path().join("doc.json");
        std::fs::write(&doc, b"{}").unwrap();
        store.put(&doc, "transcript/clip_a.json").unwrap();
        assert_eq!(
            svc.poll(&job).unwrap(),
            JobStatus::Completed("transcript/clip_a.json".to_owned())
        );
    }
}
