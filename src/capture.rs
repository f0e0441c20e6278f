//! Capture-and-verify workflow for marking a habit done.
//!
//! ```text
//! Idle -> Captured -> Verifying -> Accepted | Rejected | Errored
//!            |
//!            +-> (discard) Idle
//! ```
//!
//! A positive verdict records a completion for the habit dated on the local
//! day the verdict arrived. Terminal states are shown to the user and the
//! workflow is then dropped; nothing is retried.

use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::calendar;
use crate::db::{Habit, HabitStore};
use crate::error::{Error, ErrorKind, Result};
use crate::llm::{VerificationGateway, Verdict};

/// Source of photos for the workflow.
pub trait Camera {
    fn take_picture(&mut self) -> anyhow::Result<PathBuf>;
}

/// A "camera" that hands back a photo already on disk.
pub struct ExistingPhoto {
    path: PathBuf,
}

impl ExistingPhoto {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Camera for ExistingPhoto {
    fn take_picture(&mut self) -> anyhow::Result<PathBuf> {
        if !self.path.is_file() {
            anyhow::bail!("no photo at {}", self.path.display());
        }
        Ok(self.path.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Captured {
        photo: PathBuf,
    },
    Verifying {
        photo: PathBuf,
    },
    Accepted {
        photo: PathBuf,
        verdict: Verdict,
        completion_id: i64,
    },
    Rejected {
        photo: PathBuf,
        verdict: Verdict,
    },
    Errored {
        kind: ErrorKind,
        message: String,
    },
}

impl CaptureState {
    pub fn name(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::Captured { .. } => "captured",
            CaptureState::Verifying { .. } => "verifying",
            CaptureState::Accepted { .. } => "accepted",
            CaptureState::Rejected { .. } => "rejected",
            CaptureState::Errored { .. } => "errored",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CaptureState::Accepted { .. } | CaptureState::Rejected { .. } | CaptureState::Errored { .. }
        )
    }

    /// Verdict of a finished verification, if one arrived.
    pub fn verdict(&self) -> Option<&Verdict> {
        match self {
            CaptureState::Accepted { verdict, .. } | CaptureState::Rejected { verdict, .. } => {
                Some(verdict)
            }
            _ => None,
        }
    }
}

/// One capture-verify attempt for one habit.
pub struct CaptureWorkflow {
    habit: Habit,
    state: CaptureState,
}

impl CaptureWorkflow {
    pub fn new(habit: Habit) -> Self {
        Self {
            habit,
            state: CaptureState::Idle,
        }
    }

    pub fn habit(&self) -> &Habit {
        &self.habit
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    /// What the photo is expected to show: the scan method, or the habit
    /// name when none was given.
    pub fn activity_description(&self) -> &str {
        let scan = self.habit.scan_method.trim();
        if scan.is_empty() {
            self.habit.name.trim()
        } else {
            scan
        }
    }

    fn invalid(&self, action: &'static str) -> Error {
        Error::InvalidTransition {
            state: self.state.name(),
            action,
        }
    }

    /// Take a photo. A failed capture leaves the workflow idle.
    pub fn capture(&mut self, camera: &mut dyn Camera) -> Result<()> {
        if self.state != CaptureState::Idle {
            return Err(self.invalid("capture"));
        }
        let photo = camera.take_picture().map_err(|e| {
            warn!(habit_id = self.habit.id, error = %e, "Photo capture failed");
            Error::ImageProcessing(format!("capture failed: {:#}", e))
        })?;
        info!(habit_id = self.habit.id, photo = %photo.display(), "Photo captured");
        self.state = CaptureState::Captured { photo };
        Ok(())
    }

    /// Drop the captured photo and return to idle. Returns the discarded path.
    pub fn discard(&mut self) -> Result<PathBuf> {
        match std::mem::replace(&mut self.state, CaptureState::Idle) {
            CaptureState::Captured { photo } => Ok(photo),
            other => {
                self.state = other;
                Err(self.invalid("discard"))
            }
        }
    }

    /// Move `Captured -> Verifying` and return the photo to send.
    ///
    /// Fails while a verification is already in flight.
    pub fn begin_verification(&mut self) -> Result<PathBuf> {
        match &self.state {
            CaptureState::Captured { photo } => {
                let photo = photo.clone();
                self.state = CaptureState::Verifying {
                    photo: photo.clone(),
                };
                Ok(photo)
            }
            _ => Err(self.invalid("submit")),
        }
    }

    /// Apply the gateway outcome of an in-flight verification. A positive
    /// verdict records a completion dated `date`.
    pub fn complete_verification(
        &mut self,
        outcome: Result<Verdict>,
        store: &HabitStore,
        date: NaiveDate,
    ) -> Result<&CaptureState> {
        let photo = match &self.state {
            CaptureState::Verifying { photo } => photo.clone(),
            _ => return Err(self.invalid("complete verification")),
        };

        self.state = match outcome {
            Ok(verdict) if verdict.verified => {
                let image_uri = photo.to_string_lossy().into_owned();
                match store.record_completion(
                    self.habit.id,
                    date,
                    Some(image_uri.as_str()),
                    Some(verdict.confidence),
                ) {
                    Ok(completion_id) => {
                        info!(
                            habit_id = self.habit.id,
                            completion_id,
                            confidence = verdict.confidence,
                            "Habit verified"
                        );
                        CaptureState::Accepted {
                            photo,
                            verdict,
                            completion_id,
                        }
                    }
                    Err(e) => {
                        warn!(habit_id = self.habit.id, error = %e, "Failed to record completion");
                        CaptureState::Errored {
                            kind: e.kind(),
                            message: e.to_string(),
                        }
                    }
                }
            }
            Ok(verdict) => {
                info!(
                    habit_id = self.habit.id,
                    confidence = verdict.confidence,
                    "Habit verification rejected"
                );
                CaptureState::Rejected { photo, verdict }
            }
            Err(e) => {
                warn!(habit_id = self.habit.id, error = %e, "Habit verification failed");
                CaptureState::Errored {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        };

        Ok(&self.state)
    }

    /// Submit the captured photo to the gateway and apply the result.
    ///
    /// The gateway call runs on the blocking pool. If this future is dropped
    /// mid-call the workflow stays `Verifying` and the result is lost.
    pub async fn submit(
        &mut self,
        gateway: Arc<VerificationGateway>,
        store: &HabitStore,
    ) -> Result<&CaptureState> {
        let photo = self.begin_verification()?;
        let activity = self.activity_description().to_string();

        let outcome = tokio::task::spawn_blocking(move || gateway.verify(&photo, &activity))
            .await
            .unwrap_or_else(|e| {
                Err(Error::VerificationService(format!(
                    "verification task failed: {}",
                    e
                )))
            });

        self.complete_verification(outcome, store, calendar::today())
    }

    /// Hand back the final state once the user has seen it.
    pub fn acknowledge(self) -> Result<CaptureState> {
        if self.state.is_terminal() {
            Ok(self.state)
        } else {
            Err(self.invalid("acknowledge"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{Aggregator, HabitStatus};
    use crate::db::{Frequency, NewHabit};
    use crate::test_support::{write_photo, StubJudge, KEY};
    use tempfile::tempdir;

    struct BrokenCamera;

    impl Camera for BrokenCamera {
        fn take_picture(&mut self) -> anyhow::Result<PathBuf> {
            anyhow::bail!("camera not ready")
        }
    }

    fn setup() -> (HabitStore, Habit) {
        let store = HabitStore::open_in_memory().unwrap();
        store.initialize().unwrap();
        let id = store
            .create_habit(
                &NewHabit::new("Reading", Frequency::Daily).with_scan_method("reading a book"),
            )
            .unwrap();
        let habit = store.get_habit(id).unwrap().unwrap();
        (store, habit)
    }

    fn gateway(judge: Arc<StubJudge>) -> Arc<VerificationGateway> {
        let gateway = VerificationGateway::new(judge);
        gateway.reconfigure(Some(KEY.to_string()));
        Arc::new(gateway)
    }

    #[tokio::test]
    async fn test_positive_verdict_records_completion() {
        let (store, habit) = setup();
        let dir = tempdir().unwrap();
        let photo = write_photo(dir.path());
        let judge = StubJudge::replying("YES\nConfidence: 91%\nAn open book on a desk.");

        let mut workflow = CaptureWorkflow::new(habit.clone());
        workflow.capture(&mut ExistingPhoto::new(&photo)).unwrap();
        let state = workflow.submit(gateway(judge.clone()), &store).await.unwrap();

        let completion_id = match state {
            CaptureState::Accepted {
                verdict,
                completion_id,
                ..
            } => {
                assert_eq!(verdict.confidence, 91);
                *completion_id
            }
            other => panic!("unexpected state {:?}", other),
        };
        assert_eq!(judge.calls(), 1);
        assert!(judge.last_prompt().unwrap().contains("reading a book"));

        let rows = store.completions_for(habit.id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, completion_id);
        assert_eq!(rows[0].date, calendar::today());
        assert_eq!(rows[0].confidence, Some(91));
        assert_eq!(rows[0].image_uri.as_deref(), Some(photo.to_string_lossy().as_ref()));
        assert_eq!(
            Aggregator::new(&store).status_today(&habit).unwrap(),
            HabitStatus::Done
        );

        let final_state = workflow.acknowledge().unwrap();
        assert_eq!(final_state.name(), "accepted");
    }

    #[tokio::test]
    async fn test_negative_verdict_records_nothing() {
        let (store, habit) = setup();
        let dir = tempdir().unwrap();
        let photo = write_photo(dir.path());

        let mut workflow = CaptureWorkflow::new(habit.clone());
        workflow.capture(&mut ExistingPhoto::new(&photo)).unwrap();
        let state = workflow
            .submit(gateway(StubJudge::replying("NO\nConfidence: 42%\nNo book visible.")), &store)
            .await
            .unwrap();

        assert_eq!(state.name(), "rejected");
        assert_eq!(state.verdict().unwrap().confidence, 42);
        assert!(store.completions_for(habit.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_failure_is_errored() {
        let (store, habit) = setup();
        let dir = tempdir().unwrap();
        let photo = write_photo(dir.path());

        let mut workflow = CaptureWorkflow::new(habit.clone());
        workflow.capture(&mut ExistingPhoto::new(&photo)).unwrap();
        let state = workflow
            .submit(gateway(StubJudge::failing("503 Service Unavailable")), &store)
            .await
            .unwrap();

        match state {
            CaptureState::Errored { kind, message } => {
                assert_eq!(*kind, ErrorKind::VerificationService);
                assert!(message.contains("503"));
            }
            other => panic!("unexpected state {:?}", other),
        }
        assert!(store.completions_for(habit.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_credential_is_distinguishable() {
        let (store, habit) = setup();
        let dir = tempdir().unwrap();
        let photo = write_photo(dir.path());
        let judge = StubJudge::replying("YES 99%");

        let mut workflow = CaptureWorkflow::new(habit);
        workflow.capture(&mut ExistingPhoto::new(&photo)).unwrap();
        let state = workflow
            .submit(Arc::new(VerificationGateway::new(judge.clone())), &store)
            .await
            .unwrap();

        assert!(matches!(
            state,
            CaptureState::Errored {
                kind: ErrorKind::CredentialMissing,
                ..
            }
        ));
        assert_eq!(judge.calls(), 0);
    }

    #[tokio::test]
    async fn test_second_submit_while_verifying_is_rejected() {
        let (store, habit) = setup();
        let dir = tempdir().unwrap();
        let photo = write_photo(dir.path());
        let judge = StubJudge::replying("YES 99%");

        let mut workflow = CaptureWorkflow::new(habit);
        workflow.capture(&mut ExistingPhoto::new(&photo)).unwrap();
        workflow.begin_verification().unwrap();

        let err = workflow.submit(gateway(judge.clone()), &store).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(judge.calls(), 0);
        assert_eq!(workflow.state().name(), "verifying");
    }

    #[test]
    fn test_submit_requires_a_photo() {
        let (_store, habit) = setup();
        let mut workflow = CaptureWorkflow::new(habit);
        let err = workflow.begin_verification().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(workflow.state(), &CaptureState::Idle);
    }

    #[test]
    fn test_failed_capture_stays_idle() {
        let (_store, habit) = setup();
        let mut workflow = CaptureWorkflow::new(habit);

        let err = workflow.capture(&mut BrokenCamera).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ImageProcessing);
        assert_eq!(workflow.state(), &CaptureState::Idle);

        let err = workflow
            .capture(&mut ExistingPhoto::new("/nonexistent/photo.jpg"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ImageProcessing);
        assert_eq!(workflow.state(), &CaptureState::Idle);
    }

    #[test]
    fn test_discard_returns_to_idle() {
        let (_store, habit) = setup();
        let dir = tempdir().unwrap();
        let photo = write_photo(dir.path());

        let mut workflow = CaptureWorkflow::new(habit);
        assert_eq!(workflow.discard().unwrap_err().kind(), ErrorKind::InvalidTransition);

        workflow.capture(&mut ExistingPhoto::new(&photo)).unwrap();
        assert_eq!(workflow.discard().unwrap(), photo);
        assert_eq!(workflow.state(), &CaptureState::Idle);

        // A fresh capture is allowed after discarding.
        workflow.capture(&mut ExistingPhoto::new(&photo)).unwrap();
        assert_eq!(workflow.state().name(), "captured");
    }

    #[test]
    fn test_acknowledge_requires_terminal_state() {
        let (_store, habit) = setup();
        let err = CaptureWorkflow::new(habit).acknowledge().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }

    #[test]
    fn test_store_failure_after_positive_verdict() {
        let (store, habit) = setup();
        let dir = tempdir().unwrap();
        let photo = write_photo(dir.path());

        let mut workflow = CaptureWorkflow::new(habit.clone());
        workflow.capture(&mut ExistingPhoto::new(&photo)).unwrap();
        workflow.begin_verification().unwrap();
        store.delete_habit(habit.id).unwrap();

        let verdict = Verdict {
            verified: true,
            confidence: 80,
            explanation: "YES 80%".to_string(),
        };
        let state = workflow
            .complete_verification(Ok(verdict), &store, calendar::today())
            .unwrap();
        assert!(matches!(
            state,
            CaptureState::Errored {
                kind: ErrorKind::NotFound,
                ..
            }
        ));
    }

    #[test]
    fn test_activity_description_falls_back_to_name() {
        let habit = Habit {
            id: 1,
            name: "Meditation".to_string(),
            icon: "leaf-outline".to_string(),
            color: "#16a085".to_string(),
            frequency: Frequency::Daily,
            scan_method: "  ".to_string(),
        };
        assert_eq!(CaptureWorkflow::new(habit).activity_description(), "Meditation");
    }
}
