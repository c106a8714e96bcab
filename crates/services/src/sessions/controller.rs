use std::fmt;
use std::future::Future;
use std::sync::Arc;

use exam_core::model::{QuestionId, SessionState, TestId, TestMetadata, User, WorkBook};
use exam_core::Clock;
use storage::repository::Storage;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::answers::AnswerCollector;
use super::countdown::{CountdownTimer, TimerEvent};
use super::playback::{PlayOutcome, PlaybackController, PlaybackEvent};
use super::sequencer::WorkbookSequencer;
use super::snapshot::{SessionNotice, SessionSnapshot};
use crate::audio::AudioProvider;
use crate::config::{SavePolicy, SessionConfig};
use crate::error::SessionError;
use crate::ticks::TickSource;

const COMMAND_BUFFER: usize = 16;

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// Where a submit left the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitProgress {
    /// Moved on to the workbook at `index`.
    Advanced { index: usize },
    /// That was the last workbook.
    Completed,
    /// Time ran out while the submit was in flight.
    TimedOut,
    /// The save failed and the answers were kept on the current workbook.
    Retained,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    Saved,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub progress: SubmitProgress,
    pub save: SaveStatus,
}

//
// ─── SETUP ─────────────────────────────────────────────────────────────────────
//

/// Everything a session needs, resolved by the launcher.
pub struct SessionParts {
    pub user: User,
    pub test: TestMetadata,
    pub workbooks: Vec<WorkBook>,
    pub storage: Storage,
    pub audio: Arc<dyn AudioProvider>,
    pub ticks: Arc<dyn TickSource>,
    pub clock: Clock,
    pub config: SessionConfig,
}

enum Command {
    PlayAudio {
        reply: oneshot::Sender<Result<PlayOutcome, SessionError>>,
    },
    OpenQuestions {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    SelectOption {
        question: QuestionId,
        option: usize,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Submit {
        reply: oneshot::Sender<Result<SubmitOutcome, SessionError>>,
    },
    Exit {
        reply: oneshot::Sender<SessionState>,
    },
}

//
// ─── HANDLE ────────────────────────────────────────────────────────────────────
//

/// Handle to a running test session.
///
/// The session itself lives on its own task and owns the timer, the current
/// workbook, its answers and its audio. Every operation goes through that
/// task, so timer expiry and user actions are applied one at a time. When the
/// timer fires while a submit is saving, the session ends as timed out and
/// the submit reports [`SubmitProgress::TimedOut`].
///
/// Dropping every handle exits the session.
#[derive(Clone)]
pub struct SessionController {
    test_id: TestId,
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl SessionController {
    /// Start the countdown and the session task.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Sequencer` when there are no workbooks and
    /// `SessionError::Timer` when the test has no duration.
    pub fn spawn(parts: SessionParts) -> Result<Self, SessionError> {
        let SessionParts {
            user,
            test,
            workbooks,
            storage,
            audio,
            ticks,
            clock,
            config,
        } = parts;

        let sequencer = WorkbookSequencer::new(workbooks)?;
        let timer = CountdownTimer::start(
            test.duration_seconds(),
            config.tick_period,
            ticks.as_ref(),
        )?;
        let collector = AnswerCollector::for_workbook(sequencer.current());
        let (playback_tx, playback_rx) = mpsc::unbounded_channel();
        let playback = PlaybackController::new(
            sequencer.current().audio().clone(),
            1,
            playback_tx.clone(),
            Arc::clone(&ticks),
            config.tick_period,
            config.audio_reset_pause,
        );

        let (snapshots_tx, snapshots) = watch::channel(SessionSnapshot {
            test_id: test.id(),
            state: SessionState::Running,
            total_seconds: timer.total_seconds(),
            remaining_seconds: timer.remaining_seconds(),
            workbook_index: sequencer.current_index(),
            workbook_count: sequencer.len(),
            workbook_id: sequencer.current().id(),
            is_last_workbook: sequencer.is_last(),
            playback: Some(playback.snapshot()),
            answered: 0,
            notice: None,
        });
        let (commands, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let test_id = test.id();

        info!(
            test = %test_id,
            user = %user.id,
            workbooks = sequencer.len(),
            seconds = timer.total_seconds(),
            "session started"
        );

        let actor = SessionActor {
            user,
            test,
            state: SessionState::Running,
            timer,
            sequencer,
            collector,
            playback: Some(playback),
            playback_epoch: 1,
            playback_tx,
            playback_rx,
            storage,
            audio,
            ticks,
            clock,
            config,
            snapshots: snapshots_tx,
            notice: None,
            completion_recorded: false,
        };
        tokio::spawn(actor.run(commands_rx));

        Ok(Self {
            test_id,
            commands,
            snapshots,
        })
    }

    #[must_use]
    pub fn test_id(&self) -> TestId {
        self.test_id
    }

    /// Latest published state.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that sees every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Resolves with the first terminal snapshot.
    pub async fn wait_until_terminal(&self) -> SessionSnapshot {
        let mut rx = self.snapshots.clone();
        let terminal = rx.wait_for(SessionSnapshot::is_terminal).await.map(|s| s.clone());
        terminal.unwrap_or_else(|_| rx.borrow().clone())
    }

    /// Play the current workbook's audio.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotRunning` after the session ended and
    /// `SessionError::Playback` when the resource cannot be opened, in which
    /// case no repeat is consumed.
    pub async fn play_audio(&self) -> Result<PlayOutcome, SessionError> {
        self.request(|reply| Command::PlayAudio { reply }).await?
    }

    /// Switch to the questions. Any playing audio stops.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotRunning` after the session ended.
    pub async fn open_questions(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::OpenQuestions { reply }).await?
    }

    /// # Errors
    ///
    /// Returns `SessionError::Answer` for an unknown question or option.
    pub async fn select_option(&self, question: QuestionId, option: usize) -> Result<(), SessionError> {
        self.request(|reply| Command::SelectOption {
            question,
            option,
            reply,
        })
        .await?
    }

    /// Submit the current workbook.
    ///
    /// A failed save is reported in [`SubmitOutcome::save`], not as an error.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotRunning` after the session ended.
    pub async fn submit(&self) -> Result<SubmitOutcome, SessionError> {
        self.request(|reply| Command::Submit { reply }).await?
    }

    /// Leave the test without completing it. Returns the final state; a
    /// session that already ended keeps its state.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ControllerGone` if the session task is gone.
    pub async fn exit(&self) -> Result<SessionState, SessionError> {
        self.request(|reply| Command::Exit { reply }).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SessionError::ControllerGone)?;
        response.await.map_err(|_| SessionError::ControllerGone)
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("test_id", &self.test_id)
            .finish_non_exhaustive()
    }
}

//
// ─── ACTOR ─────────────────────────────────────────────────────────────────────
//

struct SessionActor {
    user: User,
    test: TestMetadata,
    state: SessionState,
    timer: CountdownTimer,
    sequencer: WorkbookSequencer,
    collector: AnswerCollector,
    playback: Option<PlaybackController>,
    playback_epoch: u64,
    playback_tx: mpsc::UnboundedSender<PlaybackEvent>,
    playback_rx: mpsc::UnboundedReceiver<PlaybackEvent>,
    storage: Storage,
    audio: Arc<dyn AudioProvider>,
    ticks: Arc<dyn TickSource>,
    clock: Clock,
    config: SessionConfig,
    snapshots: watch::Sender<SessionSnapshot>,
    notice: Option<SessionNotice>,
    completion_recorded: bool,
}

impl SessionActor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                biased;
                Some(event) = self.timer.next_event(), if self.timer.is_active() => {
                    self.on_timer(event).await;
                }
                Some(event) = self.playback_rx.recv() => {
                    if let Some(playback) = self.playback.as_mut() {
                        playback.apply(event);
                    }
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => {
                        if !self.state.is_terminal() {
                            debug!(test = %self.test.id(), "all handles dropped");
                            self.finish(SessionState::Exited).await;
                        }
                        return;
                    }
                },
            }
            self.publish();
        }
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::PlayAudio { reply } => {
                let result = self.play_audio().await;
                let _ = reply.send(result);
            }
            Command::OpenQuestions { reply } => {
                let result = self.open_questions().await;
                let _ = reply.send(result);
            }
            Command::SelectOption {
                question,
                option,
                reply,
            } => {
                let result = self.select_option(question, option);
                let _ = reply.send(result);
            }
            Command::Submit { reply } => {
                let result = self.submit().await;
                let _ = reply.send(result);
            }
            Command::Exit { reply } => {
                if !self.state.is_terminal() {
                    self.finish(SessionState::Exited).await;
                }
                let _ = reply.send(self.state);
            }
        }
    }

    fn ensure_running(&self) -> Result<(), SessionError> {
        if self.state == SessionState::Running {
            Ok(())
        } else {
            Err(SessionError::NotRunning(self.state))
        }
    }

    /// Drive `work` to completion while still serving the countdown.
    ///
    /// Returns the output and whether the session timed out meanwhile.
    async fn preemptible<F: Future>(&mut self, work: F) -> (F::Output, bool) {
        tokio::pin!(work);
        let mut timed_out = false;
        loop {
            tokio::select! {
                biased;
                Some(event) = self.timer.next_event(), if self.timer.is_active() => {
                    timed_out |= self.on_timer(event).await;
                }
                output = &mut work => return (output, timed_out),
            }
        }
    }

    /// Apply timer events that are already queued. Returns true if one of
    /// them ended the session.
    async fn drain_timer(&mut self) -> bool {
        let mut timed_out = false;
        while let Some(event) = self.timer.try_next_event() {
            timed_out |= self.on_timer(event).await;
        }
        timed_out
    }

    /// Returns true when the event ended the session.
    async fn on_timer(&mut self, event: TimerEvent) -> bool {
        match event {
            TimerEvent::Tick { remaining } => {
                debug!(remaining, "tick");
                self.publish();
                false
            }
            TimerEvent::Finished => {
                if self.state.is_terminal() {
                    return false;
                }
                info!(test = %self.test.id(), "time is up");
                self.finish(SessionState::TimedOut).await;
                true
            }
        }
    }

    async fn play_audio(&mut self) -> Result<PlayOutcome, SessionError> {
        self.ensure_running()?;
        let Some(playback) = self.playback.as_mut() else {
            return Ok(PlayOutcome::Ignored);
        };
        let Some(grant) = playback.request_play() else {
            return Ok(PlayOutcome::Ignored);
        };

        let uri = playback.track().uri().clone();
        let audio = Arc::clone(&self.audio);
        let (opened, _) = self.preemptible(async move { audio.open(&uri).await }).await;

        // Time may have run out while the resource was opening.
        if self.state != SessionState::Running {
            if let Ok(mut handle) = opened {
                handle.release();
            }
            return Err(SessionError::NotRunning(self.state));
        }
        let Some(playback) = self.playback.as_mut() else {
            return Err(SessionError::NotRunning(self.state));
        };

        let started = match opened {
            Ok(handle) => playback.confirm(grant, handle).await,
            Err(err) => {
                playback.rollback(grant);
                Err(err)
            }
        };
        match started {
            Ok(()) => {
                debug!(
                    workbook = %self.sequencer.current().id(),
                    repeats_remaining = playback.repeats_remaining(),
                    "audio playing"
                );
                Ok(PlayOutcome::Started)
            }
            Err(err) => {
                warn!(workbook = %self.sequencer.current().id(), error = %err, "audio unavailable");
                self.notice = Some(SessionNotice::PlaybackUnavailable {
                    message: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    async fn open_questions(&mut self) -> Result<(), SessionError> {
        self.ensure_running()?;
        if let Some(playback) = self.playback.as_mut() {
            playback.stop().await;
        }
        Ok(())
    }

    fn select_option(&mut self, question: QuestionId, option: usize) -> Result<(), SessionError> {
        self.ensure_running()?;
        self.collector.record_answer(question, option)?;
        Ok(())
    }

    async fn submit(&mut self) -> Result<SubmitOutcome, SessionError> {
        self.ensure_running()?;
        let workbook = self.sequencer.current().clone();
        let record = self
            .collector
            .finalize_for_submission(&workbook, self.clock.now())?;

        let answers = Arc::clone(&self.storage.answers);
        let (user, test) = (self.user.id, self.test.id());
        let pending = record.clone();
        let (saved, timed_out) = self
            .preemptible(async move { answers.save_answers(user, test, &pending).await })
            .await;

        let save = match saved {
            Ok(()) => {
                debug!(
                    workbook = %workbook.id(),
                    marks = record.marks_obtained(),
                    maximum = record.maximum_marks(),
                    "answers saved"
                );
                SaveStatus::Saved
            }
            Err(err) => {
                warn!(workbook = %workbook.id(), error = %err, "saving answers failed");
                self.notice = Some(SessionNotice::SaveFailed {
                    workbook_id: workbook.id(),
                    message: err.to_string(),
                });
                SaveStatus::Failed(err.to_string())
            }
        };

        let timed_out = timed_out | self.drain_timer().await;
        if timed_out || self.state == SessionState::TimedOut {
            return Ok(SubmitOutcome {
                progress: SubmitProgress::TimedOut,
                save,
            });
        }

        if matches!(save, SaveStatus::Failed(_))
            && self.config.save_policy == SavePolicy::BlockUntilSaved
        {
            self.collector.restore(&record);
            return Ok(SubmitOutcome {
                progress: SubmitProgress::Retained,
                save,
            });
        }

        let progress = if self.sequencer.is_last() {
            self.finish(SessionState::Completed).await;
            SubmitProgress::Completed
        } else {
            self.release_playback().await;
            let next = self.sequencer.advance()?.clone();
            self.collector = AnswerCollector::for_workbook(&next);
            self.playback = Some(self.playback_for_current());
            info!(workbook = %next.id(), index = self.sequencer.current_index(), "advanced to next workbook");
            SubmitProgress::Advanced {
                index: self.sequencer.current_index(),
            }
        };
        Ok(SubmitOutcome { progress, save })
    }

    /// Enter `state` and release the timer and audio. Completion is recorded
    /// at most once, for timed-out and completed sessions only.
    async fn finish(&mut self, state: SessionState) {
        self.state = state;
        self.timer.cancel().await;
        self.release_playback().await;
        if state.marks_test_completed() {
            self.record_completion().await;
        }
        info!(test = %self.test.id(), %state, "session ended");
        self.publish();
    }

    async fn record_completion(&mut self) {
        if self.completion_recorded {
            return;
        }
        self.completion_recorded = true;
        let completed_at = self.clock.now();
        if let Err(err) = self
            .storage
            .answers
            .mark_test_completed(self.user.id, self.test.id(), completed_at)
            .await
        {
            warn!(test = %self.test.id(), error = %err, "recording completion failed");
            self.notice = Some(SessionNotice::CompletionFailed {
                message: err.to_string(),
            });
        }
    }

    async fn release_playback(&mut self) {
        if let Some(playback) = self.playback.take() {
            playback.release().await;
        }
    }

    fn playback_for_current(&mut self) -> PlaybackController {
        self.playback_epoch += 1;
        PlaybackController::new(
            self.sequencer.current().audio().clone(),
            self.playback_epoch,
            self.playback_tx.clone(),
            Arc::clone(&self.ticks),
            self.config.tick_period,
            self.config.audio_reset_pause,
        )
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    fn snapshot(&self) -> SessionSnapshot {
        let workbook = self.sequencer.current();
        SessionSnapshot {
            test_id: self.test.id(),
            state: self.state,
            total_seconds: self.timer.total_seconds(),
            remaining_seconds: self.timer.remaining_seconds(),
            workbook_index: self.sequencer.current_index(),
            workbook_count: self.sequencer.len(),
            workbook_id: workbook.id(),
            is_last_workbook: self.sequencer.is_last(),
            playback: self.playback.as_ref().map(PlaybackController::snapshot),
            answered: self.collector.answered_count(),
            notice: self.notice.clone(),
        }
    }
}
