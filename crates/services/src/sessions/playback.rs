use std::sync::Arc;
use std::time::Duration;

use exam_core::model::AudioTrack;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::audio::{AudioHandle, AudioProvider};
use crate::error::PlaybackError;
use crate::ticks::TickSource;

//
// ─── EVENTS ────────────────────────────────────────────────────────────────────
//

/// Progress report from a playback loop.
///
/// `epoch` identifies the controller instance and `run` the play attempt, so
/// reports from a torn-down controller or a superseded run are ignored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackEvent {
    pub epoch: u64,
    pub run: u64,
    pub kind: PlaybackEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackEventKind {
    Progress(f32),
    Finished,
    Reset,
}

/// Read-only view of the playback state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSnapshot {
    pub repeats_remaining: u32,
    pub max_repeats: u32,
    pub progress: f32,
    pub is_playing: bool,
}

/// Result of a play request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    Started,
    /// Already playing or out of repeats.
    Ignored,
}

/// A repeat taken from the budget, pending confirmation.
///
/// Hand it back through `confirm` once the resource is open, or `rollback`
/// if opening failed.
#[derive(Debug)]
#[must_use]
pub struct PlayGrant {
    run: u64,
}

//
// ─── RUN ───────────────────────────────────────────────────────────────────────
//

/// One granted play attempt: the open handle and its progress loop.
///
/// Dropping a run aborts the loop and releases the handle.
struct PlaybackRun {
    id: u64,
    handle: Option<Box<dyn AudioHandle>>,
    task: Option<JoinHandle<()>>,
}

impl PlaybackRun {
    fn release_handle(&mut self, stop: bool) {
        if let Some(mut handle) = self.handle.take() {
            if stop {
                handle.stop();
            }
            handle.release();
        }
    }

    async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        self.release_handle(true);
    }
}

impl Drop for PlaybackRun {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.release_handle(true);
    }
}

//
// ─── CONTROLLER ────────────────────────────────────────────────────────────────
//

/// Repeat-limited player for one workbook's audio prompt.
///
/// A repeat is consumed when play is granted. An interrupted play keeps it
/// consumed; a play whose resource fails to open gives it back.
pub struct PlaybackController {
    track: AudioTrack,
    epoch: u64,
    repeats_remaining: u32,
    progress: f32,
    is_playing: bool,
    pending: Option<u64>,
    next_run: u64,
    run: Option<PlaybackRun>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    ticks: Arc<dyn TickSource>,
    period: Duration,
    reset_pause: u32,
}

impl PlaybackController {
    #[must_use]
    pub fn new(
        track: AudioTrack,
        epoch: u64,
        events: mpsc::UnboundedSender<PlaybackEvent>,
        ticks: Arc<dyn TickSource>,
        period: Duration,
        reset_pause: u32,
    ) -> Self {
        Self {
            repeats_remaining: track.max_repeats(),
            track,
            epoch,
            progress: 0.0,
            is_playing: false,
            pending: None,
            next_run: 0,
            run: None,
            events,
            ticks,
            period,
            reset_pause,
        }
    }

    #[must_use]
    pub fn track(&self) -> &AudioTrack {
        &self.track
    }

    #[must_use]
    pub fn repeats_remaining(&self) -> u32 {
        self.repeats_remaining
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    #[must_use]
    pub fn progress(&self) -> f32 {
        self.progress
    }

    #[must_use]
    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            repeats_remaining: self.repeats_remaining,
            max_repeats: self.track.max_repeats(),
            progress: self.progress,
            is_playing: self.is_playing,
        }
    }

    /// Take one repeat from the budget. `None` when already playing, a grant
    /// is outstanding, or the budget is spent.
    pub fn request_play(&mut self) -> Option<PlayGrant> {
        if self.is_playing || self.pending.is_some() || self.repeats_remaining == 0 {
            return None;
        }
        self.repeats_remaining -= 1;
        let run = self.next_run;
        self.next_run += 1;
        self.pending = Some(run);
        debug!(
            epoch = self.epoch,
            run,
            repeats_remaining = self.repeats_remaining,
            "play granted"
        );
        Some(PlayGrant { run })
    }

    /// Give back a grant whose resource could not be opened.
    pub fn rollback(&mut self, grant: PlayGrant) {
        if self.pending == Some(grant.run) {
            self.pending = None;
            self.repeats_remaining = (self.repeats_remaining + 1).min(self.track.max_repeats());
        }
    }

    /// Start playing `handle` under `grant` and spawn its progress loop.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::Unavailable` if the handle refuses to start; the
    /// grant is rolled back and the handle released.
    pub async fn confirm(
        &mut self,
        grant: PlayGrant,
        mut handle: Box<dyn AudioHandle>,
    ) -> Result<(), PlaybackError> {
        if self.pending != Some(grant.run) {
            handle.release();
            return Ok(());
        }
        if let Err(err) = handle.start() {
            handle.release();
            self.rollback(grant);
            return Err(err);
        }

        // A previous run may still be in its reset pause.
        if let Some(previous) = self.run.take() {
            previous.shutdown().await;
        }

        let duration = handle.duration();
        let task = self.spawn_progress(grant.run, duration);
        self.pending = None;
        self.progress = 0.0;
        self.is_playing = true;
        self.run = Some(PlaybackRun {
            id: grant.run,
            handle: Some(handle),
            task: Some(task),
        });
        Ok(())
    }

    /// Request, open and confirm in one go.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::Unavailable` if the resource cannot be opened
    /// or started. The repeat is not consumed in that case.
    pub async fn play(&mut self, provider: &dyn AudioProvider) -> Result<PlayOutcome, PlaybackError> {
        let Some(grant) = self.request_play() else {
            return Ok(PlayOutcome::Ignored);
        };
        match provider.open(self.track.uri()).await {
            Ok(handle) => {
                self.confirm(grant, handle).await?;
                Ok(PlayOutcome::Started)
            }
            Err(err) => {
                warn!(uri = %self.track.uri(), error = %err, "audio unavailable");
                self.rollback(grant);
                Err(err)
            }
        }
    }

    /// Halt playback now. The repeat already spent stays spent.
    pub async fn stop(&mut self) {
        if let Some(run) = self.run.take() {
            run.shutdown().await;
        }
        if self.is_playing {
            debug!(epoch = self.epoch, "playback stopped");
        }
        self.is_playing = false;
        self.progress = 0.0;
    }

    /// Tear down: stop and release everything this controller holds.
    pub async fn release(mut self) {
        self.pending = None;
        self.stop().await;
    }

    /// Fold a progress report into the state. Returns whether anything changed.
    pub fn apply(&mut self, event: PlaybackEvent) -> bool {
        if event.epoch != self.epoch {
            return false;
        }
        let Some(run) = self.run.as_mut() else {
            return false;
        };
        if run.id != event.run {
            return false;
        }

        match event.kind {
            PlaybackEventKind::Progress(p) => {
                if !self.is_playing {
                    return false;
                }
                self.progress = p.clamp(self.progress, 1.0);
            }
            PlaybackEventKind::Finished => {
                run.release_handle(false);
                self.progress = 1.0;
                self.is_playing = false;
            }
            PlaybackEventKind::Reset => {
                self.run = None;
                self.progress = 0.0;
            }
        }
        true
    }

    fn spawn_progress(&self, run: u64, duration: Duration) -> JoinHandle<()> {
        let mut ticker = self.ticks.ticker(self.period);
        let events = self.events.clone();
        let epoch = self.epoch;
        let period = self.period;
        let reset_pause = self.reset_pause;

        tokio::spawn(async move {
            let send = |kind| events.send(PlaybackEvent { epoch, run, kind }).is_ok();
            let mut elapsed = Duration::ZERO;
            loop {
                ticker.tick().await;
                elapsed += period;
                if elapsed >= duration {
                    break;
                }
                let fraction = (elapsed.as_secs_f32() / duration.as_secs_f32()).clamp(0.0, 1.0);
                if !send(PlaybackEventKind::Progress(fraction)) {
                    return;
                }
            }
            if !send(PlaybackEventKind::Finished) {
                return;
            }
            for _ in 0..reset_pause {
                ticker.tick().await;
            }
            let _ = send(PlaybackEventKind::Reset);
        })
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticks::ManualClock;
    use async_trait::async_trait;
    use exam_core::model::AudioUri;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Open,
        Start,
        Stop,
        Release,
    }

    #[derive(Clone, Default)]
    struct FakeAudio {
        calls: Arc<Mutex<Vec<Call>>>,
        fail_open: bool,
        secs: u64,
    }

    impl FakeAudio {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    struct FakeHandle {
        calls: Arc<Mutex<Vec<Call>>>,
        secs: u64,
    }

    impl AudioHandle for FakeHandle {
        fn duration(&self) -> Duration {
            Duration::from_secs(self.secs)
        }
        fn start(&mut self) -> Result<(), PlaybackError> {
            self.calls.lock().unwrap().push(Call::Start);
            Ok(())
        }
        fn stop(&mut self) {
            self.calls.lock().unwrap().push(Call::Stop);
        }
        fn release(&mut self) {
            self.calls.lock().unwrap().push(Call::Release);
        }
    }

    #[async_trait]
    impl AudioProvider for FakeAudio {
        async fn open(&self, _uri: &AudioUri) -> Result<Box<dyn AudioHandle>, PlaybackError> {
            self.calls.lock().unwrap().push(Call::Open);
            if self.fail_open {
                return Err(PlaybackError::Unavailable("missing file".into()));
            }
            Ok(Box::new(FakeHandle {
                calls: Arc::clone(&self.calls),
                secs: self.secs,
            }))
        }
    }

    struct Rig {
        clock: ManualClock,
        events: mpsc::UnboundedReceiver<PlaybackEvent>,
        controller: PlaybackController,
    }

    fn rig(max_repeats: u32) -> Rig {
        let clock = ManualClock::new();
        let (tx, events) = mpsc::unbounded_channel();
        let track = AudioTrack::new(AudioUri::from_file("part1.mp3").unwrap(), max_repeats);
        let controller = PlaybackController::new(
            track,
            1,
            tx,
            Arc::new(clock.clone()),
            Duration::from_secs(1),
            1,
        );
        Rig {
            clock,
            events,
            controller,
        }
    }

    impl Rig {
        async fn pump(&mut self, n: usize) {
            for _ in 0..n {
                let event = self.events.recv().await.unwrap();
                self.controller.apply(event);
            }
        }
    }

    #[tokio::test]
    async fn repeat_budget_is_exact() {
        let audio = FakeAudio {
            secs: 2,
            ..FakeAudio::default()
        };
        let mut rig = rig(3);

        for expected in [2, 1, 0] {
            let outcome = rig.controller.play(&audio).await.unwrap();
            assert_eq!(outcome, PlayOutcome::Started);
            assert_eq!(rig.controller.repeats_remaining(), expected);
            rig.controller.stop().await;
        }

        let outcome = rig.controller.play(&audio).await.unwrap();
        assert_eq!(outcome, PlayOutcome::Ignored);
        assert_eq!(rig.controller.repeats_remaining(), 0);
    }

    #[tokio::test]
    async fn play_while_playing_is_ignored() {
        let audio = FakeAudio {
            secs: 10,
            ..FakeAudio::default()
        };
        let mut rig = rig(2);
        rig.controller.play(&audio).await.unwrap();
        let outcome = rig.controller.play(&audio).await.unwrap();
        assert_eq!(outcome, PlayOutcome::Ignored);
        assert_eq!(rig.controller.repeats_remaining(), 1);
    }

    #[tokio::test]
    async fn failed_open_restores_repeat() {
        let audio = FakeAudio {
            fail_open: true,
            ..FakeAudio::default()
        };
        let mut rig = rig(2);
        let err = rig.controller.play(&audio).await.unwrap_err();
        assert!(matches!(err, PlaybackError::Unavailable(_)));
        assert_eq!(rig.controller.repeats_remaining(), 2);
        assert!(!rig.controller.is_playing());
    }

    #[tokio::test]
    async fn interrupted_play_keeps_repeat_spent() {
        let audio = FakeAudio {
            secs: 10,
            ..FakeAudio::default()
        };
        let mut rig = rig(2);
        rig.controller.play(&audio).await.unwrap();
        rig.clock.advance(3);
        rig.pump(3).await;
        assert!(rig.controller.progress() > 0.0);

        rig.controller.stop().await;

        assert_eq!(rig.controller.repeats_remaining(), 1);
        assert!(!rig.controller.is_playing());
        assert_eq!(
            audio.calls(),
            vec![Call::Open, Call::Start, Call::Stop, Call::Release]
        );
        assert_eq!(rig.clock.live_tickers(), 0);
    }

    #[tokio::test]
    async fn natural_completion_fills_then_resets() {
        let audio = FakeAudio {
            secs: 3,
            ..FakeAudio::default()
        };
        let mut rig = rig(1);
        rig.controller.play(&audio).await.unwrap();

        rig.clock.advance(2);
        rig.pump(2).await;
        let p = rig.controller.progress();
        assert!((p - 2.0 / 3.0).abs() < 1e-4, "progress was {p}");
        assert!(rig.controller.is_playing());

        rig.clock.advance(1);
        rig.pump(1).await;
        assert!((rig.controller.progress() - 1.0).abs() < f32::EPSILON);
        assert!(!rig.controller.is_playing());
        assert_eq!(audio.calls().last(), Some(&Call::Release));

        rig.clock.advance(1);
        rig.pump(1).await;
        assert!(rig.controller.progress().abs() < f32::EPSILON);
        assert_eq!(rig.controller.repeats_remaining(), 0);
    }

    #[tokio::test]
    async fn stale_events_are_ignored() {
        let mut rig = rig(1);
        let stale = PlaybackEvent {
            epoch: 99,
            run: 0,
            kind: PlaybackEventKind::Progress(0.5),
        };
        assert!(!rig.controller.apply(stale));
        assert!(rig.controller.progress().abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn release_frees_the_handle() {
        let audio = FakeAudio {
            secs: 30,
            ..FakeAudio::default()
        };
        let mut rig = rig(1);
        rig.controller.play(&audio).await.unwrap();
        rig.controller.release().await;
        assert_eq!(audio.calls().last(), Some(&Call::Release));
        assert_eq!(rig.clock.live_tickers(), 0);
    }
}
