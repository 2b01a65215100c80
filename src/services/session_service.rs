//! The single logical event queue of the engine.
//!
//! One task owns the [`Session`] and processes [`SessionCommand`]s strictly in
//! arrival order: operations from the HTTP surface, presses from controller
//! bridges, clock ticks and delayed auto-advances all go through the same
//! channel. After each command the queued session events are fanned out to
//! the SSE hub and the indicator, and the countdown ticker is re-synchronised
//! with the session clock.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{
        mpsc::{self, WeakSender},
        oneshot,
    },
    task::JoinHandle,
    time::{self, MissedTickBehavior, timeout},
};
use tracing::{debug, info, warn};

use crate::{
    dao::high_score::HighScoreStore,
    dto::session::SessionSnapshot,
    error::ServiceError,
    services::{
        indicator_service::{Indicator, indicator_commands},
        input_service::{ButtonPress, InputOutcome, InputRouter},
        sse_events,
    },
    state::{
        SseHub,
        clock::{ClockGeneration, ClockSignal},
        events::SessionEvent,
        game::AnswerColor,
        player::PlayerKey,
        session::Session,
        state_machine::{Rejected, SessionPhase},
    },
};

/// Capacity of the command channel.
pub const COMMAND_QUEUE_CAPACITY: usize = 64;
/// Bound on a high score write before the queue moves on.
const PERSIST_TIMEOUT: Duration = Duration::from_secs(5);

/// Operation requested by the host or presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOp {
    Join(PlayerKey),
    Start,
    Select(PlayerKey, AnswerColor),
    Commit(PlayerKey),
    Reveal,
    ShowScoreboard,
    Advance,
    Restart,
    Abort,
}

impl SessionOp {
    fn apply(self, session: &mut Session) -> Result<(), Rejected> {
        match self {
            SessionOp::Join(player) => session.join(player),
            SessionOp::Start => session.start_session(),
            SessionOp::Select(player, color) => session.select_answer(player, color),
            SessionOp::Commit(player) => session.commit_answer(player).map(|_| ()),
            SessionOp::Reveal => session.reveal(),
            SessionOp::ShowScoreboard => session.show_scoreboard(),
            SessionOp::Advance => session.advance().map(|_| ()),
            SessionOp::Restart => session.restart(),
            SessionOp::Abort => session.abort(),
        }
    }
}

/// Messages processed by the session task.
#[derive(Debug)]
pub enum SessionCommand {
    Apply {
        op: SessionOp,
        reply: oneshot::Sender<Result<SessionSnapshot, Rejected>>,
    },
    Press {
        press: ButtonPress,
        reply: Option<oneshot::Sender<InputOutcome>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    /// One second of the countdown started under `generation`.
    ClockTick { generation: ClockGeneration },
    /// Delayed advance scheduled when `round` was revealed.
    AutoAdvance { round: u32 },
}

/// Cloneable entry point into the session task.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Run an operation and return the resulting state.
    pub async fn apply(&self, op: SessionOp) -> Result<SessionSnapshot, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::Apply { op, reply }).await?;
        let result = response.await.map_err(|_| ServiceError::QueueClosed)?;
        Ok(result?)
    }

    /// Route a controller press and wait for its outcome.
    pub async fn press(&self, press: ButtonPress) -> Result<InputOutcome, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::Press {
            press,
            reply: Some(reply),
        })
        .await?;
        response.await.map_err(|_| ServiceError::QueueClosed)
    }

    /// Queue a controller press without waiting for it to be processed.
    pub async fn submit_press(&self, press: ButtonPress) -> Result<(), ServiceError> {
        self.send(SessionCommand::Press { press, reply: None }).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::Snapshot { reply }).await?;
        response.await.map_err(|_| ServiceError::QueueClosed)
    }

    /// Whether the session task has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn send(&self, command: SessionCommand) -> Result<(), ServiceError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ServiceError::QueueClosed)
    }
}

/// Collaborators the session task reports to.
#[derive(Clone)]
pub struct SessionOutputs {
    pub sse: SseHub,
    pub indicator: Arc<dyn Indicator>,
    pub high_scores: Arc<dyn HighScoreStore>,
}

/// Timing of the background work driven by the queue.
#[derive(Debug, Clone, Copy)]
pub struct RunnerOptions {
    /// Period of the countdown ticks.
    pub tick_interval: Duration,
    /// Delay before a revealed round advances on its own; `None` disables it.
    pub reveal_hold: Option<Duration>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            reveal_hold: Some(Duration::from_millis(4000)),
        }
    }
}

/// Start the session task and return its handle.
pub fn spawn_session(session: Session, outputs: SessionOutputs, options: RunnerOptions) -> SessionHandle {
    let (commands, receiver) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let runner = SessionRunner {
        session,
        input: InputRouter::new(),
        commands: receiver,
        loopback: commands.downgrade(),
        outputs,
        options,
        ticker: None,
        auto_advance: None,
    };
    tokio::spawn(runner.run());
    SessionHandle { commands }
}

struct Ticker {
    generation: ClockGeneration,
    handle: JoinHandle<()>,
}

struct SessionRunner {
    session: Session,
    input: InputRouter,
    commands: mpsc::Receiver<SessionCommand>,
    loopback: WeakSender<SessionCommand>,
    outputs: SessionOutputs,
    options: RunnerOptions,
    ticker: Option<Ticker>,
    auto_advance: Option<JoinHandle<()>>,
}

impl SessionRunner {
    async fn run(mut self) {
        info!(quiz = %self.session.quiz_title(), "session queue started");
        while let Some(command) = self.commands.recv().await {
            self.handle(command);
            self.flush().await;
            self.sync_ticker();
        }

        if let Some(ticker) = self.ticker.take() {
            ticker.handle.abort();
        }
        self.cancel_auto_advance();
        info!("session queue stopped");
    }

    fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Apply { op, reply } => {
                let result = op
                    .apply(&mut self.session)
                    .map(|()| SessionSnapshot::from(&self.session));
                if let Err(err) = &result {
                    debug!(op = ?op, reason = %err, "operation rejected");
                }
                let _ = reply.send(result);
            }
            SessionCommand::Press { press, reply } => {
                let now = self.session.now();
                let outcome = self.input.route(&mut self.session, press, now);
                if let Some(reply) = reply {
                    let _ = reply.send(outcome);
                }
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(SessionSnapshot::from(&self.session));
            }
            SessionCommand::ClockTick { generation } => {
                if self.session.clock_tick(generation) == ClockSignal::Stale {
                    debug!(generation, "stale clock tick dropped");
                }
            }
            SessionCommand::AutoAdvance { round } => self.auto_advance(round),
        }
    }

    fn auto_advance(&mut self, round: u32) {
        let current = self.session.round().map(|current| current.number);
        let phase = self.session.phase();
        if current != Some(round)
            || !matches!(phase, SessionPhase::Reveal | SessionPhase::Scoreboard)
        {
            debug!(round, phase = ?phase, "stale auto-advance dropped");
            return;
        }
        if let Err(err) = self.session.advance() {
            debug!(round, reason = %err, "auto-advance rejected");
        }
    }

    async fn flush(&mut self) {
        for event in self.session.take_events() {
            sse_events::broadcast_session_event(&self.outputs.sse, &event);
            for command in indicator_commands(&event) {
                self.outputs.indicator.dispatch(command);
            }

            match &event {
                SessionEvent::RoundResolved(summary) => self.schedule_auto_advance(summary.round),
                SessionEvent::StateChange {
                    to: SessionPhase::Lobby | SessionPhase::QuestionActive,
                    ..
                } => self.cancel_auto_advance(),
                SessionEvent::NewHighScore { score } => {
                    persist_high_score(self.outputs.high_scores.as_ref(), *score).await
                }
                _ => {}
            }
        }
    }

    fn sync_ticker(&mut self) {
        let wanted = self.session.clock_generation();
        if self.ticker.as_ref().map(|ticker| ticker.generation) == wanted {
            return;
        }
        if let Some(ticker) = self.ticker.take() {
            ticker.handle.abort();
        }
        if let Some(generation) = wanted {
            let handle = spawn_ticker(self.loopback.clone(), generation, self.options.tick_interval);
            self.ticker = Some(Ticker { generation, handle });
        }
    }

    fn schedule_auto_advance(&mut self, round: u32) {
        self.cancel_auto_advance();
        let Some(hold) = self.options.reveal_hold else {
            return;
        };
        let loopback = self.loopback.clone();
        self.auto_advance = Some(tokio::spawn(async move {
            time::sleep(hold).await;
            if let Some(commands) = loopback.upgrade() {
                let _ = commands.send(SessionCommand::AutoAdvance { round }).await;
            }
        }));
    }

    fn cancel_auto_advance(&mut self) {
        if let Some(handle) = self.auto_advance.take() {
            handle.abort();
        }
    }
}

async fn persist_high_score(store: &dyn HighScoreStore, score: u32) {
    match timeout(PERSIST_TIMEOUT, store.save(score)).await {
        Ok(Ok(())) => info!(score, "high score persisted"),
        Ok(Err(err)) => warn!(
            score,
            error = %err,
            "failed to persist high score; keeping in-memory value"
        ),
        Err(_) => warn!(score, "timed out persisting high score; keeping in-memory value"),
    }
}

/// Feed one tick per period into the queue until aborted or the queue is gone.
fn spawn_ticker(
    loopback: WeakSender<SessionCommand>,
    generation: ClockGeneration,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval_at(time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let Some(commands) = loopback.upgrade() else {
                break;
            };
            if commands
                .send(SessionCommand::ClockTick { generation })
                .await
                .is_err()
            {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::sync::broadcast;

    use super::*;
    use crate::{
        dao::{high_score::MemoryHighScoreStore, quiz_store::QuizDeck},
        dto::{sse::ServerEvent, ws::IndicatorCommand},
        services::input_service::ButtonRole,
        state::{
            clock::SystemTimeSource,
            game::{GameSettings, ScoringPolicy},
        },
    };

    #[derive(Default)]
    struct RecordingIndicator {
        commands: Mutex<Vec<IndicatorCommand>>,
    }

    impl Indicator for RecordingIndicator {
        fn dispatch(&self, command: IndicatorCommand) {
            self.commands.lock().unwrap().push(command);
        }
    }

    struct Harness {
        handle: SessionHandle,
        events: broadcast::Receiver<ServerEvent>,
        indicator: Arc<RecordingIndicator>,
        store: MemoryHighScoreStore,
    }

    fn harness(seconds: u32, reveal_hold: Option<Duration>) -> Harness {
        let settings = GameSettings {
            seconds_per_question: seconds,
            policy: ScoringPolicy::OpenFlat,
            streak_multiplier: false,
            ..GameSettings::default()
        };
        let deck = QuizDeck::from_json(
            r#"{"quizTitle":"Runner","questions":[
                {"id":1,"question":"One?","answers":{"blue":"a","orange":"b","green":"c","yellow":"d"},"correct":"blue"},
                {"id":2,"question":"Two?","answers":{"blue":"a","orange":"b","green":"c","yellow":"d"},"correct":"green"}
            ]}"#,
        )
        .unwrap();
        let store = MemoryHighScoreStore::new(0);
        let sse = SseHub::new(256);
        let events = sse.subscribe();
        let indicator = Arc::new(RecordingIndicator::default());
        let session = Session::new(settings, Box::new(deck), Arc::new(SystemTimeSource), 0);
        let handle = spawn_session(
            session,
            SessionOutputs {
                sse,
                indicator: indicator.clone(),
                high_scores: Arc::new(store.clone()),
            },
            RunnerOptions {
                tick_interval: Duration::from_millis(10),
                reveal_hold,
            },
        );
        Harness {
            handle,
            events,
            indicator,
            store,
        }
    }

    async fn wait_for(events: &mut broadcast::Receiver<ServerEvent>, name: &str) -> ServerEvent {
        timeout(Duration::from_secs(5), async {
            loop {
                let event = events.recv().await.unwrap();
                if event.event.as_deref() == Some(name) {
                    return event;
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn operations_return_snapshots_and_rejections() {
        let h = harness(30, None);
        let snapshot = h.handle.apply(SessionOp::Join(PlayerKey::One)).await.unwrap();
        assert!(snapshot.players[0].joined);

        let err = h
            .handle
            .apply(SessionOp::Join(PlayerKey::One))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Rejected(Rejected::AlreadyJoined(PlayerKey::One))
        ));

        let snapshot = h.handle.apply(SessionOp::Start).await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::QuestionActive);
        assert_eq!(h.handle.snapshot().await.unwrap().version, snapshot.version);
    }

    #[tokio::test]
    async fn countdown_expiry_reveals_the_round() {
        let mut h = harness(5, None);
        h.handle.apply(SessionOp::Join(PlayerKey::Two)).await.unwrap();
        h.handle.apply(SessionOp::Start).await.unwrap();

        wait_for(&mut h.events, "timeExpired").await;
        let resolved = wait_for(&mut h.events, "roundResolved").await;
        assert!(resolved.data.contains("\"correct_color\":\"blue\""));
        assert_eq!(h.handle.snapshot().await.unwrap().phase, SessionPhase::Reveal);
    }

    #[tokio::test]
    async fn reveal_hold_advances_to_the_next_question() {
        let mut h = harness(30, Some(Duration::from_millis(20)));
        h.handle.apply(SessionOp::Join(PlayerKey::One)).await.unwrap();
        h.handle.apply(SessionOp::Start).await.unwrap();
        wait_for(&mut h.events, "questionStarted").await;
        h.handle.apply(SessionOp::Reveal).await.unwrap();

        let next = wait_for(&mut h.events, "questionStarted").await;
        assert!(next.data.contains("\"round\":2"));
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::QuestionActive);
    }

    #[tokio::test]
    async fn presses_drive_the_game_and_the_lights() {
        let mut h = harness(30, None);
        let press = |player, button| ButtonPress { player, button };

        let outcome = h
            .handle
            .press(press(PlayerKey::Three, ButtonRole::Commit))
            .await
            .unwrap();
        assert!(matches!(outcome, InputOutcome::Applied { .. }));
        for color in AnswerColor::ALL {
            h.handle
                .submit_press(press(PlayerKey::Three, ButtonRole::Answer(color)))
                .await
                .unwrap();
        }
        wait_for(&mut h.events, "questionStarted").await;

        h.handle
            .press(press(PlayerKey::Three, ButtonRole::Answer(AnswerColor::Blue)))
            .await
            .unwrap();
        h.handle
            .press(press(PlayerKey::Three, ButtonRole::Commit))
            .await
            .unwrap();
        wait_for(&mut h.events, "roundResolved").await;
        // queued behind the flush that dispatched the reveal lights
        h.handle.snapshot().await.unwrap();

        let commands = h.indicator.commands.lock().unwrap().clone();
        assert_eq!(
            commands.first(),
            Some(&IndicatorCommand::SetOne {
                player: PlayerKey::Three,
                on: true
            })
        );
        assert!(commands.contains(&IndicatorCommand::Flash {
            player: PlayerKey::Three,
            times: 3,
            interval_ms: 200
        }));
    }

    #[tokio::test]
    async fn new_high_score_is_persisted() {
        let mut h = harness(30, None);
        h.handle.apply(SessionOp::Join(PlayerKey::One)).await.unwrap();
        h.handle.apply(SessionOp::Start).await.unwrap();
        for color in [AnswerColor::Blue, AnswerColor::Green] {
            h.handle
                .apply(SessionOp::Select(PlayerKey::One, color))
                .await
                .unwrap();
            h.handle.apply(SessionOp::Commit(PlayerKey::One)).await.unwrap();
            h.handle.apply(SessionOp::Advance).await.unwrap();
        }

        wait_for(&mut h.events, "newHighScore").await;
        wait_for(&mut h.events, "gameOver").await;
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::GameOver);
        assert_eq!(snapshot.high_score, 200);
        assert_eq!(h.store.get(), 200);
    }
}
