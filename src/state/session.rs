//! The session aggregate.
//!
//! [`Session`] owns every piece of mutable game state: the phase machine, the
//! player registry, the round clock and the round in play. Operations validate
//! against the current phase before touching anything, so a refused operation
//! returns [`Rejected`] and leaves the session exactly as it was.
//!
//! Nothing is delivered to observers from inside an operation. Events are
//! queued and the caller collects them with [`Session::take_events`] once the
//! operation returned, which keeps operations free of re-entrant callbacks.

use std::{mem, sync::Arc, time::Instant};

use tracing::{debug, info};

use crate::{
    dao::quiz_store::{QuizProgress, QuizProvider},
    state::{
        clock::{ClockGeneration, ClockSignal, RoundClock, TimeSource},
        events::{GameOverSummary, GameStats, QuestionView, RankedPlayer, RoundSummary, SessionEvent},
        game::{AnswerColor, GameSettings, Question},
        ledger::{FirstCommit, Round, RoundStatus},
        player::{Player, PlayerKey, PlayerRegistry},
        scoring::{RoundResult, resolve_round},
        state_machine::{
            InvalidTransition, Plan, Rejected, SessionPhase, SessionStateMachine, SessionTrigger,
        },
    },
};

/// Aggregate root of one trivia table.
pub struct Session {
    machine: SessionStateMachine,
    players: PlayerRegistry,
    clock: RoundClock,
    round: Option<Round>,
    results: Vec<RoundResult>,
    quiz: Box<dyn QuizProvider>,
    time: Arc<dyn TimeSource>,
    settings: GameSettings,
    high_score: u32,
    stats: GameStats,
    outcome: Option<GameOverSummary>,
    events: Vec<SessionEvent>,
}

impl Session {
    /// Create a session in the lobby with every slot unjoined.
    pub fn new(
        settings: GameSettings,
        quiz: Box<dyn QuizProvider>,
        time: Arc<dyn TimeSource>,
        high_score: u32,
    ) -> Self {
        Self {
            machine: SessionStateMachine::new(),
            players: PlayerRegistry::new(),
            clock: RoundClock::new(),
            round: None,
            results: Vec::new(),
            quiz,
            time,
            settings,
            high_score,
            stats: GameStats::default(),
            outcome: None,
            events: Vec::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.machine.phase()
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> usize {
        self.machine.snapshot().version
    }

    pub fn players(&self) -> &PlayerRegistry {
        &self.players
    }

    /// Round in play or, after the reveal, the round just resolved.
    pub fn round(&self) -> Option<&Round> {
        self.round.as_ref()
    }

    /// Results of the latest resolved round.
    pub fn last_results(&self) -> &[RoundResult] {
        &self.results
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    /// Best winning score known to this session.
    pub fn high_score(&self) -> u32 {
        self.high_score
    }

    /// Final standings once the game is over.
    pub fn outcome(&self) -> Option<&GameOverSummary> {
        self.outcome.as_ref()
    }

    pub fn quiz_title(&self) -> &str {
        self.quiz.title()
    }

    pub fn quiz_progress(&self) -> QuizProgress {
        self.quiz.progress()
    }

    /// Generation of the running countdown, if any.
    pub fn clock_generation(&self) -> Option<ClockGeneration> {
        self.clock.active_generation()
    }

    /// Seconds left on the running countdown.
    pub fn remaining_seconds(&self) -> Option<u32> {
        self.clock.remaining()
    }

    /// Current instant of the session's time source.
    pub fn now(&self) -> Instant {
        self.time.now()
    }

    /// Drain the events queued by the operations applied so far.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        mem::take(&mut self.events)
    }

    /// Add a player to the lobby roster.
    pub fn join(&mut self, player: PlayerKey) -> Result<(), Rejected> {
        let plan = self.machine.plan(SessionTrigger::Join)?;
        if self.players.is_joined(player) {
            return Err(Rejected::AlreadyJoined(player));
        }

        self.machine.apply(plan)?;
        self.players.join(player);
        info!(player = %player, "player joined");
        self.emit(SessionEvent::PlayerJoined { player });
        Ok(())
    }

    /// Reset per-game fields, show the first question and start the clock.
    pub fn start_session(&mut self) -> Result<(), Rejected> {
        let plan = self.machine.plan(SessionTrigger::StartSession)?;
        if self.players.joined_count() == 0 {
            return Err(Rejected::NoPlayers);
        }
        self.quiz.rewind();
        let question = self.quiz.current().cloned().ok_or(Rejected::NoQuestions)?;

        self.machine.apply(plan)?;
        self.players.reset_game();
        self.stats = GameStats::default();
        self.outcome = None;
        info!(
            players = self.players.joined_count(),
            policy = ?self.settings.policy,
            quiz = %self.quiz.title(),
            "session started"
        );
        self.announce(&plan);
        self.begin_round(question, 1);
        Ok(())
    }

    /// Highlight an answer for a player who has not committed yet.
    pub fn select_answer(&mut self, player: PlayerKey, color: AnswerColor) -> Result<(), Rejected> {
        let plan = self.machine.plan(SessionTrigger::SelectAnswer)?;
        if !self.players.is_joined(player) {
            return Err(Rejected::NotJoined(player));
        }
        let round = round_in_play(&mut self.round, &plan)?;
        if round.ledger.is_committed(player) {
            return Err(Rejected::AlreadyCommitted(player));
        }

        self.machine.apply(plan)?;
        round.ledger.select(player, color)?;
        debug!(player = %player, color = %color, "answer selected");
        self.emit(SessionEvent::AnswerSelected { player, color });
        Ok(())
    }

    /// Freeze a player's selection, resolving the round when the policy says so.
    pub fn commit_answer(&mut self, player: PlayerKey) -> Result<AnswerColor, Rejected> {
        let plan = self.machine.plan(SessionTrigger::CommitAnswer)?;
        if !self.players.is_joined(player) {
            return Err(Rejected::NotJoined(player));
        }
        let racing = self.settings.policy.is_racing();
        let rules = self.settings.racing;
        let now = self.time.now();
        let round = round_in_play(&mut self.round, &plan)?;
        let entry = round.ledger.entry(player);
        if entry.is_committed() {
            return Err(Rejected::AlreadyCommitted(player));
        }
        if entry.selection.is_none() {
            return Err(Rejected::NoSelection(player));
        }
        let after = round.elapsed_at(now);
        if let Some(first) = round.first_commit.filter(|_| racing)
            && (rules.exclusive || after < first.after + rules.lockout)
        {
            return Err(Rejected::CommitsClosed(player));
        }

        self.machine.apply(plan)?;
        let color = round.ledger.commit(player, after)?;
        let latched_first = racing && round.first_commit.is_none();
        if latched_first {
            round.first_commit = Some(FirstCommit { player, after });
        }
        let all_committed = self.players.all_committed(&round.ledger);

        info!(
            player = %player,
            color = %color,
            after_ms = after.as_millis() as u64,
            "answer committed"
        );
        self.emit(SessionEvent::AnswerCommitted { player, color });
        if latched_first {
            self.emit(SessionEvent::FirstCommit { player });
        }
        if all_committed {
            self.emit(SessionEvent::AllPlayersCommitted);
        }
        if all_committed || (latched_first && rules.exclusive) {
            self.resolve(SessionTrigger::Reveal)?;
        }
        Ok(color)
    }

    /// Deliver a one-second tick scheduled for `generation`.
    ///
    /// Ticks of a cancelled or superseded countdown are reported as
    /// [`ClockSignal::Stale`] and change nothing.
    pub fn clock_tick(&mut self, generation: ClockGeneration) -> ClockSignal {
        let signal = self.clock.tick(generation);
        match signal {
            ClockSignal::Tick { remaining } => {
                self.emit(SessionEvent::TimerTick { value: remaining });
            }
            ClockSignal::Expired => {
                info!(generation, "round clock expired");
                self.emit(SessionEvent::TimerTick { value: 0 });
                self.emit(SessionEvent::TimeExpired);
                if let Err(err) = self.resolve(SessionTrigger::ClockExpiry) {
                    debug!(error = %err, "clock expiry did not resolve a round");
                }
            }
            ClockSignal::Stale => {}
        }
        signal
    }

    /// Stop the clock and score the round in play.
    pub fn reveal(&mut self) -> Result<(), Rejected> {
        self.resolve(SessionTrigger::Reveal)
    }

    /// Switch from the reveal to the standings.
    pub fn show_scoreboard(&mut self) -> Result<(), Rejected> {
        let plan = self.machine.plan(SessionTrigger::ShowScoreboard)?;
        self.machine.apply(plan)?;
        self.announce(&plan);
        Ok(())
    }

    /// Show the next question, or end the game when the quiz is exhausted.
    pub fn advance(&mut self) -> Result<SessionPhase, Rejected> {
        let finished = !self.quiz.has_more();
        let plan = self.machine.plan(SessionTrigger::Advance { finished })?;
        if finished {
            return self.finish_game(plan);
        }

        let Some(question) = self.quiz.advance().cloned() else {
            let plan = self.machine.plan(SessionTrigger::Advance { finished: true })?;
            return self.finish_game(plan);
        };
        let number = self.round.as_ref().map_or(1, |round| round.number + 1);
        let phase = self.machine.apply(plan)?;
        self.announce(&plan);
        self.begin_round(question, number);
        Ok(phase)
    }

    /// Return a finished game to an empty lobby.
    pub fn restart(&mut self) -> Result<(), Rejected> {
        let plan = self.machine.plan(SessionTrigger::Restart)?;
        self.machine.apply(plan)?;
        self.reset_to_lobby();
        self.announce(&plan);
        Ok(())
    }

    /// Force the session back to an empty lobby from any phase.
    pub fn abort(&mut self) -> Result<(), Rejected> {
        let plan = self.machine.plan(SessionTrigger::Abort)?;
        self.machine.apply(plan)?;
        self.reset_to_lobby();
        info!(from = ?plan.from, "session aborted");
        self.announce(&plan);
        Ok(())
    }

    /// Joined players ordered by score, then by total commit time, then by slot.
    pub fn ranking(&self) -> Vec<RankedPlayer> {
        let mut players: Vec<&Player> = self.players.joined().collect();
        players.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.commit_time_total.cmp(&b.commit_time_total))
                .then(a.key.cmp(&b.key))
        });
        players
            .into_iter()
            .enumerate()
            .map(|(position, player)| RankedPlayer {
                rank: position + 1,
                player: player.key,
                score: player.score,
                correct_answers: player.correct_answers,
                best_streak: player.best_streak,
                commit_time: player.commit_time_total,
            })
            .collect()
    }

    fn resolve(&mut self, trigger: SessionTrigger) -> Result<(), Rejected> {
        let plan = self.machine.plan(trigger)?;
        let round = round_in_play(&mut self.round, &plan)?;

        self.machine.apply(plan)?;
        self.clock.cancel();
        let results = resolve_round(&round.question, &self.players, round, &self.settings);
        round.status = RoundStatus::Resolved;
        let summary = RoundSummary {
            round: round.number,
            correct_color: round.question.correct,
            results: results.clone(),
        };

        for result in &results {
            let player = self.players.get_mut(result.player);
            player.score = result.score;
            player.streak = result.streak;
            player.best_streak = player.best_streak.max(result.streak);
            if result.correct {
                player.correct_answers += 1;
            }
            player.commit_time_total += result.commit_time.unwrap_or(round.duration);
        }
        self.stats.questions_played += 1;
        if summary.correct_players().next().is_some() {
            self.stats.rounds_with_correct += 1;
        }
        self.results = results;

        info!(
            round = summary.round,
            correct = %summary.correct_color,
            trigger = ?trigger,
            "round resolved"
        );
        self.announce(&plan);
        self.emit(SessionEvent::RoundResolved(summary));
        Ok(())
    }

    fn finish_game(&mut self, plan: Plan) -> Result<SessionPhase, Rejected> {
        let phase = self.machine.apply(plan)?;
        self.clock.cancel();
        let ranking = self.ranking();
        let winner = ranking.first().map(|entry| entry.player);
        let top_score = ranking.first().map_or(0, |entry| entry.score);
        let stats = GameStats {
            best_streak: self
                .players
                .joined()
                .map(|player| player.best_streak)
                .max()
                .unwrap_or(0),
            ..self.stats
        };
        self.stats = stats;

        info!(
            winner = ?winner,
            score = top_score,
            questions = stats.questions_played,
            "game over"
        );
        self.announce(&plan);
        if top_score > self.high_score {
            info!(previous = self.high_score, score = top_score, "new high score");
            self.high_score = top_score;
            self.emit(SessionEvent::NewHighScore { score: top_score });
        }

        let summary = GameOverSummary {
            ranking,
            winner,
            stats,
        };
        self.outcome = Some(summary.clone());
        self.emit(SessionEvent::GameOver(summary));
        Ok(phase)
    }

    fn begin_round(&mut self, question: Question, number: u32) {
        let now = self.time.now();
        let seconds = self.settings.seconds_per_question;
        let generation = self.clock.start(seconds);
        let progress = self.quiz.progress();
        let view = QuestionView::new(number, progress.index, progress.total, &question, seconds);
        self.round = Some(Round::new(
            number,
            question,
            now,
            self.settings.round_duration(),
        ));
        self.results.clear();

        debug!(round = number, generation, seconds, "round clock started");
        self.emit(SessionEvent::QuestionStarted(view));
        self.emit(SessionEvent::TimerTick { value: seconds });
    }

    fn reset_to_lobby(&mut self) {
        self.clock.cancel();
        self.round = None;
        self.results.clear();
        self.players.clear();
        self.quiz.rewind();
        self.stats = GameStats::default();
        self.outcome = None;
    }

    fn announce(&mut self, plan: &Plan) {
        if plan.changes_phase() || plan.trigger == SessionTrigger::Abort {
            info!(
                from = ?plan.from,
                to = ?plan.to,
                version = plan.version_next,
                "session phase changed"
            );
            self.emit(SessionEvent::StateChange {
                from: plan.from,
                to: plan.to,
            });
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        self.events.push(event);
    }
}

/// The unresolved round a question-phase plan operates on.
fn round_in_play<'a>(round: &'a mut Option<Round>, plan: &Plan) -> Result<&'a mut Round, Rejected> {
    round
        .as_mut()
        .filter(|round| !round.is_resolved())
        .ok_or_else(|| {
            InvalidTransition {
                from: plan.from,
                trigger: plan.trigger,
            }
            .into()
        })
}
