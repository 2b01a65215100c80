//! Round resolution.
//!
//! [`resolve_round`] is the only place score numbers are produced. It reads
//! the registry and the round, never the wall clock, so replaying the same
//! inputs always yields the same results.

use std::time::Duration;

use serde::Serialize;
use serde_with::{DurationMilliSeconds, serde_as};
use utoipa::ToSchema;

use crate::state::{
    game::{AnswerColor, GameSettings, Question, ScoringPolicy},
    ledger::Round,
    player::{Player, PlayerKey, PlayerRegistry},
};

/// Outcome of one joined player for a resolved round.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RoundResult {
    pub player: PlayerKey,
    /// Answer the player ended the round with.
    pub selection: Option<AnswerColor>,
    /// Whether the selection was committed before the round closed.
    pub committed: bool,
    pub correct: bool,
    /// Whether the player was latched as first committer (racing only).
    pub first_commit: bool,
    /// Base points of the question, zero when not correct.
    pub base_points: u32,
    /// Time bonus added before the streak multiplier (open speed only).
    pub speed_bonus: u32,
    /// Streak multiplier applied to base and speed bonus.
    pub multiplier: u32,
    /// Bonus for a correct first committer (racing only).
    pub first_bonus: u32,
    /// Points actually removed from a wrong first committer.
    pub penalty: u32,
    /// Net change of the score this round.
    pub points: i64,
    /// Cumulative score after the round.
    pub score: u32,
    /// Streak after the round.
    pub streak: u32,
    /// Delay between round start and commit.
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    #[serde(rename = "commit_ms")]
    #[schema(value_type = Option<u64>)]
    pub commit_time: Option<Duration>,
}

/// Score every joined player of `round` under the configured policy.
///
/// Results are returned in stable slot order. Players who never selected an
/// answer score nothing and lose their streak whatever the policy.
pub fn resolve_round(
    question: &Question,
    players: &PlayerRegistry,
    round: &Round,
    settings: &GameSettings,
) -> Vec<RoundResult> {
    players
        .joined()
        .map(|player| resolve_player(question, player, round, settings))
        .collect()
}

fn resolve_player(
    question: &Question,
    player: &Player,
    round: &Round,
    settings: &GameSettings,
) -> RoundResult {
    let entry = round.ledger.entry(player.key);
    let racing = settings.policy.is_racing();
    let first_commit = racing
        && round
            .first_commit
            .is_some_and(|first| first.player == player.key);

    let mut result = RoundResult {
        player: player.key,
        selection: entry.selection,
        committed: entry.is_committed(),
        correct: false,
        first_commit,
        base_points: 0,
        speed_bonus: 0,
        multiplier: 1,
        first_bonus: 0,
        penalty: 0,
        points: 0,
        score: player.score,
        streak: 0,
        commit_time: entry.committed_after,
    };

    let Some(selection) = entry.selection else {
        return result;
    };

    if question.is_correct(selection) {
        let base = question.base_points(settings);
        let speed_bonus = match (settings.policy, entry.committed_after) {
            (ScoringPolicy::OpenSpeed, Some(after)) => {
                speed_bonus(settings.speed_bonus_max, after, round.duration)
            }
            _ => 0,
        };
        let multiplier = settings.streak_factor(player.streak);
        let first_bonus = if first_commit { settings.first_bonus } else { 0 };
        let gained = base
            .saturating_add(speed_bonus)
            .saturating_mul(multiplier)
            .saturating_add(first_bonus);

        result.correct = true;
        result.base_points = base;
        result.speed_bonus = speed_bonus;
        result.multiplier = multiplier;
        result.first_bonus = first_bonus;
        result.points = i64::from(gained);
        result.score = player.score.saturating_add(gained);
        result.streak = player.streak.saturating_add(1);
    } else if first_commit {
        let penalty = settings.first_penalty.min(player.score);
        result.penalty = penalty;
        result.points = -i64::from(penalty);
        result.score = player.score - penalty;
    }

    result
}

/// `round(max * max(0, 1 - elapsed / total))`, zero for an empty window.
pub fn speed_bonus(max: u32, elapsed: Duration, total: Duration) -> u32 {
    if total.is_zero() {
        return 0;
    }
    let remaining_share = (1.0 - elapsed.as_secs_f64() / total.as_secs_f64()).max(0.0);
    (f64::from(max) * remaining_share).round() as u32
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::state::{
        game::AnswerOptions,
        ledger::FirstCommit,
    };

    fn question(correct: AnswerColor) -> Question {
        Question {
            id: 7,
            prompt: "Which ghost is red?".into(),
            answers: AnswerOptions {
                blue: "Blinky".into(),
                orange: "Clyde".into(),
                green: "Inky".into(),
                yellow: "Pinky".into(),
            },
            correct,
            points: Some(100),
        }
    }

    fn registry(keys: &[PlayerKey]) -> PlayerRegistry {
        let mut registry = PlayerRegistry::new();
        for key in keys {
            registry.join(*key);
        }
        registry
    }

    fn round(question: &Question) -> Round {
        Round::new(1, question.clone(), Instant::now(), Duration::from_secs(30))
    }

    fn commit(round: &mut Round, key: PlayerKey, color: AnswerColor, after_ms: u64) {
        round.ledger.select(key, color).unwrap();
        round
            .ledger
            .commit(key, Duration::from_millis(after_ms))
            .unwrap();
    }

    fn flat(streak: bool) -> GameSettings {
        GameSettings {
            policy: ScoringPolicy::OpenFlat,
            streak_multiplier: streak,
            ..GameSettings::default()
        }
    }

    #[test]
    fn open_flat_scores_independently() {
        let q = question(AnswerColor::Blue);
        let players = registry(&[PlayerKey::One, PlayerKey::Two]);
        let mut r = round(&q);
        commit(&mut r, PlayerKey::One, AnswerColor::Blue, 2_000);
        commit(&mut r, PlayerKey::Two, AnswerColor::Green, 1_000);

        let results = resolve_round(&q, &players, &r, &flat(false));
        assert_eq!(results.len(), 2);
        assert_eq!((results[0].score, results[0].streak), (100, 1));
        assert!(results[0].correct);
        assert_eq!((results[1].score, results[1].streak), (0, 0));
        assert!(!results[1].correct);
    }

    #[test]
    fn open_flat_applies_capped_streak_multiplier() {
        let q = question(AnswerColor::Yellow);
        let mut players = registry(&[PlayerKey::One]);
        players.get_mut(PlayerKey::One).streak = 2;
        let mut r = round(&q);
        commit(&mut r, PlayerKey::One, AnswerColor::Yellow, 500);

        let result = &resolve_round(&q, &players, &r, &flat(true))[0];
        assert_eq!(result.multiplier, 3);
        assert_eq!(result.points, 300);
        assert_eq!(result.streak, 3);

        players.get_mut(PlayerKey::One).streak = 9;
        let result = &resolve_round(&q, &players, &r, &flat(true))[0];
        assert_eq!(result.multiplier, 5);
        assert_eq!(result.points, 500);
    }

    #[test]
    fn racing_wrong_first_committer_is_clamped_at_zero() {
        let q = question(AnswerColor::Orange);
        let players = registry(&[PlayerKey::One, PlayerKey::Two]);
        let settings = GameSettings {
            policy: ScoringPolicy::Racing,
            first_bonus: 50,
            first_penalty: 50,
            ..GameSettings::default()
        };
        let mut r = round(&q);
        commit(&mut r, PlayerKey::One, AnswerColor::Blue, 1_000);
        r.first_commit = Some(FirstCommit {
            player: PlayerKey::One,
            after: Duration::from_millis(1_000),
        });
        commit(&mut r, PlayerKey::Two, AnswerColor::Orange, 2_000);

        let results = resolve_round(&q, &players, &r, &settings);
        assert!(results[0].first_commit);
        assert_eq!(results[0].score, 0);
        assert_eq!(results[0].penalty, 0);
        assert_eq!(results[0].points, 0);
        assert!(!results[1].first_commit);
        assert_eq!(results[1].score, 100);
        assert_eq!(results[1].first_bonus, 0);
    }

    #[test]
    fn racing_first_committer_bonus_and_partial_penalty() {
        let q = question(AnswerColor::Green);
        let mut players = registry(&[PlayerKey::Three, PlayerKey::Four]);
        players.get_mut(PlayerKey::Four).score = 30;
        let settings = GameSettings {
            policy: ScoringPolicy::Racing,
            streak_multiplier: false,
            ..GameSettings::default()
        };

        let mut r = round(&q);
        commit(&mut r, PlayerKey::Three, AnswerColor::Green, 900);
        r.first_commit = Some(FirstCommit {
            player: PlayerKey::Three,
            after: Duration::from_millis(900),
        });
        let result = &resolve_round(&q, &players, &r, &settings)[0];
        assert_eq!(result.points, 150);
        assert_eq!(result.first_bonus, 50);

        let mut r = round(&q);
        commit(&mut r, PlayerKey::Four, AnswerColor::Blue, 400);
        r.first_commit = Some(FirstCommit {
            player: PlayerKey::Four,
            after: Duration::from_millis(400),
        });
        let result = &resolve_round(&q, &players, &r, &settings)[1];
        assert_eq!(result.penalty, 30);
        assert_eq!(result.points, -30);
        assert_eq!(result.score, 0);
    }

    #[test]
    fn open_speed_adds_bonus_before_multiplier() {
        let q = question(AnswerColor::Blue);
        let mut players = registry(&[PlayerKey::One]);
        let mut settings = GameSettings {
            policy: ScoringPolicy::OpenSpeed,
            speed_bonus_max: 100,
            streak_multiplier: false,
            ..GameSettings::default()
        };
        let mut r = round(&q);
        commit(&mut r, PlayerKey::One, AnswerColor::Blue, 15_000);

        let result = &resolve_round(&q, &players, &r, &settings)[0];
        assert_eq!(result.speed_bonus, 50);
        assert_eq!(result.score, 150);

        settings.streak_multiplier = true;
        players.get_mut(PlayerKey::One).streak = 1;
        let result = &resolve_round(&q, &players, &r, &settings)[0];
        assert_eq!(result.points, 300);
    }

    #[test]
    fn uncommitted_selection_earns_no_speed_bonus() {
        let q = question(AnswerColor::Blue);
        let players = registry(&[PlayerKey::Two]);
        let settings = GameSettings {
            policy: ScoringPolicy::OpenSpeed,
            streak_multiplier: false,
            ..GameSettings::default()
        };
        let mut r = round(&q);
        r.ledger.select(PlayerKey::Two, AnswerColor::Blue).unwrap();

        let result = &resolve_round(&q, &players, &r, &settings)[0];
        assert!(!result.committed);
        assert_eq!(result.speed_bonus, 0);
        assert_eq!(result.points, 100);
    }

    #[test]
    fn unanswered_resets_streak_under_every_policy() {
        let q = question(AnswerColor::Blue);
        for policy in [
            ScoringPolicy::Racing,
            ScoringPolicy::OpenFlat,
            ScoringPolicy::OpenSpeed,
        ] {
            let mut players = registry(&[PlayerKey::One]);
            players.get_mut(PlayerKey::One).streak = 4;
            players.get_mut(PlayerKey::One).score = 900;
            let settings = GameSettings {
                policy,
                ..GameSettings::default()
            };
            let result = &resolve_round(&q, &players, &round(&q), &settings)[0];
            assert_eq!(result.selection, None);
            assert_eq!(result.streak, 0);
            assert_eq!(result.points, 0);
            assert_eq!(result.score, 900);
        }
    }

    #[test]
    fn speed_bonus_bounds() {
        let total = Duration::from_secs(30);
        assert_eq!(speed_bonus(100, Duration::ZERO, total), 100);
        assert_eq!(speed_bonus(100, Duration::from_secs(40), total), 0);
        assert_eq!(speed_bonus(100, Duration::from_secs(10), total), 67);
        assert_eq!(speed_bonus(100, Duration::from_secs(1), Duration::ZERO), 0);
    }

    #[test]
    fn unjoined_players_are_not_scored() {
        let q = question(AnswerColor::Blue);
        let players = registry(&[PlayerKey::Four]);
        let results = resolve_round(&q, &players, &round(&q), &flat(false));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].player, PlayerKey::Four);
    }
}
