//! Properties of the score submission call that must hold for every payload.

use proptest::prelude::*;
use serde_json::json;
use trivia_core::{CallerIdentity, LeaderboardRules};
use trivia_leaderboard::{ErrorCode, Leaderboard, LeaderboardStore, MemoryStore};

const ALLOWED: [i64; 4] = [10, 20, 50, 100];

fn board() -> Leaderboard<MemoryStore> {
    Leaderboard::new(MemoryStore::new(), LeaderboardRules::default())
}

fn caller() -> CallerIdentity {
    CallerIdentity::new("player-1")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// A question count outside the allowed set is invalid-argument and
    /// nothing is stored.
    #[test]
    fn disallowed_question_count_is_rejected(
        qc in any::<i32>().prop_filter("allowed count", |qc| !ALLOWED.contains(&(*qc as i64))),
        score in 0i64..100_000,
        correct in 0i64..100,
        started in 1i64..1_000_000,
        duration in 0i64..10_000_000,
    ) {
        let board = board();
        let payload = json!({
            "score": score,
            "questionCount": qc,
            "correctAnswers": correct,
            "startedAtMs": started,
            "endedAtMs": started + duration,
        });

        let err = board.submit(Some(&caller()), &payload).unwrap_err();
        prop_assert_eq!(err.code, ErrorCode::InvalidArgument);
        prop_assert_eq!(board.store().count().unwrap(), 0);
    }

    /// More correct answers than questions is invalid-argument.
    #[test]
    fn too_many_correct_answers_is_rejected(
        qc_index in 0usize..ALLOWED.len(),
        excess in 1i64..1_000,
        started in 1i64..1_000_000,
    ) {
        let qc = ALLOWED[qc_index];
        let board = board();
        let payload = json!({
            "score": 0,
            "questionCount": qc,
            "correctAnswers": qc + excess,
            "startedAtMs": started,
            "endedAtMs": started + qc * 10_000,
        });

        let err = board.submit(Some(&caller()), &payload).unwrap_err();
        prop_assert_eq!(err.code, ErrorCode::InvalidArgument);
        prop_assert_eq!(board.store().count().unwrap(), 0);
    }

    /// Resubmitting an accepted payload never creates a second record.
    #[test]
    fn valid_resubmission_keeps_one_record(
        qc_index in 0usize..ALLOWED.len(),
        secs_per_question in 2i64..=120,
        started in 1i64..1_000_000_000,
    ) {
        let qc = ALLOWED[qc_index];
        let board = board();
        let payload = json!({
            "score": qc * 500,
            "questionCount": qc,
            "correctAnswers": qc / 2,
            "startedAtMs": started,
            "endedAtMs": started + qc * secs_per_question * 1000,
        });

        prop_assert!(board.submit(Some(&caller()), &payload).is_ok());
        prop_assert!(board.submit(Some(&caller()), &payload).is_ok());
        prop_assert_eq!(board.store().count().unwrap(), 1);
    }

    /// Without a caller nothing else is looked at.
    #[test]
    fn unauthenticated_wins_over_everything(qc in any::<i64>(), score in any::<i64>()) {
        let board = board();
        let err = board
            .submit(None, &json!({ "questionCount": qc, "score": score }))
            .unwrap_err();
        prop_assert_eq!(err.code, ErrorCode::Unauthenticated);
    }
}
