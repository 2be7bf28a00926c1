//! Anti-cheat checks on a sanitized submission.
//!
//! Rules run in a fixed order and stop at the first failure.

use tracing::debug;
use trivia_core::LeaderboardRules;

use crate::error::SubmissionError;
use crate::submission::ScoreSubmission;

/// A submission that passed every rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSubmission {
    pub submission: ScoreSubmission,
    pub elapsed_secs: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ScoreValidator {
    rules: LeaderboardRules,
}

impl ScoreValidator {
    pub fn new(rules: LeaderboardRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &LeaderboardRules {
        &self.rules
    }

    /// Accepted elapsed-time window, in seconds, for a question count.
    pub fn elapsed_bounds(&self, question_count: i64) -> (i64, i64) {
        let min = self
            .rules
            .min_elapsed_floor_secs
            .max(question_count.saturating_mul(self.rules.min_secs_per_question));
        let max = question_count.saturating_mul(self.rules.max_secs_per_question);
        (min, max)
    }

    /// Highest accepted score for a question count.
    pub fn max_score(&self, question_count: i64) -> i64 {
        question_count.saturating_mul(self.rules.max_points_per_question)
    }

    pub fn validate(&self, submission: ScoreSubmission) -> Result<ValidSubmission, SubmissionError> {
        let qc = submission.question_count;

        if !self.rules.allowed_question_counts.contains(&qc) {
            return Err(SubmissionError::invalid_argument(format!(
                "questionCount {qc} is not one of {:?}",
                self.rules.allowed_question_counts
            )));
        }

        if submission.correct_answers > qc {
            return Err(SubmissionError::invalid_argument(format!(
                "correctAnswers {} exceeds questionCount {qc}",
                submission.correct_answers
            )));
        }

        let (started, ended) = match (submission.started_at_ms, submission.ended_at_ms) {
            (Some(started), Some(ended)) if ended != 0 && ended > started => (started, ended),
            _ => {
                return Err(SubmissionError::invalid_argument(
                    "startedAtMs and endedAtMs must be set and ordered",
                ))
            }
        };

        // ended > started, so integer division is floor
        let elapsed_secs = ended.saturating_sub(started) / 1000;
        let (min, max) = self.elapsed_bounds(qc);
        if elapsed_secs < min || elapsed_secs > max {
            return Err(SubmissionError::failed_precondition(format!(
                "elapsed {elapsed_secs}s outside [{min}, {max}] for {qc} questions"
            )));
        }

        let max_score = self.max_score(qc);
        if submission.score < 0 || submission.score > max_score {
            return Err(SubmissionError::failed_precondition(format!(
                "score {} outside [0, {max_score}]",
                submission.score
            )));
        }

        debug!(question_count = qc, elapsed_secs, score = submission.score, "Submission passed validation");
        Ok(ValidSubmission {
            submission,
            elapsed_secs,
        })
    }
}
