//! The score submission call and leaderboard reads.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};
use trivia_core::{CallerIdentity, LeaderboardRules, TriviaResult, Uid};

use crate::error::SubmissionError;
use crate::store::{Document, LeaderboardStore};
use crate::submission::RawSubmission;
use crate::validator::{ScoreValidator, ValidSubmission};

/// Source of server timestamps.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}

/// One leaderboard row as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub uid: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub score: i64,
    pub time: i64,
    pub question_count: i64,
    pub correct_answers: i64,
    pub longest_streak: i64,
    pub power_ups_used: i64,
    pub game_mode: String,
    /// Server time of the last accepted submission, in milliseconds.
    pub updated_at: i64,
}

impl LeaderboardEntry {
    fn from_valid(caller: &CallerIdentity, valid: ValidSubmission, updated_at: i64) -> Self {
        let s = valid.submission;
        Self {
            uid: caller.uid.to_string(),
            display_name: caller.display_name.clone(),
            photo_url: caller.photo_url.clone(),
            score: s.score,
            time: s.time,
            question_count: s.question_count,
            correct_answers: s.correct_answers,
            longest_streak: s.longest_streak,
            power_ups_used: s.power_ups_used,
            game_mode: s.game_mode,
            updated_at,
        }
    }

    fn into_document(self) -> TriviaResult<Document> {
        match serde_json::to_value(self)? {
            JsonValue::Object(map) => Ok(map),
            _ => Ok(Document::new()),
        }
    }

    fn from_document(doc: Document) -> TriviaResult<Self> {
        Ok(serde_json::from_value(JsonValue::Object(doc))?)
    }
}

/// Successful call result, `{ "ok": true }` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubmitResponse {
    pub ok: bool,
}

/// Score submission endpoint over a store.
pub struct Leaderboard<S> {
    store: S,
    validator: ScoreValidator,
    clock: Box<dyn Clock>,
}

impl<S: LeaderboardStore> Leaderboard<S> {
    pub fn new(store: S, rules: LeaderboardRules) -> Self {
        Self {
            store,
            validator: ScoreValidator::new(rules),
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn validator(&self) -> &ScoreValidator {
        &self.validator
    }

    /// Validate a raw payload and upsert the caller's record.
    ///
    /// Nothing is written unless every check passes. The record key is
    /// always the caller's uid.
    pub fn submit(
        &self,
        caller: Option<&CallerIdentity>,
        payload: &JsonValue,
    ) -> Result<SubmitResponse, SubmissionError> {
        let Some(caller) = caller else {
            warn!("Rejected unauthenticated score submission");
            return Err(SubmissionError::unauthenticated());
        };

        let submission = RawSubmission::from_value(payload).sanitize();
        let valid = self.validator.validate(submission).map_err(|err| {
            warn!(uid = %caller.uid, code = %err.code, reason = %err.message, "Rejected score submission");
            err
        })?;

        let score = valid.submission.score;
        let entry = LeaderboardEntry::from_valid(caller, valid, self.clock.now_millis());
        let doc = entry.into_document()?;

        self.store.merge(&caller.uid, doc).map_err(|err| {
            warn!(uid = %caller.uid, error = %err, "Failed to store score");
            SubmissionError::from(err)
        })?;

        info!(uid = %caller.uid, score, "Recorded score");
        Ok(SubmitResponse { ok: true })
    }

    /// `submit` with the result rendered as the wire JSON.
    pub fn handle_call(&self, caller: Option<&CallerIdentity>, payload: &JsonValue) -> JsonValue {
        match self.submit(caller, payload) {
            Ok(response) => json!(response),
            Err(err) => json!({ "error": err }),
        }
    }

    pub fn entry(&self, uid: &Uid) -> TriviaResult<Option<LeaderboardEntry>> {
        self.store
            .get(uid)?
            .map(LeaderboardEntry::from_document)
            .transpose()
    }

    pub fn top(&self, limit: usize) -> TriviaResult<Vec<LeaderboardEntry>> {
        self.store
            .top(limit)?
            .into_iter()
            .map(LeaderboardEntry::from_document)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::store::{MemoryStore, SqliteStore};
    use trivia_core::TriviaError;

    fn board() -> Leaderboard<MemoryStore> {
        Leaderboard::new(MemoryStore::new(), LeaderboardRules::default()).with_clock(FixedClock(1_700_000_000_000))
    }

    fn alice() -> CallerIdentity {
        CallerIdentity::new("alice").with_profile("Alice", None)
    }

    fn plausible() -> JsonValue {
        json!({
            "score": 500,
            "time": 40,
            "questionCount": 20,
            "correctAnswers": 18,
            "longestStreak": 7,
            "powerUpsUsed": 1,
            "gameMode": "classic",
            "startedAtMs": 0,
            "endedAtMs": 40000,
        })
    }

    #[test]
    fn test_accepts_plausible_submission() {
        let board = board();
        let response = board.submit(Some(&alice()), &plausible()).unwrap();
        assert!(response.ok);

        let entry = board.entry(&"alice".into()).unwrap().unwrap();
        assert_eq!(entry.score, 500);
        assert_eq!(entry.correct_answers, 18);
        assert_eq!(entry.display_name.as_deref(), Some("Alice"));
        assert_eq!(entry.updated_at, 1_700_000_000_000);
    }

    #[test]
    fn test_too_fast_is_failed_precondition() {
        let board = board();
        let err = board
            .submit(
                Some(&alice()),
                &json!({ "questionCount": 10, "startedAtMs": 1000, "endedAtMs": 1500 }),
            )
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::FailedPrecondition);
        assert_eq!(board.store().count().unwrap(), 0);
    }

    #[test]
    fn test_unauthenticated_checked_first() {
        let board = board();
        // a payload that would also fail validation
        let err = board.submit(None, &json!({ "questionCount": 3 })).unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthenticated);
        assert_eq!(board.store().count().unwrap(), 0);
    }

    #[test]
    fn test_resubmission_is_one_record() {
        let board = board();
        board.submit(Some(&alice()), &plausible()).unwrap();
        board.submit(Some(&alice()), &plausible()).unwrap();
        assert_eq!(board.store().count().unwrap(), 1);
    }

    #[test]
    fn test_key_is_caller_uid_not_payload() {
        let board = board();
        let mut payload = plausible();
        payload["uid"] = json!("mallory");
        board.submit(Some(&alice()), &payload).unwrap();

        assert!(board.entry(&"mallory".into()).unwrap().is_none());
        assert_eq!(board.entry(&"alice".into()).unwrap().unwrap().uid, "alice");
    }

    #[test]
    fn test_client_timestamps_not_stored() {
        let board = board();
        board.submit(Some(&alice()), &plausible()).unwrap();

        let doc = board.store().get(&"alice".into()).unwrap().unwrap();
        assert!(!doc.contains_key("startedAtMs"));
        assert!(!doc.contains_key("endedAtMs"));
    }

    #[test]
    fn test_merge_keeps_unrelated_fields() {
        let board = board();
        let mut extra = Document::new();
        extra.insert("country".to_string(), json!("KE"));
        board.store().merge(&"alice".into(), extra).unwrap();

        board.submit(Some(&alice()), &plausible()).unwrap();
        let doc = board.store().get(&"alice".into()).unwrap().unwrap();
        assert_eq!(doc["country"], "KE");
        assert_eq!(doc["score"], 500);
    }

    #[test]
    fn test_handle_call_wire_shape() {
        let board = board();
        assert_eq!(board.handle_call(Some(&alice()), &plausible()), json!({ "ok": true }));
        assert_eq!(
            board.handle_call(None, &plausible())["error"]["code"],
            "unauthenticated"
        );
    }

    #[test]
    fn test_top_entries() {
        let board = board();
        board.submit(Some(&alice()), &plausible()).unwrap();

        let mut better = plausible();
        better["score"] = json!(900);
        board.submit(Some(&CallerIdentity::new("bob")), &better).unwrap();

        let top = board.top(10).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].uid, "bob");
    }

    #[test]
    fn test_sqlite_backend() {
        let board = Leaderboard::new(SqliteStore::open_in_memory().unwrap(), LeaderboardRules::default());
        board.submit(Some(&alice()), &plausible()).unwrap();
        board.submit(Some(&alice()), &plausible()).unwrap();
        assert_eq!(board.store().count().unwrap(), 1);
        assert!(board.entry(&"alice".into()).unwrap().unwrap().updated_at > 0);
    }

    struct BrokenStore;

    impl LeaderboardStore for BrokenStore {
        fn merge(&self, _: &Uid, _: Document) -> TriviaResult<()> {
            Err(TriviaError::storage("offline"))
        }
        fn get(&self, _: &Uid) -> TriviaResult<Option<Document>> {
            Ok(None)
        }
        fn top(&self, _: usize) -> TriviaResult<Vec<Document>> {
            Ok(Vec::new())
        }
        fn count(&self) -> TriviaResult<usize> {
            Ok(0)
        }
    }

    #[test]
    fn test_storage_failure_is_internal() {
        let board = Leaderboard::new(BrokenStore, LeaderboardRules::default());
        let err = board.submit(Some(&alice()), &plausible()).unwrap_err();
        assert_eq!(err.code, ErrorCode::Internal);
    }
}
