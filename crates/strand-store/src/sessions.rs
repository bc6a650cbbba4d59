use tracing::instrument;

use strand_core::ids::SessionId;
use strand_core::messages::Message;
use strand_core::session::Session;
use strand_core::tokens::AccumulatedUsage;

use crate::database::Database;
use crate::error::StoreError;

/// Persists sessions keyed by their resume identifier. A loaded session is
/// bit-for-bit the one that was saved: transcript, usage totals, and the
/// compaction watermark all round-trip.
pub struct SessionRepo {
    db: Database,
}

impl SessionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, session), fields(session_id = %session.id()))]
    pub fn save(&self, session: &Session) -> Result<(), StoreError> {
        let transcript = serde_json::to_string(session.transcript())?;
        let usage = session.accumulated_usage();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (
                    id, backend, model, transcript,
                    total_input_tokens, total_output_tokens,
                    total_cache_read_tokens, total_cache_creation_tokens,
                    last_context_tokens, total_cost_cents, turn_count,
                    compaction_watermark, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(id) DO UPDATE SET
                    transcript = excluded.transcript,
                    total_input_tokens = excluded.total_input_tokens,
                    total_output_tokens = excluded.total_output_tokens,
                    total_cache_read_tokens = excluded.total_cache_read_tokens,
                    total_cache_creation_tokens = excluded.total_cache_creation_tokens,
                    last_context_tokens = excluded.last_context_tokens,
                    total_cost_cents = excluded.total_cost_cents,
                    turn_count = excluded.turn_count,
                    compaction_watermark = excluded.compaction_watermark,
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    session.id().as_str(),
                    session.backend(),
                    session.model(),
                    transcript,
                    usage.total_input_tokens,
                    usage.total_output_tokens,
                    usage.total_cache_read_tokens,
                    usage.total_cache_creation_tokens,
                    usage.last_context_tokens,
                    usage.total_cost_cents,
                    usage.turn_count,
                    session.compaction_watermark() as u64,
                    session.created_at(),
                    session.updated_at(),
                ],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(session_id = %id))]
    pub fn load(&self, id: &SessionId) -> Result<Session, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT backend, model, transcript,
                        total_input_tokens, total_output_tokens,
                        total_cache_read_tokens, total_cache_creation_tokens,
                        last_context_tokens, total_cost_cents, turn_count,
                        compaction_watermark, created_at, updated_at
                 FROM sessions WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            let row = match rows.next()? {
                Some(row) => row,
                None => return Err(StoreError::NotFound(format!("session {id}"))),
            };

            let backend: String = row.get(0)?;
            let model: String = row.get(1)?;
            let transcript_json: String = row.get(2)?;
            let transcript: Vec<Message> = serde_json::from_str(&transcript_json)?;
            let usage = AccumulatedUsage {
                total_input_tokens: row.get(3)?,
                total_output_tokens: row.get(4)?,
                total_cache_read_tokens: row.get(5)?,
                total_cache_creation_tokens: row.get(6)?,
                last_context_tokens: row.get(7)?,
                total_cost_cents: row.get(8)?,
                turn_count: row.get(9)?,
            };
            let watermark: u64 = row.get(10)?;
            let created_at: String = row.get(11)?;
            let updated_at: String = row.get(12)?;

            Ok(Session::from_parts(
                id.clone(),
                backend,
                model,
                transcript,
                usage,
                watermark as usize,
                created_at,
                updated_at,
            ))
        })
    }

    /// List saved session ids, most recently updated first.
    pub fn list(&self, limit: u32) -> Result<Vec<SessionId>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id FROM sessions ORDER BY updated_at DESC LIMIT ?1")?;
            let ids = stmt
                .query_map([limit], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(SessionId::from_raw)
                .collect();
            Ok(ids)
        })
    }

    pub fn delete(&self, id: &SessionId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let n = conn.execute("DELETE FROM sessions WHERE id = ?1", [id.as_str()])?;
            Ok(n > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_core::session::DigestSummarizer;
    use strand_core::tokens::{Pricing, TokenUsage};

    fn sample_session() -> Session {
        let mut session = Session::new("anthropic", "claude-sonnet-4-5");
        session.append(Message::user_text("hello"));
        session.append(Message::assistant_text("hi there"));
        session.record_usage(
            &TokenUsage {
                input_tokens: 100,
                output_tokens: 20,
                cache_read_tokens: 50,
                cache_creation_tokens: 0,
            },
            &Pricing {
                input_cents_per_mtok: 300.0,
                output_cents_per_mtok: 1500.0,
            },
        );
        session
    }

    #[test]
    fn save_and_load_round_trips() {
        let db = Database::in_memory().unwrap();
        let repo = SessionRepo::new(db);
        let session = sample_session();

        repo.save(&session).unwrap();
        let loaded = repo.load(session.id()).unwrap();

        assert_eq!(loaded.id(), session.id());
        assert_eq!(loaded.backend(), "anthropic");
        assert_eq!(loaded.model(), "claude-sonnet-4-5");
        assert_eq!(
            serde_json::to_string(loaded.transcript()).unwrap(),
            serde_json::to_string(session.transcript()).unwrap()
        );
        assert_eq!(loaded.compaction_watermark(), session.compaction_watermark());
        assert_eq!(
            loaded.accumulated_usage().total_input_tokens,
            session.accumulated_usage().total_input_tokens
        );
        assert_eq!(
            loaded.accumulated_usage().turn_count,
            session.accumulated_usage().turn_count
        );
        assert_eq!(loaded.usage().context_tokens, session.usage().context_tokens);
        assert_eq!(loaded.created_at(), session.created_at());
    }

    #[test]
    fn watermark_round_trips_after_compaction() {
        let db = Database::in_memory().unwrap();
        let repo = SessionRepo::new(db);

        let mut session = sample_session();
        for i in 0..6 {
            session.append(Message::user_text(format!("more {i}")));
        }
        assert!(session.compact(&DigestSummarizer::new(), 2));
        assert_eq!(session.compaction_watermark(), 1);

        repo.save(&session).unwrap();
        let loaded = repo.load(session.id()).unwrap();
        assert_eq!(loaded.compaction_watermark(), 1);
        assert_eq!(loaded.transcript().len(), session.transcript().len());
    }

    #[test]
    fn save_twice_updates_in_place() {
        let db = Database::in_memory().unwrap();
        let repo = SessionRepo::new(db);

        let mut session = sample_session();
        repo.save(&session).unwrap();

        session.append(Message::user_text("one more"));
        repo.save(&session).unwrap();

        let loaded = repo.load(session.id()).unwrap();
        assert_eq!(loaded.transcript().len(), 3);
        assert_eq!(repo.list(10).unwrap().len(), 1);
    }

    #[test]
    fn load_missing_session_not_found() {
        let db = Database::in_memory().unwrap();
        let repo = SessionRepo::new(db);
        let result = repo.load(&SessionId::new());
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn list_and_delete() {
        let db = Database::in_memory().unwrap();
        let repo = SessionRepo::new(db);

        let a = sample_session();
        let b = sample_session();
        repo.save(&a).unwrap();
        repo.save(&b).unwrap();

        let ids = repo.list(10).unwrap();
        assert_eq!(ids.len(), 2);

        assert!(repo.delete(a.id()).unwrap());
        assert!(!repo.delete(a.id()).unwrap());
        assert_eq!(repo.list(10).unwrap().len(), 1);
    }
}
