//! [`SqliteStore`], the SQLite implementation of [`ConversationStore`] and
//! [`CatalogStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use tutor_core::{
  assessment::{AssessmentConfig, CatalogBundle, EmbeddingChunk, SkillLevelSetting},
  attempt::{AssessmentResult, Attempt, AttemptStatus, ConversationMessage, NewMessage},
  store::{CatalogStore, ConversationStore, Finalization, FinalizeOutcome},
};

use crate::{
  encode::{
    encode_dt, encode_embedding, encode_uuid, EmbeddingColumn, RawAssessment, RawAttempt,
    RawChunk, RawLevel, RawLevelSetting, RawMessage, RawResult, RawSkill, StoredEmbedding,
    ATTEMPT_COLUMNS, MESSAGE_COLUMNS, RESULT_COLUMNS,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An attempt store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

/// Row counts written by [`SqliteStore::import_bundle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
  pub skills:  usize,
  pub levels:  usize,
  pub sources: usize,
  pub chunks:  usize,
}

/// What the finalize transaction observed, before decoding.
enum RawFinalize {
  Missing,
  Existing(RawAttempt, Vec<RawResult>),
  Inserted(RawAttempt, Vec<RawResult>),
}

fn read_attempt(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<RawAttempt>> {
  conn
    .query_row(
      &format!("SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE attempt_id = ?1"),
      rusqlite::params![id],
      RawAttempt::from_row,
    )
    .optional()
}

fn read_results(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Vec<RawResult>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {RESULT_COLUMNS} FROM results WHERE attempt_id = ?1 ORDER BY rowid"
  ))?;
  stmt
    .query_map(rusqlite::params![id], RawResult::from_row)?
    .collect()
}

fn decode_results(raws: Vec<RawResult>) -> Result<Vec<AssessmentResult>> {
  raws.into_iter().map(RawResult::into_result).collect()
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Upsert an assessment, its rubric, the institution's level settings and
  /// the linked source chunks in one transaction.
  ///
  /// This stands in for the configuration and ingestion collaborators that
  /// normally own these tables.
  pub async fn import_bundle(&self, bundle: CatalogBundle) -> Result<ImportSummary> {
    let a = &bundle.assessment;
    for skill in &a.skills {
      skill.validate()?;
    }

    let assessment_row = (
      encode_uuid(a.assessment_id),
      encode_uuid(a.institution_id),
      a.title.clone(),
      a.case_text.clone(),
      a.reference_solution.clone(),
      a.questions_per_skill,
    );
    let assessment_id = assessment_row.0.clone();

    let mut skill_rows = Vec::with_capacity(a.skills.len());
    let mut level_rows = Vec::new();
    for (position, skill) in a.skills.iter().enumerate() {
      let skill_id = encode_uuid(skill.skill_id);
      for level in &skill.levels {
        level_rows.push((
          encode_uuid(level.level_id),
          skill_id.clone(),
          level.order,
          level.label.clone(),
          level.description.clone(),
          level.standard,
        ));
      }
      skill_rows.push((
        skill_id,
        position as i64,
        skill.name.clone(),
        skill.description.clone(),
        skill.weight,
      ));
    }

    let setting_rows: Vec<(String, String, f64, f64)> = bundle
      .level_settings
      .iter()
      .map(|s| (encode_uuid(s.institution_id), s.label.clone(), s.lower_limit, s.upper_limit))
      .collect();

    let mut source_rows = Vec::with_capacity(bundle.sources.len());
    let mut link_rows = Vec::new();
    let mut chunk_rows: Vec<(String, String, String, EmbeddingColumn, Option<u32>, Option<String>, u32)> =
      Vec::new();
    for source in &bundle.sources {
      let source_id = encode_uuid(source.source_id);
      for skill_id in &source.skill_ids {
        link_rows.push((encode_uuid(*skill_id), source_id.clone()));
      }
      for chunk in &source.chunks {
        chunk_rows.push((
          encode_uuid(chunk.chunk_id),
          source_id.clone(),
          chunk.content.clone(),
          encode_embedding(&chunk.embedding)?,
          chunk.metadata.page,
          chunk.metadata.section.clone(),
          chunk.metadata.chunk_index,
        ));
      }
      source_rows.push((source_id, source.title.clone(), source.status.as_str()));
    }

    let summary = ImportSummary {
      skills:  skill_rows.len(),
      levels:  level_rows.len(),
      sources: source_rows.len(),
      chunks:  chunk_rows.len(),
    };

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let (id, institution, title, case_text, solution, qps) = assessment_row;
        tx.execute(
          "INSERT INTO assessments (
             assessment_id, institution_id, title, case_text,
             reference_solution, questions_per_skill
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT(assessment_id) DO UPDATE SET
             institution_id      = excluded.institution_id,
             title               = excluded.title,
             case_text           = excluded.case_text,
             reference_solution  = excluded.reference_solution,
             questions_per_skill = excluded.questions_per_skill",
          rusqlite::params![id, institution, title, case_text, solution, qps],
        )?;

        for (skill_id, position, name, description, weight) in skill_rows {
          tx.execute(
            "INSERT INTO skills (skill_id, assessment_id, position, name, description, weight)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(skill_id) DO UPDATE SET
               assessment_id = excluded.assessment_id,
               position      = excluded.position,
               name          = excluded.name,
               description   = excluded.description,
               weight        = excluded.weight",
            rusqlite::params![skill_id, assessment_id, position, name, description, weight],
          )?;
        }

        for (level_id, skill_id, order, label, description, standard) in level_rows {
          tx.execute(
            "INSERT INTO skill_levels (level_id, skill_id, level_order, label, description, standard)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(level_id) DO UPDATE SET
               skill_id    = excluded.skill_id,
               level_order = excluded.level_order,
               label       = excluded.label,
               description = excluded.description,
               standard    = excluded.standard",
            rusqlite::params![level_id, skill_id, order, label, description, standard],
          )?;
        }

        for (institution, label, lower, upper) in setting_rows {
          tx.execute(
            "INSERT INTO level_settings (institution_id, label, lower_limit, upper_limit)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(institution_id, label) DO UPDATE SET
               lower_limit = excluded.lower_limit,
               upper_limit = excluded.upper_limit",
            rusqlite::params![institution, label, lower, upper],
          )?;
        }

        for (source_id, title, status) in source_rows {
          tx.execute(
            "INSERT INTO sources (source_id, title, status) VALUES (?1, ?2, ?3)
             ON CONFLICT(source_id) DO UPDATE SET
               title  = excluded.title,
               status = excluded.status",
            rusqlite::params![source_id, title, status],
          )?;
        }

        for (skill_id, source_id) in link_rows {
          tx.execute(
            "INSERT OR IGNORE INTO skill_sources (skill_id, source_id) VALUES (?1, ?2)",
            rusqlite::params![skill_id, source_id],
          )?;
        }

        for (chunk_id, source_id, content, embedding, page, section, index) in chunk_rows {
          tx.execute(
            "INSERT INTO chunks (chunk_id, source_id, content, embedding, page, section, chunk_index)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(chunk_id) DO UPDATE SET
               source_id   = excluded.source_id,
               content     = excluded.content,
               embedding   = excluded.embedding,
               page        = excluded.page,
               section     = excluded.section,
               chunk_index = excluded.chunk_index",
            rusqlite::params![chunk_id, source_id, content, embedding, page, section, index],
          )?;
        }

        tx.commit()?;
        Ok(())
      })
      .await?;

    debug!(?summary, "catalog bundle imported");
    Ok(summary)
  }
}

// ─── ConversationStore impl ──────────────────────────────────────────────────

impl ConversationStore for SqliteStore {
  type Error = Error;

  async fn open_attempt(&self, assessment_id: Uuid, student_id: Uuid) -> Result<Attempt> {
    let new_id     = encode_uuid(Uuid::new_v4());
    let assessment = encode_uuid(assessment_id);
    let student    = encode_uuid(student_id);
    let now        = encode_dt(Utc::now());

    let raw: RawAttempt = self
      .conn
      .call(move |conn| {
        // The partial unique index turns a concurrent second open into a no-op.
        conn.execute(
          "INSERT OR IGNORE INTO attempts (
             attempt_id, assessment_id, student_id, status, created_at, updated_at
           ) VALUES (?1, ?2, ?3, 'in_progress', ?4, ?4)",
          rusqlite::params![new_id, assessment, student, now],
        )?;
        Ok(conn.query_row(
          &format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts
             WHERE assessment_id = ?1 AND student_id = ?2 AND status = 'in_progress'"
          ),
          rusqlite::params![assessment, student],
          RawAttempt::from_row,
        )?)
      })
      .await?;

    raw.into_attempt()
  }

  async fn latest_attempt(&self, assessment_id: Uuid, student_id: Uuid) -> Result<Option<Attempt>> {
    let assessment = encode_uuid(assessment_id);
    let student    = encode_uuid(student_id);

    let raw: Option<RawAttempt> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {ATTEMPT_COLUMNS} FROM attempts
               WHERE assessment_id = ?1 AND student_id = ?2
               ORDER BY created_at DESC, rowid DESC LIMIT 1"
            ),
            rusqlite::params![assessment, student],
            RawAttempt::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawAttempt::into_attempt).transpose()
  }

  async fn get_attempt(&self, attempt_id: Uuid) -> Result<Option<Attempt>> {
    let id = encode_uuid(attempt_id);
    let raw = self.conn.call(move |conn| Ok(read_attempt(conn, &id)?)).await?;
    raw.map(RawAttempt::into_attempt).transpose()
  }

  async fn append_message(&self, input: NewMessage) -> Result<ConversationMessage> {
    let message = ConversationMessage {
      message_id: Uuid::new_v4(),
      attempt_id: input.attempt_id,
      kind:       input.kind,
      subtype:    input.subtype,
      text:       input.text,
      created_at: Utc::now(),
    };

    let message_id = encode_uuid(message.message_id);
    let attempt_id = encode_uuid(message.attempt_id);
    let kind       = message.kind.as_str();
    let subtype    = message.subtype.as_str();
    let text       = message.text.clone();
    let at         = encode_dt(message.created_at);

    let found: bool = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let touched = tx.execute(
          "UPDATE attempts SET updated_at = ?2 WHERE attempt_id = ?1",
          rusqlite::params![attempt_id, at],
        )?;
        if touched == 0 {
          return Ok(false);
        }
        tx.execute(
          "INSERT INTO messages (message_id, attempt_id, kind, subtype, text, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![message_id, attempt_id, kind, subtype, text, at],
        )?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !found {
      return Err(Error::AttemptNotFound(message.attempt_id));
    }
    Ok(message)
  }

  async fn list_messages(&self, attempt_id: Uuid) -> Result<Vec<ConversationMessage>> {
    let id = encode_uuid(attempt_id);

    let raws: Vec<RawMessage> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {MESSAGE_COLUMNS} FROM messages WHERE attempt_id = ?1 ORDER BY seq"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id], RawMessage::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMessage::into_message).collect()
  }

  async fn list_results(&self, attempt_id: Uuid) -> Result<Vec<AssessmentResult>> {
    let id = encode_uuid(attempt_id);
    let raws = self.conn.call(move |conn| Ok(read_results(conn, &id)?)).await?;
    decode_results(raws)
  }

  async fn complete_attempt(&self, input: Finalization) -> Result<FinalizeOutcome> {
    let now         = Utc::now();
    let attempt_id  = encode_uuid(input.attempt_id);
    let at          = encode_dt(now);
    let final_grade = input.final_grade;

    let results: Vec<(String, String, String, String, Option<f64>)> = input
      .results
      .iter()
      .map(|r| {
        (
          encode_uuid(Uuid::new_v4()),
          encode_uuid(r.skill_id),
          encode_uuid(r.skill_level_id),
          r.feedback.clone(),
          r.grade,
        )
      })
      .collect();

    let closing = input.closing_message.map(|m| {
      (
        encode_uuid(Uuid::new_v4()),
        m.kind.as_str(),
        m.subtype.as_str(),
        m.text,
      )
    });

    let raw: RawFinalize = self
      .conn
      .call(move |conn| {
        // IMMEDIATE takes the write lock up front, so the existence check
        // and the inserts cannot interleave with another finalizer.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(attempt) = read_attempt(&tx, &attempt_id)? else {
          return Ok(RawFinalize::Missing);
        };
        let existing = read_results(&tx, &attempt_id)?;
        if attempt.status == AttemptStatus::Completed.as_str() || !existing.is_empty() {
          return Ok(RawFinalize::Existing(attempt, existing));
        }

        for (result_id, skill_id, level_id, feedback, grade) in results {
          tx.execute(
            "INSERT INTO results (
               result_id, attempt_id, skill_id, skill_level_id, feedback, grade, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![result_id, attempt_id, skill_id, level_id, feedback, grade, at],
          )?;
        }

        if let Some((message_id, kind, subtype, text)) = closing {
          tx.execute(
            "INSERT INTO messages (message_id, attempt_id, kind, subtype, text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![message_id, attempt_id, kind, subtype, text, at],
          )?;
        }

        tx.execute(
          "UPDATE attempts
           SET status = 'completed', completed_at = ?2, updated_at = ?2, final_grade = ?3
           WHERE attempt_id = ?1",
          rusqlite::params![attempt_id, at, final_grade],
        )?;

        let attempt = read_attempt(&tx, &attempt_id)?
          .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        let stored = read_results(&tx, &attempt_id)?;
        tx.commit()?;
        Ok(RawFinalize::Inserted(attempt, stored))
      })
      .await?;

    match raw {
      RawFinalize::Missing => Err(Error::AttemptNotFound(input.attempt_id)),
      RawFinalize::Existing(attempt, results) => {
        debug!(attempt_id = %input.attempt_id, "attempt already finalized");
        Ok(FinalizeOutcome::AlreadyFinalized {
          attempt: attempt.into_attempt()?,
          results: decode_results(results)?,
        })
      }
      RawFinalize::Inserted(attempt, results) => Ok(FinalizeOutcome::Inserted {
        attempt: attempt.into_attempt()?,
        results: decode_results(results)?,
      }),
    }
  }
}

// ─── CatalogStore impl ───────────────────────────────────────────────────────

impl CatalogStore for SqliteStore {
  type Error = Error;

  async fn get_assessment(&self, assessment_id: Uuid) -> Result<Option<AssessmentConfig>> {
    let id = encode_uuid(assessment_id);

    let raw: Option<RawAssessment> = self
      .conn
      .call(move |conn| {
        let Some(mut assessment) = conn
          .query_row(
            "SELECT assessment_id, institution_id, title, case_text,
                    reference_solution, questions_per_skill
             FROM assessments WHERE assessment_id = ?1",
            rusqlite::params![id],
            |row| {
              Ok(RawAssessment {
                assessment_id:       row.get(0)?,
                institution_id:      row.get(1)?,
                title:               row.get(2)?,
                case_text:           row.get(3)?,
                reference_solution:  row.get(4)?,
                questions_per_skill: row.get(5)?,
                skills:              Vec::new(),
              })
            },
          )
          .optional()?
        else {
          return Ok(None);
        };

        let mut skills_stmt = conn.prepare(
          "SELECT skill_id, name, description, weight FROM skills
           WHERE assessment_id = ?1 ORDER BY position",
        )?;
        let mut skills = skills_stmt
          .query_map(rusqlite::params![id], |row| {
            Ok(RawSkill {
              skill_id:    row.get(0)?,
              name:        row.get(1)?,
              description: row.get(2)?,
              weight:      row.get(3)?,
              levels:      Vec::new(),
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut levels_stmt = conn.prepare(
          "SELECT level_id, level_order, label, description, standard FROM skill_levels
           WHERE skill_id = ?1 ORDER BY level_order",
        )?;
        for skill in &mut skills {
          skill.levels = levels_stmt
            .query_map(rusqlite::params![skill.skill_id], |row| {
              Ok(RawLevel {
                level_id:    row.get(0)?,
                order:       row.get(1)?,
                label:       row.get(2)?,
                description: row.get(3)?,
                standard:    row.get(4)?,
              })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        }

        assessment.skills = skills;
        Ok(Some(assessment))
      })
      .await?;

    raw.map(RawAssessment::into_assessment).transpose()
  }

  async fn level_settings(&self, institution_id: Uuid) -> Result<Vec<SkillLevelSetting>> {
    let id = encode_uuid(institution_id);

    let raws: Vec<RawLevelSetting> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT institution_id, label, lower_limit, upper_limit FROM level_settings
           WHERE institution_id = ?1 ORDER BY lower_limit",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id], |row| {
            Ok(RawLevelSetting {
              institution_id: row.get(0)?,
              label:          row.get(1)?,
              lower_limit:    row.get(2)?,
              upper_limit:    row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawLevelSetting::into_setting).collect()
  }

  async fn candidate_chunks(&self, assessment_id: Uuid) -> Result<Vec<EmbeddingChunk>> {
    let id = encode_uuid(assessment_id);

    let raws: Vec<RawChunk> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT c.chunk_id, c.source_id, c.content, c.embedding,
                  c.page, c.section, c.chunk_index
           FROM chunks c
           JOIN sources so ON so.source_id = c.source_id
           WHERE so.status = 'completed'
             AND c.source_id IN (
               SELECT ss.source_id FROM skill_sources ss
               JOIN skills sk ON sk.skill_id = ss.skill_id
               WHERE sk.assessment_id = ?1
             )
           ORDER BY c.source_id, c.chunk_index",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id], |row| {
            Ok(RawChunk {
              chunk_id:    row.get(0)?,
              source_id:   row.get(1)?,
              content:     row.get(2)?,
              embedding:   StoredEmbedding::from_value(row.get_ref(3)?),
              page:        row.get(4)?,
              section:     row.get(5)?,
              chunk_index: row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawChunk::into_chunk).collect()
  }
}
