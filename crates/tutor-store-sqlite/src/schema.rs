//! SQL schema for the tutor SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- ── Catalog ─────────────────────────────────────────────────────────────────
-- Written only by the import path; immutable for the lifetime of an attempt.

CREATE TABLE IF NOT EXISTS assessments (
    assessment_id       TEXT PRIMARY KEY,
    institution_id      TEXT NOT NULL,
    title               TEXT NOT NULL,
    case_text           TEXT NOT NULL,
    reference_solution  TEXT,
    questions_per_skill INTEGER
);

CREATE TABLE IF NOT EXISTS skills (
    skill_id      TEXT PRIMARY KEY,
    assessment_id TEXT NOT NULL REFERENCES assessments(assessment_id),
    position      INTEGER NOT NULL,
    name          TEXT NOT NULL,
    description   TEXT NOT NULL,
    weight        REAL NOT NULL DEFAULT 100
);

CREATE TABLE IF NOT EXISTS skill_levels (
    level_id    TEXT PRIMARY KEY,
    skill_id    TEXT NOT NULL REFERENCES skills(skill_id),
    level_order INTEGER NOT NULL,
    label       TEXT NOT NULL,
    description TEXT NOT NULL,
    standard    INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS level_settings (
    institution_id TEXT NOT NULL,
    label          TEXT NOT NULL,
    lower_limit    REAL NOT NULL,
    upper_limit    REAL NOT NULL,
    PRIMARY KEY (institution_id, label)
);

CREATE TABLE IF NOT EXISTS sources (
    source_id TEXT PRIMARY KEY,
    title     TEXT NOT NULL,
    status    TEXT NOT NULL    -- 'pending' | 'processing' | 'completed' | 'failed'
);

CREATE TABLE IF NOT EXISTS skill_sources (
    skill_id  TEXT NOT NULL REFERENCES skills(skill_id),
    source_id TEXT NOT NULL REFERENCES sources(source_id),
    PRIMARY KEY (skill_id, source_id)
);

-- `embedding` is TEXT (JSON array) or BLOB (packed little-endian f32)
-- depending on the producer.
CREATE TABLE IF NOT EXISTS chunks (
    chunk_id    TEXT PRIMARY KEY,
    source_id   TEXT NOT NULL REFERENCES sources(source_id),
    content     TEXT NOT NULL,
    embedding,
    page        INTEGER,
    section     TEXT,
    chunk_index INTEGER NOT NULL DEFAULT 0
);

-- ── Conversation ────────────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS attempts (
    attempt_id    TEXT PRIMARY KEY,
    assessment_id TEXT NOT NULL REFERENCES assessments(assessment_id),
    student_id    TEXT NOT NULL,
    status        TEXT NOT NULL,   -- 'in_progress' | 'completed'
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    completed_at  TEXT,
    final_grade   REAL
);

-- At most one open attempt per student and assessment.
CREATE UNIQUE INDEX IF NOT EXISTS attempts_open_idx
    ON attempts(assessment_id, student_id) WHERE status = 'in_progress';

-- Messages are strictly append-only. `seq` fixes log order even when two
-- rows share a timestamp.
CREATE TABLE IF NOT EXISTS messages (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id TEXT NOT NULL UNIQUE,
    attempt_id TEXT NOT NULL REFERENCES attempts(attempt_id),
    kind       TEXT NOT NULL,   -- 'student' | 'ai'
    subtype    TEXT NOT NULL,   -- 'regular' | 'clarification_question' | 'clarification_response'
    text       TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS results (
    result_id      TEXT PRIMARY KEY,
    attempt_id     TEXT NOT NULL REFERENCES attempts(attempt_id),
    skill_id       TEXT NOT NULL,
    skill_level_id TEXT NOT NULL,
    feedback       TEXT NOT NULL,
    grade          REAL,
    created_at     TEXT NOT NULL,
    UNIQUE (attempt_id, skill_id)
);

CREATE INDEX IF NOT EXISTS messages_attempt_idx ON messages(attempt_id);
CREATE INDEX IF NOT EXISTS chunks_source_idx    ON chunks(source_id);
CREATE INDEX IF NOT EXISTS skills_assessment_idx ON skills(assessment_id);

PRAGMA user_version = 1;
";
