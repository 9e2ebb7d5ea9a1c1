//! Integration tests for `SqliteStore` against an in-memory database.

use tutor_core::{
  assessment::{
    AssessmentConfig, CatalogBundle, ChunkBundle, ChunkMetadata, EmbeddingPayload, Skill,
    SkillLevel, SkillLevelSetting, SourceBundle, SourceStatus,
  },
  attempt::{AttemptStatus, MessageSubtype, MessageType, NewMessage, NewResult},
  retrieval::{decode_embedding, encode_packed},
  store::{CatalogStore, ConversationStore, Finalization, FinalizeOutcome},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn level(order: i32, label: &str, standard: bool) -> SkillLevel {
  SkillLevel {
    level_id: Uuid::new_v4(),
    order,
    label: label.into(),
    description: format!("{label} description"),
    standard,
  }
}

fn skill(name: &str, weight: f64) -> Skill {
  Skill {
    skill_id: Uuid::new_v4(),
    name: name.into(),
    description: format!("{name} description"),
    // Declared out of order on purpose.
    levels: vec![level(3, "Advanced", false), level(1, "Beginner", false), level(2, "Competent", true)],
    weight,
  }
}

fn chunk(index: u32, embedding: EmbeddingPayload) -> ChunkBundle {
  ChunkBundle {
    chunk_id: Uuid::new_v4(),
    content: format!("chunk {index}"),
    embedding,
    metadata: ChunkMetadata { page: Some(index + 1), section: None, chunk_index: index },
  }
}

fn bundle() -> CatalogBundle {
  let institution_id = Uuid::new_v4();
  let skills = vec![skill("Market analysis", 60.0), skill("Financial planning", 40.0)];
  let linked = skills[0].skill_id;

  CatalogBundle {
    assessment:     AssessmentConfig {
      assessment_id: Uuid::new_v4(),
      institution_id,
      title: "Coffee Shop Expansion".into(),
      case_text: "A coffee chain considers a new city.".into(),
      reference_solution: None,
      questions_per_skill: Some(2),
      skills,
    },
    level_settings: vec![
      SkillLevelSetting { institution_id, label: "Beginner".into(), lower_limit: 1.0, upper_limit: 3.0 },
      SkillLevelSetting { institution_id, label: "Competent".into(), lower_limit: 3.0, upper_limit: 5.0 },
    ],
    sources:        vec![
      SourceBundle {
        source_id: Uuid::new_v4(),
        title:     "Strategy handbook".into(),
        status:    SourceStatus::Completed,
        skill_ids: vec![linked],
        chunks:    vec![
          chunk(0, EmbeddingPayload::Values(vec![1.0, 0.0])),
          chunk(1, EmbeddingPayload::Text("\"[0.0,1.0]\"".into())),
          chunk(2, EmbeddingPayload::Packed(encode_packed(&[0.5, 0.5]))),
        ],
      },
      SourceBundle {
        source_id: Uuid::new_v4(),
        title:     "Still processing".into(),
        status:    SourceStatus::Processing,
        skill_ids: vec![linked],
        chunks:    vec![chunk(0, EmbeddingPayload::Values(vec![1.0, 1.0]))],
      },
      SourceBundle {
        source_id: Uuid::new_v4(),
        title:     "Unrelated".into(),
        status:    SourceStatus::Completed,
        skill_ids: vec![Uuid::new_v4()],
        chunks:    vec![chunk(0, EmbeddingPayload::Values(vec![1.0, 1.0]))],
      },
    ],
  }
}

/// Import only the assessment rubric. The third source above links to a
/// skill that does not exist, which the foreign key rejects.
async fn seeded() -> (SqliteStore, AssessmentConfig) {
  let s = store().await;
  let mut b = bundle();
  b.sources.truncate(2);
  let assessment = b.assessment.clone();
  s.import_bundle(b).await.unwrap();
  (s, assessment)
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn import_and_get_assessment_sorts_levels() {
  let (s, expected) = seeded().await;

  let got = s.get_assessment(expected.assessment_id).await.unwrap().unwrap();
  assert_eq!(got.title, expected.title);
  assert_eq!(got.questions_per_skill, Some(2));
  assert_eq!(got.skills.len(), 2);
  assert_eq!(got.skills[0].skill_id, expected.skills[0].skill_id);
  assert_eq!(got.skills[0].weight, 60.0);

  let orders: Vec<i32> = got.skills[0].levels.iter().map(|l| l.order).collect();
  assert_eq!(orders, vec![1, 2, 3]);
  assert_eq!(got.skills[0].standard_level().unwrap().label, "Competent");
}

#[tokio::test]
async fn get_assessment_missing_returns_none() {
  let s = store().await;
  assert!(s.get_assessment(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn import_is_an_upsert() {
  let s = store().await;
  let mut b = bundle();
  b.sources.truncate(2);
  s.import_bundle(b.clone()).await.unwrap();

  b.assessment.title = "Renamed".into();
  let summary = s.import_bundle(b.clone()).await.unwrap();
  assert_eq!(summary.skills, 2);
  assert_eq!(summary.levels, 6);
  assert_eq!(summary.chunks, 4);

  let got = s.get_assessment(b.assessment.assessment_id).await.unwrap().unwrap();
  assert_eq!(got.title, "Renamed");
  assert_eq!(got.skills.len(), 2);
}

#[tokio::test]
async fn import_rejects_skill_without_levels() {
  let s = store().await;
  let mut b = bundle();
  b.assessment.skills[1].levels.clear();
  let err = s.import_bundle(b).await.unwrap_err();
  assert!(matches!(err, Error::Core(tutor_core::Error::EmptySkill(_))));
}

#[tokio::test]
async fn import_rejects_skill_without_exactly_one_standard_level() {
  let s = store().await;

  let mut none = bundle();
  for level in &mut none.assessment.skills[1].levels {
    level.standard = false;
  }
  let skill_id = none.assessment.skills[1].skill_id;
  let err = s.import_bundle(none).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(tutor_core::Error::StandardLevel { skill_id: id, count: 0 }) if id == skill_id
  ));

  let mut two = bundle();
  two.assessment.skills[0].levels[0].standard = true;
  let assessment_id = two.assessment.assessment_id;
  let err = s.import_bundle(two).await.unwrap_err();
  assert!(matches!(err, Error::Core(tutor_core::Error::StandardLevel { count: 2, .. })));

  // Nothing from either rejected bundle was written.
  assert!(s.get_assessment(assessment_id).await.unwrap().is_none());
}

#[tokio::test]
async fn level_settings_are_scoped_to_the_institution() {
  let (s, a) = seeded().await;
  let settings = s.level_settings(a.institution_id).await.unwrap();
  assert_eq!(settings.len(), 2);
  assert_eq!(settings[0].label, "Beginner");
  assert!(s.level_settings(Uuid::new_v4()).await.unwrap().is_empty());
}

#[tokio::test]
async fn candidate_chunks_only_from_completed_linked_sources() {
  let (s, a) = seeded().await;
  let chunks = s.candidate_chunks(a.assessment_id).await.unwrap();
  assert_eq!(chunks.len(), 3);
  assert!(chunks.iter().all(|c| c.content.starts_with("chunk")));
  assert_eq!(chunks[1].metadata.page, Some(2));
}

#[tokio::test]
async fn heterogeneous_embeddings_survive_storage() {
  let (s, a) = seeded().await;
  let chunks = s.candidate_chunks(a.assessment_id).await.unwrap();

  assert!(matches!(chunks[0].embedding, EmbeddingPayload::Text(_)));
  assert!(matches!(chunks[2].embedding, EmbeddingPayload::Packed(_)));

  let decoded: Vec<Vec<f32>> =
    chunks.iter().map(|c| decode_embedding(&c.embedding).unwrap()).collect();
  assert_eq!(decoded, vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]]);
}

// ─── Attempts & messages ─────────────────────────────────────────────────────

#[tokio::test]
async fn open_attempt_reuses_the_in_progress_attempt() {
  let (s, a) = seeded().await;
  let student = Uuid::new_v4();

  let first = s.open_attempt(a.assessment_id, student).await.unwrap();
  let second = s.open_attempt(a.assessment_id, student).await.unwrap();
  assert_eq!(first.attempt_id, second.attempt_id);
  assert_eq!(first.status, AttemptStatus::InProgress);

  let other = s.open_attempt(a.assessment_id, Uuid::new_v4()).await.unwrap();
  assert_ne!(other.attempt_id, first.attempt_id);

  let latest = s.latest_attempt(a.assessment_id, student).await.unwrap().unwrap();
  assert_eq!(latest.attempt_id, first.attempt_id);
}

#[tokio::test]
async fn concurrent_opens_yield_one_attempt() {
  let (s, a) = seeded().await;
  let student = Uuid::new_v4();
  let (x, y) = tokio::join!(
    s.open_attempt(a.assessment_id, student),
    s.open_attempt(a.assessment_id, student)
  );
  assert_eq!(x.unwrap().attempt_id, y.unwrap().attempt_id);
}

#[tokio::test]
async fn messages_come_back_in_append_order() {
  let (s, a) = seeded().await;
  let attempt = s.open_attempt(a.assessment_id, Uuid::new_v4()).await.unwrap();
  let id = attempt.attempt_id;

  s.append_message(NewMessage::student(id, MessageSubtype::Regular, "one")).await.unwrap();
  s.append_message(NewMessage::ai(id, MessageSubtype::ClarificationQuestion, "two?"))
    .await
    .unwrap();
  s.append_message(NewMessage::student(id, MessageSubtype::ClarificationResponse, "three"))
    .await
    .unwrap();

  let log = s.list_messages(id).await.unwrap();
  let texts: Vec<&str> = log.iter().map(|m| m.text.as_str()).collect();
  assert_eq!(texts, vec!["one", "two?", "three"]);
  assert_eq!(log[1].kind, MessageType::Ai);
  assert_eq!(log[1].subtype, MessageSubtype::ClarificationQuestion);
  assert_eq!(log[2].subtype, MessageSubtype::ClarificationResponse);

  let refreshed = s.get_attempt(id).await.unwrap().unwrap();
  assert!(refreshed.updated_at >= attempt.updated_at);
}

#[tokio::test]
async fn append_to_unknown_attempt_fails() {
  let s = store().await;
  let missing = Uuid::new_v4();
  let err = s
    .append_message(NewMessage::student(missing, MessageSubtype::Regular, "hi"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::AttemptNotFound(id) if id == missing));
}

// ─── Finalization ────────────────────────────────────────────────────────────

fn finalization(attempt_id: Uuid, a: &AssessmentConfig) -> Finalization {
  Finalization {
    attempt_id,
    results: a
      .skills
      .iter()
      .map(|sk| NewResult {
        skill_id:       sk.skill_id,
        skill_level_id: sk.standard_level().unwrap().level_id,
        feedback:       format!("{} met the standard", sk.name),
        grade:          Some(4.0),
      })
      .collect(),
    final_grade: Some(4.0),
    closing_message: Some(NewMessage::ai(attempt_id, MessageSubtype::Regular, "Well done.")),
  }
}

#[tokio::test]
async fn complete_attempt_writes_results_status_and_closing_message() {
  let (s, a) = seeded().await;
  let attempt = s.open_attempt(a.assessment_id, Uuid::new_v4()).await.unwrap();

  let outcome = s.complete_attempt(finalization(attempt.attempt_id, &a)).await.unwrap();
  assert!(outcome.was_inserted());
  assert_eq!(outcome.results().len(), 2);
  assert_eq!(outcome.attempt().status, AttemptStatus::Completed);
  assert_eq!(outcome.attempt().final_grade, Some(4.0));
  assert!(outcome.attempt().completed_at.is_some());

  let log = s.list_messages(attempt.attempt_id).await.unwrap();
  assert_eq!(log.last().unwrap().text, "Well done.");
}

#[tokio::test]
async fn second_finalize_returns_stored_results_unchanged() {
  let (s, a) = seeded().await;
  let attempt = s.open_attempt(a.assessment_id, Uuid::new_v4()).await.unwrap();
  let first = s.complete_attempt(finalization(attempt.attempt_id, &a)).await.unwrap();

  let mut retry = finalization(attempt.attempt_id, &a);
  for r in &mut retry.results {
    r.feedback = "different".into();
    r.grade = Some(1.0);
  }
  retry.final_grade = Some(1.0);
  let second = s.complete_attempt(retry).await.unwrap();

  assert!(matches!(second, FinalizeOutcome::AlreadyFinalized { .. }));
  assert_eq!(second.results(), first.results());
  assert_eq!(second.attempt().final_grade, Some(4.0));
  assert_eq!(s.list_results(attempt.attempt_id).await.unwrap().len(), 2);
  // The closing message is written once.
  assert_eq!(s.list_messages(attempt.attempt_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_finalizers_insert_once() {
  let (s, a) = seeded().await;
  let attempt = s.open_attempt(a.assessment_id, Uuid::new_v4()).await.unwrap();

  let (x, y) = tokio::join!(
    s.complete_attempt(finalization(attempt.attempt_id, &a)),
    s.complete_attempt(finalization(attempt.attempt_id, &a))
  );
  let (x, y) = (x.unwrap(), y.unwrap());
  assert!(x.was_inserted() ^ y.was_inserted());
  assert_eq!(s.list_results(attempt.attempt_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn completed_attempt_is_latest_and_a_new_one_can_open() {
  let (s, a) = seeded().await;
  let student = Uuid::new_v4();
  let attempt = s.open_attempt(a.assessment_id, student).await.unwrap();
  s.complete_attempt(finalization(attempt.attempt_id, &a)).await.unwrap();

  let latest = s.latest_attempt(a.assessment_id, student).await.unwrap().unwrap();
  assert!(latest.is_completed());

  let next = s.open_attempt(a.assessment_id, student).await.unwrap();
  assert_ne!(next.attempt_id, attempt.attempt_id);
}

#[tokio::test]
async fn finalize_unknown_attempt_fails() {
  let (s, a) = seeded().await;
  let err = s.complete_attempt(finalization(Uuid::new_v4(), &a)).await.unwrap_err();
  assert!(matches!(err, Error::AttemptNotFound(_)));
}
