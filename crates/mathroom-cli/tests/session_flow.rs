//! End-to-end session flows against the in-memory stores.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use mathroom_core::difficulty::{LevelChange, Mode};
use mathroom_core::model::Grade;
use mathroom_core::parser::parse_bank_str;
use mathroom_core::room::RoomConfig;
use mathroom_core::session::{
    EndReason, RoomRequest, SessionConfig, SessionDeps, SessionOrchestrator, Turn, LAST_ROOM_KEY,
};
use mathroom_core::traits::{DeviceStorage, DocumentStore, ManualClock};
use mathroom_store::memory::{MemoryDeviceStorage, MemoryDocumentStore};
use mathroom_store::BankQuestionSource;

const T0: i64 = 1_750_000_000_000;

const BANK: &str = r#"
[bank]
id = "flow"
name = "Flow"
grade = 3

[[questions]]
id = "a1"
level = 1
type = "Arithmetic"
question = "1 + 1?"
options = ["2", "3"]
correct_answer = "2"
ideal_solution = "Two."

[[questions]]
id = "a2"
level = 1
type = "Logic"
question = "Next: 1, 2, ?"
options = ["3", "4"]
correct_answer = "3"
ideal_solution = "Three."

[[questions]]
id = "a3"
level = 1
type = "Arithmetic"
question = "2 + 2?"
options = ["4", "5"]
correct_answer = "4"
ideal_solution = "Four."

[[questions]]
id = "b1"
level = 2
type = "Arithmetic"
question = "12 + 9?"
options = ["21", "22"]
correct_answer = "21"
ideal_solution = "Twenty-one."

[[questions]]
id = "b2"
level = 2
type = "Logic"
question = "Next: 2, 4, ?"
options = ["6", "8"]
correct_answer = "6"
ideal_solution = "Six."
"#;

struct World {
    store: Arc<MemoryDocumentStore>,
    questions: Arc<BankQuestionSource>,
    clock: Arc<ManualClock>,
}

impl World {
    fn new() -> Self {
        Self::with_bank(BANK)
    }

    fn with_bank(toml: &str) -> Self {
        let bank = parse_bank_str(toml, Path::new("flow.toml")).unwrap();
        Self {
            store: Arc::new(MemoryDocumentStore::new()),
            questions: Arc::new(BankQuestionSource::new(vec![bank])),
            clock: Arc::new(ManualClock::new(T0)),
        }
    }

    fn deps(&self, device: &Arc<MemoryDeviceStorage>) -> SessionDeps {
        SessionDeps {
            store: self.store.clone(),
            device: device.clone(),
            questions: self.questions.clone(),
            clock: self.clock.clone(),
        }
    }

    async fn start(
        &self,
        device: &Arc<MemoryDeviceStorage>,
        request: RoomRequest,
    ) -> SessionOrchestrator {
        SessionOrchestrator::start(self.deps(device), SessionConfig::default(), request)
            .await
            .unwrap()
    }
}

async fn show(session: &mut SessionOrchestrator) -> (String, String) {
    match session.next_turn().await.unwrap() {
        Turn::Question(q) => (q.id.clone(), q.correct_answer.clone()),
        Turn::Finished(summary) => panic!("session ended early: {summary:?}"),
    }
}

fn grade3() -> Grade {
    Grade::new(3).unwrap()
}

#[tokio::test]
async fn resume_on_another_device_restores_everything() {
    let world = World::new();
    let laptop = Arc::new(MemoryDeviceStorage::new());

    let mut session = world.start(&laptop, RoomRequest::Fresh(grade3())).await;
    let code = session.room_code().to_string();

    for _ in 0..2 {
        let (_, correct) = show(&mut session).await;
        world.clock.advance_ms(20_000);
        session.submit_answer(&correct).await.unwrap();
    }
    assert_eq!(session.engine().level().get(), 2);

    let (in_flight, _) = show(&mut session).await;
    assert!(in_flight.starts_with('b'));
    drop(session);

    // Ten minutes away: only the five-minute window is charged.
    world.clock.advance_ms(10 * 60_000);

    let tablet = Arc::new(MemoryDeviceStorage::new());
    let mut resumed = world.start(&tablet, RoomRequest::Join(code.clone())).await;
    assert_eq!(resumed.room().remaining_seconds, 3600 - 300);
    assert_eq!(resumed.engine().level().get(), 2);
    assert_eq!(resumed.engine().streak(), 0);
    assert_eq!(resumed.room().score, 2);
    assert_eq!(resumed.room().answers.len(), 2);
    assert_eq!(show(&mut resumed).await.0, in_flight);

    assert_eq!(
        tablet.get_item(LAST_ROOM_KEY).unwrap().as_deref(),
        Some(code.as_str())
    );
}

#[tokio::test]
async fn struggling_learner_drops_level_and_enters_focus() {
    let world = World::new();
    let device = Arc::new(MemoryDeviceStorage::new());
    let mut session = world.start(&device, RoomRequest::Fresh(grade3())).await;

    for _ in 0..2 {
        let (_, correct) = show(&mut session).await;
        session.submit_answer(&correct).await.unwrap();
    }
    assert_eq!(session.engine().level().get(), 2);

    show(&mut session).await;
    let first = session.submit_answer("wrong").await.unwrap();
    assert_eq!(first.change, LevelChange::Unchanged);
    assert_eq!(first.streak, -1);

    show(&mut session).await;
    let second = session.submit_answer("wrong").await.unwrap();
    assert!(matches!(second.change, LevelChange::Down { .. }));
    assert_eq!(second.level.get(), 1);
    assert_eq!(second.mode, Mode::Focus);
    assert_eq!(second.streak, 0);

    let (_, correct) = show(&mut session).await;
    let recovered = session.submit_answer(&correct).await.unwrap();
    assert_eq!(recovered.mode, Mode::Normal);
    assert_eq!(recovered.streak, 1);
}

#[tokio::test]
async fn offline_writes_are_reconciled_by_the_next_sync() {
    let world = World::new();
    let device = Arc::new(MemoryDeviceStorage::new());
    let mut session = world.start(&device, RoomRequest::Fresh(grade3())).await;
    let code = session.room_code().to_string();

    let (_, correct) = show(&mut session).await;
    world.store.set_offline(true);
    session.submit_answer(&correct).await.unwrap();
    assert_eq!(session.room().answers.len(), 1);
    let stored = world.store.document(&code).unwrap();
    assert_eq!(stored["answers"], json!([]));

    world.store.set_offline(false);
    show(&mut session).await;
    session.submit_answer("nope").await.unwrap();

    let stored = world.store.document(&code).unwrap();
    assert_eq!(stored["answers"].as_array().unwrap().len(), 2);
    assert_eq!(stored["score"], 1);
    assert_eq!(stored["currentQuestionId"], serde_json::Value::Null);
    drop(session);

    world.clock.advance_ms(5_000);
    let other_device = Arc::new(MemoryDeviceStorage::new());
    let resumed = world
        .start(&other_device, RoomRequest::Join(code.clone()))
        .await;
    assert_eq!(resumed.engine().level().get(), 1);
    assert_eq!(resumed.engine().streak(), -1);
    assert_eq!(resumed.room().score, 1);
    assert_eq!(resumed.room().answers.len(), 2);
    assert_eq!(resumed.room().remaining_seconds, 3595);
}

#[tokio::test]
async fn room_created_offline_resumes_after_reconnect() {
    let world = World::new();
    let device = Arc::new(MemoryDeviceStorage::new());
    world.store.set_offline(true);
    let mut session = world.start(&device, RoomRequest::Fresh(grade3())).await;
    let code = session.room_code().to_string();
    assert!(world.store.document(&code).is_none());

    world.store.set_offline(false);
    let (_, correct) = show(&mut session).await;
    session.submit_answer(&correct).await.unwrap();
    drop(session);

    let mut resumed = world.start(&device, RoomRequest::Join(code.clone())).await;
    assert_eq!(resumed.room().grade, grade3());
    assert_eq!(resumed.room().score, 1);
    assert_eq!(resumed.room().answers.len(), 1);
    assert_eq!(resumed.engine().streak(), 1);
    show(&mut resumed).await;
    assert_eq!(
        device.get_item(LAST_ROOM_KEY).unwrap().as_deref(),
        Some(code.as_str())
    );
}

#[tokio::test]
async fn refresh_after_resume_keeps_the_absence_charge() {
    let world = World::new();
    let device = Arc::new(MemoryDeviceStorage::new());
    let mut session = world.start(&device, RoomRequest::Fresh(grade3())).await;
    let code = session.room_code().to_string();
    let (_, correct) = show(&mut session).await;
    session.submit_answer(&correct).await.unwrap();
    drop(session);

    world.clock.advance_ms(10 * 60_000);
    let mut resumed = world.start(&device, RoomRequest::Join(code.clone())).await;
    show(&mut resumed).await;
    assert_eq!(resumed.room().remaining_seconds, 3300);
    drop(resumed);

    world.clock.advance_ms(1_000);
    let refreshed = world.start(&device, RoomRequest::Join(code)).await;
    assert_eq!(refreshed.room().remaining_seconds, 3299);
}

#[tokio::test]
async fn legacy_record_restores_with_defaults() {
    let world = World::new();
    world
        .store
        .set(
            "OLD-ROOM-77",
            json!({
                "grade": 3,
                "currentLevel": 14,
                "score": 99,
                "answers": [
                    {"questionId": "a1", "answer": "2", "isCorrect": true, "timestamp": T0 - 1000}
                ],
                "remainingSeconds": 1000,
                "lastInteractionAt": T0 - 60_000
            }),
        )
        .await
        .unwrap();

    let device = Arc::new(MemoryDeviceStorage::new());
    let mut session = world
        .start(&device, RoomRequest::Join("OLD-ROOM-77".into()))
        .await;

    assert_eq!(session.room().streak, 0);
    assert_eq!(session.room().score, 1);
    assert_eq!(session.room().remaining_seconds, 940);
    // Level 14 clamps to 10, which has no content; selection falls back to level 2.
    let (id, _) = show(&mut session).await;
    assert!(id.starts_with('b'));
    assert_eq!(session.engine().level().get(), 2);
}

#[tokio::test]
async fn countdown_expiry_ends_the_session() {
    let world = World::new();
    let device = Arc::new(MemoryDeviceStorage::new());
    let config = SessionConfig {
        room: RoomConfig {
            time_allowance_secs: 3,
            ..RoomConfig::default()
        },
        ..SessionConfig::default()
    };
    let mut session =
        SessionOrchestrator::start(world.deps(&device), config, RoomRequest::Fresh(grade3()))
            .await
            .unwrap();

    let (_, correct) = show(&mut session).await;
    session.submit_answer(&correct).await.unwrap();
    for _ in 0..3 {
        session.on_countdown_tick();
    }

    match session.next_turn().await.unwrap() {
        Turn::Finished(summary) => {
            assert_eq!(summary.reason, EndReason::TimeExpired);
            assert_eq!(summary.score, 1);
            assert_eq!(summary.answered, 1);
            assert_eq!(summary.remaining_seconds, 0);
        }
        Turn::Question(q) => panic!("expected expiry, got {}", q.id),
    }
}

#[tokio::test]
async fn single_level_pool_completes_without_repeats() {
    let level_one: String = BANK
        .split("[[questions]]")
        .filter(|chunk| !chunk.contains("level = 2"))
        .collect::<Vec<_>>()
        .join("[[questions]]");
    let world = World::with_bank(&level_one);
    let device = Arc::new(MemoryDeviceStorage::new());
    let mut session = world.start(&device, RoomRequest::Fresh(grade3())).await;
    assert_eq!(session.pool().len(), 3);

    let mut shown = Vec::new();
    let summary = loop {
        match session.next_turn().await.unwrap() {
            Turn::Finished(summary) => break summary,
            Turn::Question(q) => {
                let (id, answer) = (q.id.clone(), q.correct_answer.clone());
                shown.push(id);
                session.submit_answer(&answer).await.unwrap();
            }
        }
        assert!(shown.len() <= 3, "a question was repeated: {shown:?}");
    };

    assert_eq!(summary.reason, EndReason::PoolCompleted);
    assert_eq!(summary.score, 3);
    assert_eq!(summary.final_level, 1);
    assert!((summary.accuracy - 1.0).abs() < f64::EPSILON);

    // No level 2 content: the streak keeps counting.
    assert_eq!(session.engine().streak(), 3);
}
