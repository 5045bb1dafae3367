//! Session orchestrator: the per-turn control loop.
//!
//! Resolves a room, restores the difficulty engine and any in-flight
//! question from it, and on each confirmed answer records the result,
//! advances the engine and merges one self-consistent patch into the room.
//! Persistence failures are logged and the session continues on local state.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::instrument;

use crate::difficulty::{DifficultyEngine, LevelChange, Mode};
use crate::error::{RoomError, SessionError};
use crate::model::{level_exists, question_kinds, Grade, Level, Question, SelectionCriteria};
use crate::room::{AnswerRecord, RoomConfig, RoomPatch, RoomRepository, SessionRoom};
use crate::scheduler::{ActivityMonitor, TimerEvent, TimerScheduler};
use crate::seen::SeenTracker;
use crate::selector::QuestionSelector;
use crate::traits::{Clock, DeviceStorage, DocumentStore, QuestionSource};

/// Device storage key holding the last room used on this device.
pub const LAST_ROOM_KEY: &str = "math_challenge_room_code";

/// Configuration for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub room: RoomConfig,
    /// Countdown tick period.
    pub countdown_interval: Duration,
    /// How often remaining time is persisted.
    pub flush_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            room: RoomConfig::default(),
            countdown_interval: Duration::from_secs(1),
            flush_interval: Duration::from_secs(30),
        }
    }
}

/// External collaborators a session needs.
#[derive(Clone)]
pub struct SessionDeps {
    pub store: Arc<dyn DocumentStore>,
    pub device: Arc<dyn DeviceStorage>,
    pub questions: Arc<dyn QuestionSource>,
    pub clock: Arc<dyn Clock>,
}

/// How to find the room for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomRequest {
    /// Resume this exact room (e.g. a code typed on another device).
    Join(String),
    /// Resume the last room used on this device, or create one.
    Continue(Grade),
    /// Always create a new room.
    Fresh(Grade),
}

/// Why the turn loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Every question for the grade has been answered at least once.
    PoolCompleted,
    /// The countdown reached zero.
    TimeExpired,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::PoolCompleted => write!(f, "all questions completed"),
            EndReason::TimeExpired => write!(f, "time expired"),
        }
    }
}

/// Terminal report for a finished session. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub room_code: String,
    pub grade: u8,
    pub reason: EndReason,
    pub score: u32,
    pub answered: usize,
    /// Fraction of answers that were correct, 0.0 when nothing was answered.
    pub accuracy: f64,
    pub final_level: u8,
    pub remaining_seconds: u32,
}

/// What the shell should show next.
#[derive(Debug)]
pub enum Turn<'a> {
    Question(&'a Question),
    Finished(SessionSummary),
}

/// Result of confirming an answer.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOutcome {
    pub question_id: String,
    pub is_correct: bool,
    pub correct_answer: String,
    pub ideal_solution: String,
    pub change: LevelChange,
    pub level: Level,
    pub streak: i32,
    pub mode: Mode,
    pub score: u32,
}

/// Drives one learner through one room.
pub struct SessionOrchestrator {
    pool: Vec<Question>,
    room: SessionRoom,
    engine: DifficultyEngine,
    selector: QuestionSelector,
    rooms: RoomRepository,
    device: Arc<dyn DeviceStorage>,
    clock: Arc<dyn Clock>,
    activity: Arc<ActivityMonitor>,
    config: SessionConfig,
    current: Option<usize>,
    finished: Option<EndReason>,
}

impl SessionOrchestrator {
    /// Resolve a room and restore the session from it.
    #[instrument(skip(deps, config))]
    pub async fn start(
        deps: SessionDeps,
        config: SessionConfig,
        request: RoomRequest,
    ) -> Result<Self, SessionError> {
        let rooms = RoomRepository::new(
            Arc::clone(&deps.store),
            Arc::clone(&deps.clock),
            config.room.clone(),
        );
        let room = resolve_room(&rooms, deps.device.as_ref(), &request).await?;
        remember_room(deps.device.as_ref(), &room.room_code);

        let pool: Vec<Question> = deps
            .questions
            .questions_for_grade(room.grade)
            .await
            .map_err(SessionError::Content)?
            .into_iter()
            .filter(|q| q.grade == room.grade)
            .collect();
        if pool.is_empty() {
            return Err(SessionError::NoContent {
                grade: room.grade.get(),
            });
        }

        let engine = DifficultyEngine::restore(room.current_level, room.streak);
        let current = room
            .current_question_id
            .as_deref()
            .filter(|id| room.answers.last().map(|a| a.question_id.as_str()) != Some(*id))
            .and_then(|id| pool.iter().position(|q| q.id == id));
        if let Some(idx) = current {
            tracing::debug!("restored in-flight question {}", pool[idx].id);
        }

        let now = deps.clock.now_ms();
        let activity = Arc::new(ActivityMonitor::new(now, config.room.inactivity_threshold));

        Ok(Self {
            pool,
            room,
            engine,
            selector: QuestionSelector::new(SeenTracker::new(Arc::clone(&deps.device))),
            rooms,
            device: deps.device,
            clock: deps.clock,
            activity,
            config,
            current,
            finished: None,
        })
    }

    pub fn room(&self) -> &SessionRoom {
        &self.room
    }

    pub fn room_code(&self) -> &str {
        &self.room.room_code
    }

    pub fn engine(&self) -> &DifficultyEngine {
        &self.engine
    }

    pub fn pool(&self) -> &[Question] {
        &self.pool
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.current.map(|idx| &self.pool[idx])
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Shared handle for input listeners.
    pub fn activity(&self) -> Arc<ActivityMonitor> {
        Arc::clone(&self.activity)
    }

    /// Record an input signal now.
    pub fn record_activity(&self) {
        self.activity.touch(self.clock.now_ms());
    }

    /// Spawn the countdown and flush timers for this session.
    pub fn start_timers(&self) -> (TimerScheduler, mpsc::Receiver<TimerEvent>) {
        TimerScheduler::start(self.config.countdown_interval, self.config.flush_interval)
    }

    /// The question to show, selecting and persisting one if needed, or the
    /// terminal summary once the loop has ended.
    #[instrument(skip(self), fields(room = %self.room.room_code))]
    pub async fn next_turn(&mut self) -> Result<Turn<'_>, SessionError> {
        if let Some(reason) = self.end_reason() {
            self.finish(reason).await;
            return Ok(Turn::Finished(self.summary(reason)));
        }

        if let Some(idx) = self.current {
            return Ok(Turn::Question(&self.pool[idx]));
        }

        let idx = self.pick()?;
        self.current = Some(idx);
        let patch = RoomPatch {
            current_level: Some(self.engine.level()),
            current_question_id: Some(Some(self.pool[idx].id.clone())),
            ..Default::default()
        };
        self.persist(patch).await;
        Ok(Turn::Question(&self.pool[idx]))
    }

    /// Confirm the learner's answer to the current question.
    #[instrument(skip(self, answer), fields(room = %self.room.room_code))]
    pub async fn submit_answer(&mut self, answer: &str) -> Result<AnswerOutcome, SessionError> {
        if self.finished.is_some() {
            return Err(SessionError::Finished);
        }
        let idx = self.current.ok_or(SessionError::NoActiveQuestion)?;
        let now = self.clock.now_ms();
        self.activity.touch(now);

        let question = &self.pool[idx];
        let is_correct = question.is_correct(answer);
        let mut answers = self.room.answers.clone();
        answers.push(AnswerRecord {
            question_id: question.id.clone(),
            answer: answer.trim().to_string(),
            is_correct,
            timestamp_ms: now,
        });
        let score = answers.iter().filter(|a| a.is_correct).count() as u32;

        self.selector
            .seen()
            .mark_seen(&self.room.room_code, &question.id, self.room.grade);

        let pool = &self.pool;
        let change = self
            .engine
            .on_answer(is_correct, |level| level_exists(pool, level));

        let outcome = AnswerOutcome {
            question_id: question.id.clone(),
            is_correct,
            correct_answer: question.correct_answer.clone(),
            ideal_solution: question.ideal_solution.clone(),
            change,
            level: self.engine.level(),
            streak: self.engine.streak(),
            mode: self.engine.mode(),
            score,
        };

        self.current = None;
        let patch = RoomPatch {
            current_level: Some(self.engine.level()),
            streak: Some(self.engine.streak()),
            current_question_id: Some(None),
            score: Some(score),
            answers: Some(answers),
            remaining_seconds: Some(self.room.remaining_seconds),
            ..Default::default()
        };
        self.persist(patch).await;

        tracing::info!(
            question = %outcome.question_id,
            correct = outcome.is_correct,
            level = %outcome.level,
            streak = outcome.streak,
            "answer recorded"
        );
        Ok(outcome)
    }

    /// One countdown tick. Decrements the local remaining time while the
    /// learner is active and returns the new value; nothing is written.
    pub fn on_countdown_tick(&mut self) -> u32 {
        if self.finished.is_none()
            && self.room.remaining_seconds > 0
            && self.activity.is_active(self.clock.now_ms())
        {
            self.room.remaining_seconds -= 1;
        }
        self.room.remaining_seconds
    }

    /// Persist the remaining time if the learner is active.
    pub async fn flush_timer(&mut self) {
        if self.finished.is_some() || !self.activity.is_active(self.clock.now_ms()) {
            return;
        }
        let patch = RoomPatch {
            remaining_seconds: Some(self.room.remaining_seconds),
            ..Default::default()
        };
        self.persist(patch).await;
    }

    /// Dispatch a timer event.
    pub async fn on_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::Countdown => {
                self.on_countdown_tick();
            }
            TimerEvent::Flush => self.flush_timer().await,
        }
    }

    /// Summary of the session so far.
    pub fn summary(&self, reason: EndReason) -> SessionSummary {
        let answered = self.room.answers.len();
        let score = self.room.correct_count();
        SessionSummary {
            room_code: self.room.room_code.clone(),
            grade: self.room.grade.get(),
            reason,
            score,
            answered,
            accuracy: if answered == 0 {
                0.0
            } else {
                score as f64 / answered as f64
            },
            final_level: self.engine.level().get(),
            remaining_seconds: self.room.remaining_seconds,
        }
    }

    fn end_reason(&self) -> Option<EndReason> {
        if let Some(reason) = self.finished {
            return Some(reason);
        }
        if self.room.remaining_seconds == 0 {
            return Some(EndReason::TimeExpired);
        }
        let answered: HashSet<&str> = self.room.answered_ids().collect();
        if self.pool.iter().all(|q| answered.contains(q.id.as_str())) {
            return Some(EndReason::PoolCompleted);
        }
        None
    }

    async fn finish(&mut self, reason: EndReason) {
        if self.finished.is_some() {
            return;
        }
        tracing::info!("session {} ended: {reason}", self.room.room_code);
        self.finished = Some(reason);
        self.current = None;
        let patch = RoomPatch {
            current_question_id: Some(None),
            remaining_seconds: Some(self.room.remaining_seconds),
            ..Default::default()
        };
        self.persist(patch).await;
    }

    /// Index of the next question, falling back to the nearest level with
    /// content when the current level has none.
    fn pick(&mut self) -> Result<usize, SessionError> {
        let grade = self.room.grade;
        let kind = self.preferred_kind();
        let room_code = self.room.room_code.clone();

        let mut criteria = SelectionCriteria {
            grade,
            level: self.engine.level(),
            kind,
        };
        let mut selection = self.selector.select(&self.pool, &criteria, &room_code);

        if selection.is_none() {
            let fallback = nearest_level(&self.pool, criteria.level).ok_or(
                SessionError::NoContent {
                    grade: grade.get(),
                },
            )?;
            tracing::debug!(
                "no content at level {}, falling back to level {fallback}",
                criteria.level
            );
            criteria.level = fallback;
            selection = self.selector.select(&self.pool, &criteria, &room_code);
        }

        let id = selection
            .map(|s| s.question.id.clone())
            .ok_or(SessionError::NoContent {
                grade: grade.get(),
            })?;
        if criteria.level != self.engine.level() {
            self.engine.relocate(criteria.level);
        }
        self.pool
            .iter()
            .position(|q| q.id == id)
            .ok_or(SessionError::QuestionNotFound(id))
    }

    /// Rotate the preferred category through the grade's categories.
    fn preferred_kind(&self) -> String {
        let kinds = question_kinds(&self.pool);
        if kinds.is_empty() {
            return String::new();
        }
        kinds[self.room.answers.len() % kinds.len()].clone()
    }

    async fn persist(&mut self, patch: RoomPatch) {
        if let Err(e) = self.rooms.sync(&mut self.room, patch).await {
            tracing::warn!(
                "failed to sync room {}, continuing locally: {e}",
                self.room.room_code
            );
        }
    }
}

/// Nearest level with content in `pool`; ties go to the lower level.
fn nearest_level(pool: &[Question], from: Level) -> Option<Level> {
    let mut levels: Vec<Level> = pool.iter().map(|q| q.level).collect();
    levels.sort();
    levels.dedup();
    levels
        .into_iter()
        .min_by_key(|l| (l.distance(from), l.get()))
}

async fn resolve_room(
    rooms: &RoomRepository,
    device: &dyn DeviceStorage,
    request: &RoomRequest,
) -> Result<SessionRoom, SessionError> {
    match request {
        RoomRequest::Join(code) => load_or_forget(rooms, device, code).await,
        RoomRequest::Fresh(grade) => Ok(rooms.create(*grade).await),
        RoomRequest::Continue(grade) => {
            let last = match device.get_item(LAST_ROOM_KEY) {
                Ok(code) => code.filter(|c| !c.trim().is_empty()),
                Err(e) => {
                    tracing::warn!("could not read last room code: {e}");
                    None
                }
            };
            match last {
                Some(code) => {
                    let room = load_or_forget(rooms, device, &code).await?;
                    if room.grade == *grade {
                        Ok(room)
                    } else {
                        tracing::info!(
                            "last room {code} is grade {}, starting a grade {grade} room",
                            room.grade
                        );
                        Ok(rooms.create(*grade).await)
                    }
                }
                None => Ok(rooms.create(*grade).await),
            }
        }
    }
}

async fn load_or_forget(
    rooms: &RoomRepository,
    device: &dyn DeviceStorage,
    code: &str,
) -> Result<SessionRoom, SessionError> {
    match rooms.load(code).await {
        Ok(room) => Ok(room),
        Err(RoomError::NotFound(code)) => {
            if let Ok(Some(last)) = device.get_item(LAST_ROOM_KEY) {
                if last == code {
                    if let Err(e) = device.remove_item(LAST_ROOM_KEY) {
                        tracing::warn!("could not forget room {code}: {e}");
                    }
                }
            }
            Err(SessionError::RoomNotFound(code))
        }
        Err(e) => Err(e.into()),
    }
}

fn remember_room(device: &dyn DeviceStorage, code: &str) {
    if let Err(e) = device.set_item(LAST_ROOM_KEY, code) {
        tracing::warn!("could not remember room {code}: {e}");
    }
}
