//! Core data model types for mathroom.
//!
//! Questions are immutable content records authored outside the engine.
//! `Grade` and `Level` are range-checked newtypes so an out-of-range value
//! cannot reach the selector or the difficulty engine.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// School grade, 1 through 12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Grade(u8);

impl Grade {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 12;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Grade {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Grade::new(value).ok_or_else(|| format!("grade must be 1-12, got {value}"))
    }
}

impl From<Grade> for u8 {
    fn from(g: Grade) -> u8 {
        g.0
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Grade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u8 = s
            .trim()
            .parse()
            .map_err(|_| format!("invalid grade: {s}"))?;
        Grade::try_from(n)
    }
}

/// Difficulty rung, 1 through 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Level(u8);

impl Level {
    pub const MIN: Level = Level(1);
    pub const MAX: Level = Level(10);

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN.0..=Self::MAX.0)
            .contains(&value)
            .then_some(Self(value))
    }

    /// Clamp an arbitrary integer into `[1, 10]`.
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(Self::MIN.0 as i64, Self::MAX.0 as i64) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// The next level up, or `None` at the ceiling.
    pub fn up(self) -> Option<Self> {
        Self::new(self.0 + 1)
    }

    /// The next level down, or `None` at the floor.
    pub fn down(self) -> Option<Self> {
        self.0.checked_sub(1).and_then(Self::new)
    }

    /// Distance between two levels.
    pub fn distance(self, other: Level) -> u8 {
        self.0.abs_diff(other.0)
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::MIN
    }
}

impl TryFrom<u8> for Level {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Level::new(value).ok_or_else(|| format!("level must be 1-10, got {value}"))
    }
}

impl From<Level> for u8 {
    fn from(l: Level) -> u8 {
        l.0
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single graded question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Unique identifier.
    pub id: String,
    pub grade: Grade,
    /// Difficulty rung.
    pub level: Level,
    /// Category tag (e.g. "Arithmetic", "Logic").
    #[serde(rename = "type")]
    pub kind: String,
    /// Question text.
    pub question: String,
    /// Answer options, in display order.
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: String,
    #[serde(default)]
    pub ideal_solution: String,
    /// Failure-mode key to remediation text.
    #[serde(default)]
    pub failure_modes: BTreeMap<String, String>,
}

impl Question {
    /// Whether `answer` matches the correct answer, ignoring surrounding whitespace.
    pub fn is_correct(&self, answer: &str) -> bool {
        answer.trim() == self.correct_answer.trim()
    }
}

/// What the selector is asked to find on a given turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionCriteria {
    pub grade: Grade,
    pub level: Level,
    /// Preferred category.
    pub kind: String,
}

/// Whether any question in `pool` sits at `level`.
pub fn level_exists(pool: &[Question], level: Level) -> bool {
    pool.iter().any(|q| q.level == level)
}

/// Distinct category tags in `pool`, sorted.
pub fn question_kinds(pool: &[Question]) -> Vec<String> {
    let mut kinds: Vec<String> = pool.iter().map(|q| q.kind.clone()).collect();
    kinds.sort();
    kinds.dedup();
    kinds
}
