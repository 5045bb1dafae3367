//! Adaptive difficulty state machine.
//!
//! Two consecutive correct answers move the learner up a level, two
//! consecutive misses move them down and switch on focus mode. A move only
//! happens if the target level has content in the live pool; the streak
//! clears whenever a transition fires.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::Level;

/// Streak at which a level change fires.
pub const STREAK_THRESHOLD: i32 = 2;

/// Presentation mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Normal,
    /// The learner is struggling (two misses in a row).
    Focus,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Normal => write!(f, "normal"),
            Mode::Focus => write!(f, "focus"),
        }
    }
}

/// What an answer did to the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelChange {
    Unchanged,
    Up { from: Level, to: Level },
    Down { from: Level, to: Level },
}

/// Level, streak and mode for one learner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DifficultyEngine {
    level: Level,
    streak: i32,
    mode: Mode,
}

impl Default for DifficultyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DifficultyEngine {
    /// Level 1, streak 0, normal mode.
    pub fn new() -> Self {
        Self {
            level: Level::MIN,
            streak: 0,
            mode: Mode::Normal,
        }
    }

    /// Restore from a persisted level and streak. Mode is not persisted.
    pub fn restore(level: Level, streak: i32) -> Self {
        Self {
            level,
            streak,
            mode: Mode::Normal,
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn streak(&self) -> i32 {
        self.streak
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Move to `level` without touching streak or mode. Used when the
    /// current level has no content and the caller falls back.
    pub fn relocate(&mut self, level: Level) {
        self.level = level;
    }

    /// Consume one answer. `level_exists` must reflect the live pool.
    pub fn on_answer(
        &mut self,
        is_correct: bool,
        level_exists: impl Fn(Level) -> bool,
    ) -> LevelChange {
        if is_correct {
            self.streak = if self.streak >= 0 {
                self.streak.saturating_add(1)
            } else {
                1
            };
            self.mode = Mode::Normal;

            if self.streak >= STREAK_THRESHOLD {
                if let Some(next) = self.level.up().filter(|l| level_exists(*l)) {
                    let from = self.level;
                    self.level = next;
                    self.streak = 0;
                    tracing::debug!("level up {from} -> {next}");
                    return LevelChange::Up { from, to: next };
                }
            }
            LevelChange::Unchanged
        } else {
            self.streak = if self.streak <= 0 {
                self.streak.saturating_sub(1)
            } else {
                -1
            };

            if self.streak > -STREAK_THRESHOLD {
                return LevelChange::Unchanged;
            }

            self.mode = Mode::Focus;
            self.streak = 0;
            match self.level.down().filter(|l| level_exists(*l)) {
                Some(prev) => {
                    let from = self.level;
                    self.level = prev;
                    tracing::debug!("level down {from} -> {prev}");
                    LevelChange::Down { from, to: prev }
                }
                None => LevelChange::Unchanged,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(n: u8) -> Level {
        Level::new(n).unwrap()
    }

    fn all_levels(_: Level) -> bool {
        true
    }

    fn only(levels: &'static [u8]) -> impl Fn(Level) -> bool {
        move |l| levels.contains(&l.get())
    }

    #[test]
    fn two_correct_levels_up_when_next_exists() {
        let mut e = DifficultyEngine::new();
        assert_eq!(e.on_answer(true, only(&[1, 2])), LevelChange::Unchanged);
        assert_eq!(e.streak(), 1);
        assert_eq!(
            e.on_answer(true, only(&[1, 2])),
            LevelChange::Up {
                from: level(1),
                to: level(2)
            }
        );
        assert_eq!(e.level(), level(2));
        assert_eq!(e.streak(), 0);
    }

    #[test]
    fn two_correct_without_next_level_keeps_streak() {
        let mut e = DifficultyEngine::new();
        e.on_answer(true, only(&[1]));
        e.on_answer(true, only(&[1]));
        assert_eq!(e.level(), level(1));
        assert_eq!(e.streak(), 2);

        // Streak keeps growing while the next level stays empty.
        e.on_answer(true, only(&[1]));
        assert_eq!(e.streak(), 3);
    }

    #[test]
    fn blocked_streak_fires_as_soon_as_content_appears() {
        let mut e = DifficultyEngine::new();
        e.on_answer(true, only(&[1]));
        e.on_answer(true, only(&[1]));
        e.on_answer(true, only(&[1, 2]));
        assert_eq!(e.level(), level(2));
        assert_eq!(e.streak(), 0);
    }

    #[test]
    fn two_incorrect_from_level_two_drops_to_focus() {
        let mut e = DifficultyEngine::restore(level(2), 0);
        assert_eq!(e.on_answer(false, all_levels), LevelChange::Unchanged);
        assert_eq!(e.streak(), -1);
        assert_eq!(e.mode(), Mode::Normal);
        assert_eq!(
            e.on_answer(false, all_levels),
            LevelChange::Down {
                from: level(2),
                to: level(1)
            }
        );
        assert_eq!(e.level(), level(1));
        assert_eq!(e.mode(), Mode::Focus);
        assert_eq!(e.streak(), 0);
    }

    #[test]
    fn two_incorrect_at_floor_still_resets_streak() {
        let mut e = DifficultyEngine::new();
        e.on_answer(false, all_levels);
        assert_eq!(e.on_answer(false, all_levels), LevelChange::Unchanged);
        assert_eq!(e.level(), level(1));
        assert_eq!(e.streak(), 0);
        assert_eq!(e.mode(), Mode::Focus);
    }

    #[test]
    fn level_down_skipped_when_previous_level_empty() {
        let mut e = DifficultyEngine::restore(level(3), 0);
        e.on_answer(false, only(&[3]));
        e.on_answer(false, only(&[3]));
        assert_eq!(e.level(), level(3));
        assert_eq!(e.streak(), 0);
        assert_eq!(e.mode(), Mode::Focus);
    }

    #[test]
    fn correct_after_focus_returns_to_normal() {
        let mut e = DifficultyEngine::restore(level(2), 0);
        e.on_answer(false, all_levels);
        e.on_answer(false, all_levels);
        assert_eq!(e.mode(), Mode::Focus);
        e.on_answer(true, all_levels);
        assert_eq!(e.mode(), Mode::Normal);
        assert_eq!(e.streak(), 1);
    }

    #[test]
    fn opposite_answer_breaks_streak_to_one() {
        let mut e = DifficultyEngine::restore(level(5), -1);
        e.on_answer(true, all_levels);
        assert_eq!(e.streak(), 1);
        e.on_answer(false, all_levels);
        assert_eq!(e.streak(), -1);
    }

    #[test]
    fn ceiling_never_exceeded() {
        let mut e = DifficultyEngine::restore(Level::MAX, 0);
        e.on_answer(true, all_levels);
        e.on_answer(true, all_levels);
        assert_eq!(e.level(), Level::MAX);
        assert_eq!(e.streak(), 2);
    }

    #[test]
    fn climbs_one_level_per_two_correct() {
        let mut e = DifficultyEngine::new();
        for _ in 0..6 {
            e.on_answer(true, all_levels);
        }
        assert_eq!(e.level(), level(4));
    }
}
