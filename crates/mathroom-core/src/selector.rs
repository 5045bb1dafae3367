//! Tiered question selection.
//!
//! Tier 1 matches grade, level and category; tier 2 drops the category;
//! tier 3 treats an exhausted level as a pool reset, clearing the seen lists
//! and drawing from the full level pool again. Candidates are ordered with a
//! seeded shuffle so repeated calls within a turn agree on the pick.

use std::collections::HashSet;
use std::fmt;

use crate::model::{Question, SelectionCriteria};
use crate::seen::SeenTracker;
use crate::shuffle::seeded_shuffle;

/// Which fallback tier produced a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Grade, level and category all matched.
    Exact,
    /// Grade and level matched; category relaxed.
    AnyKind,
    /// Every question at this level had been seen; seen lists were reset.
    Reset,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Exact => write!(f, "exact"),
            Tier::AnyKind => write!(f, "any-kind"),
            Tier::Reset => write!(f, "reset"),
        }
    }
}

/// A picked question and the tier it came from.
#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    pub question: &'a Question,
    pub tier: Tier,
}

/// Picks one unseen question from a pool.
#[derive(Clone)]
pub struct QuestionSelector {
    seen: SeenTracker,
}

impl QuestionSelector {
    pub fn new(seen: SeenTracker) -> Self {
        Self { seen }
    }

    pub fn seen(&self) -> &SeenTracker {
        &self.seen
    }

    /// Select a question for `criteria`, or `None` if the grade has nothing
    /// at this level.
    ///
    /// Selection does not mark the question seen; call
    /// [`SeenTracker::mark_seen`] once it is actually shown.
    pub fn select<'a>(
        &self,
        pool: &'a [Question],
        criteria: &SelectionCriteria,
        room_code: &str,
    ) -> Option<Selection<'a>> {
        let seen = self.seen.all_seen(room_code, criteria.grade);
        let seed = format!(
            "{room_code}-{}-{}-{}",
            criteria.grade,
            criteria.level,
            seen.len()
        );

        let level_pool: Vec<&'a Question> = pool
            .iter()
            .filter(|q| q.grade == criteria.grade && q.level == criteria.level)
            .collect();

        let exact: Vec<&'a Question> = level_pool
            .iter()
            .copied()
            .filter(|q| q.kind == criteria.kind)
            .collect();

        let (candidates, tier) = {
            let unseen_exact = unseen(&exact, &seen);
            if !unseen_exact.is_empty() {
                (unseen_exact, Tier::Exact)
            } else {
                let unseen_level = unseen(&level_pool, &seen);
                if !unseen_level.is_empty() {
                    (unseen_level, Tier::AnyKind)
                } else if !level_pool.is_empty() {
                    tracing::debug!(
                        "grade {} level {} exhausted, resetting seen lists",
                        criteria.grade,
                        criteria.level
                    );
                    self.seen.clear_device_seen(criteria.grade);
                    self.seen.clear_session_seen(room_code);
                    (level_pool, Tier::Reset)
                } else {
                    return None;
                }
            }
        };

        let question = seeded_shuffle(&candidates, &seed).into_iter().next()?;
        tracing::debug!(
            question = %question.id,
            tier = %tier,
            "selected from {} candidates",
            candidates.len()
        );
        Some(Selection { question, tier })
    }
}

fn unseen<'a>(pool: &[&'a Question], seen: &HashSet<String>) -> Vec<&'a Question> {
    pool.iter()
        .copied()
        .filter(|q| !seen.contains(&q.id))
        .collect()
}
