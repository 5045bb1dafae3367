//! Question source backed by TOML question banks.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;

use mathroom_core::model::{Grade, Question};
use mathroom_core::parser::{load_banks, QuestionBank};
use mathroom_core::traits::QuestionSource;

/// Serves questions from banks loaded once at startup.
pub struct BankQuestionSource {
    banks: Vec<QuestionBank>,
}

impl BankQuestionSource {
    pub fn new(banks: Vec<QuestionBank>) -> Self {
        Self { banks }
    }

    /// Load every bank under `path` (a file or a directory tree).
    pub fn from_path(path: &Path) -> Result<Self> {
        let banks = load_banks(path)
            .with_context(|| format!("failed to load question banks from {}", path.display()))?;
        let total: usize = banks.iter().map(|b| b.questions.len()).sum();
        tracing::info!(
            "loaded {} question bank(s), {total} questions, from {}",
            banks.len(),
            path.display()
        );
        Ok(Self::new(banks))
    }

    pub fn banks(&self) -> &[QuestionBank] {
        &self.banks
    }
}

#[async_trait]
impl QuestionSource for BankQuestionSource {
    async fn questions_for_grade(&self, grade: Grade) -> Result<Vec<Question>> {
        let mut ids = HashSet::new();
        let mut questions = Vec::new();
        for q in self
            .banks
            .iter()
            .flat_map(|b| &b.questions)
            .filter(|q| q.grade == grade)
        {
            if ids.insert(q.id.as_str()) {
                questions.push(q.clone());
            } else {
                tracing::warn!("duplicate question id {} across banks, keeping the first", q.id);
            }
        }
        Ok(questions)
    }
}
