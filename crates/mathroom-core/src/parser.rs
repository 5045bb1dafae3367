//! TOML question bank parser.
//!
//! Loads question banks from TOML files and directories, and validates them.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{Grade, Level, Question};

/// A named collection of questions for one grade.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionBank {
    pub id: String,
    pub name: String,
    /// Default grade for questions that do not set their own.
    pub grade: Grade,
    pub description: String,
    pub questions: Vec<Question>,
}

/// Intermediate TOML structure for parsing bank files.
#[derive(Debug, Deserialize)]
struct TomlBankFile {
    bank: TomlBankHeader,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
}

#[derive(Debug, Deserialize)]
struct TomlBankHeader {
    id: String,
    name: String,
    grade: u8,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    id: String,
    #[serde(default)]
    grade: Option<u8>,
    level: u8,
    #[serde(rename = "type")]
    kind: String,
    question: String,
    #[serde(default)]
    options: Vec<String>,
    correct_answer: String,
    #[serde(default)]
    ideal_solution: String,
    #[serde(default)]
    failure_modes: BTreeMap<String, String>,
}

/// Parse a single TOML file into a `QuestionBank`.
pub fn parse_bank(path: &Path) -> Result<QuestionBank> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read question bank: {}", path.display()))?;

    parse_bank_str(&content, path)
}

/// Parse a TOML string into a `QuestionBank` (useful for testing).
pub fn parse_bank_str(content: &str, source_path: &Path) -> Result<QuestionBank> {
    let parsed: TomlBankFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let grade = Grade::try_from(parsed.bank.grade)
        .map_err(|e| anyhow::anyhow!("bank {}: {}", parsed.bank.id, e))?;

    let questions = parsed
        .questions
        .into_iter()
        .map(|q| {
            let question_grade = match q.grade {
                Some(g) => Grade::try_from(g)
                    .map_err(|e| anyhow::anyhow!("question {}: {}", q.id, e))?,
                None => grade,
            };
            let level = Level::try_from(q.level)
                .map_err(|e| anyhow::anyhow!("question {}: {}", q.id, e))?;

            Ok(Question {
                id: q.id,
                grade: question_grade,
                level,
                kind: q.kind,
                question: q.question,
                options: q.options,
                correct_answer: q.correct_answer,
                ideal_solution: q.ideal_solution,
                failure_modes: q.failure_modes,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(QuestionBank {
        id: parsed.bank.id,
        name: parsed.bank.name,
        grade,
        description: parsed.bank.description,
        questions,
    })
}

/// Recursively load all `.toml` bank files from a directory.
pub fn load_bank_directory(dir: &Path) -> Result<Vec<QuestionBank>> {
    let mut banks = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();

        if path.is_dir() {
            banks.extend(load_bank_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_bank(&path) {
                Ok(bank) => banks.push(bank),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(banks)
}

/// Load banks from a single file or a directory tree.
pub fn load_banks(path: &Path) -> Result<Vec<QuestionBank>> {
    if path.is_dir() {
        load_bank_directory(path)
    } else {
        Ok(vec![parse_bank(path)?])
    }
}

/// A warning from bank validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The question ID (if applicable).
    pub question_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate a question bank for common authoring issues.
pub fn validate_bank(bank: &QuestionBank) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let mut seen_ids = HashSet::new();
    for q in &bank.questions {
        if !seen_ids.insert(&q.id) {
            warnings.push(ValidationWarning {
                question_id: Some(q.id.clone()),
                message: format!("duplicate question ID: {}", q.id),
            });
        }
    }

    for q in &bank.questions {
        let warn = |message: String| ValidationWarning {
            question_id: Some(q.id.clone()),
            message,
        };

        if q.question.trim().is_empty() {
            warnings.push(warn("question text is empty".into()));
        }
        if q.options.len() < 2 {
            warnings.push(warn(format!(
                "only {} option(s), expected at least 2",
                q.options.len()
            )));
        }
        if !q.options.is_empty() && !q.options.iter().any(|o| q.is_correct(o)) {
            warnings.push(warn(format!(
                "correct_answer '{}' is not one of the options",
                q.correct_answer
            )));
        }
        if q.ideal_solution.trim().is_empty() {
            warnings.push(warn("ideal_solution is empty".into()));
        }
        if q.failure_modes.is_empty() {
            warnings.push(warn("no failure_modes defined".into()));
        }
    }

    // Missing levels between populated ones block level-up.
    let mut by_grade: BTreeMap<Grade, BTreeSet<u8>> = BTreeMap::new();
    for q in &bank.questions {
        by_grade.entry(q.grade).or_default().insert(q.level.get());
    }
    for (grade, levels) in &by_grade {
        let (Some(&lo), Some(&hi)) = (levels.first(), levels.last()) else {
            continue;
        };
        let missing: Vec<u8> = (lo..=hi).filter(|l| !levels.contains(l)).collect();
        if let Some(&first_gap) = missing.first() {
            let listed: Vec<String> = missing.iter().map(|l| l.to_string()).collect();
            warnings.push(ValidationWarning {
                question_id: None,
                message: format!(
                    "grade {grade} has no questions at level(s) {}; \
                     learners cannot advance past level {}",
                    listed.join(", "),
                    first_gap - 1
                ),
            });
        }
    }

    warnings
}
