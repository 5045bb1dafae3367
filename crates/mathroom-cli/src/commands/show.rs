//! The `mathroom show` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use comfy_table::{Cell, Table};

use mathroom_core::error::RoomError;
use mathroom_core::room::RoomRepository;
use mathroom_core::traits::SystemClock;
use mathroom_store::{create_document_store, load_config_from};

pub async fn execute(room_code: String, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let store = create_document_store(&config.store)?;
    let settings = config.session.to_session_config();
    let rooms = RoomRepository::new(store, Arc::new(SystemClock), settings.room);

    let code = room_code.trim().to_uppercase();
    let room = match rooms.load(&code).await {
        Ok(room) => room,
        Err(RoomError::NotFound(code)) => {
            anyhow::bail!(
                "room {code} not found. Start a new one with: mathroom play --grade N --new"
            )
        }
        Err(e) => return Err(e.into()),
    };

    let accuracy = if room.answers.is_empty() {
        "-".to_string()
    } else {
        format!(
            "{:.0}%",
            room.correct_count() as f64 / room.answers.len() as f64 * 100.0
        )
    };

    let mut table = Table::new();
    table.set_header(vec!["Field", "Value"]);
    let rows: Vec<(&str, String)> = vec![
        ("Room", room.room_code.clone()),
        ("Grade", room.grade.to_string()),
        ("Level", room.current_level.to_string()),
        ("Streak", room.streak.to_string()),
        ("Score", room.score.to_string()),
        ("Answers", room.answers.len().to_string()),
        ("Accuracy", accuracy),
        ("Remaining", format_duration(room.remaining_seconds)),
        (
            "Current question",
            room.current_question_id
                .clone()
                .unwrap_or_else(|| "-".to_string()),
        ),
        (
            "Created",
            room.created_at.format("%Y-%m-%d %H:%M UTC").to_string(),
        ),
    ];
    for (field, value) in rows {
        table.add_row(vec![Cell::new(field), Cell::new(value)]);
    }
    println!("{table}");

    if !room.answers.is_empty() {
        let mut history = Table::new();
        history.set_header(vec!["#", "Question", "Answer", "Result"]);
        for (i, a) in room.answers.iter().enumerate() {
            history.add_row(vec![
                Cell::new(i + 1),
                Cell::new(&a.question_id),
                Cell::new(&a.answer),
                Cell::new(if a.is_correct { "correct" } else { "wrong" }),
            ]);
        }
        println!("\n{history}");
    }

    Ok(())
}

pub(crate) fn format_duration(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}
