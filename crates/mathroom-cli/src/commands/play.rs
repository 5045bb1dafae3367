//! The `mathroom play` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use mathroom_core::difficulty::LevelChange;
use mathroom_core::model::{Grade, Question};
use mathroom_core::session::{
    AnswerOutcome, RoomRequest, SessionDeps, SessionOrchestrator, SessionSummary, Turn,
};
use mathroom_core::traits::SystemClock;
use mathroom_store::{
    create_device_storage, create_document_store, load_config_from, BankQuestionSource,
};

use super::show::format_duration;

/// What the learner did while a question was on screen.
enum Input {
    Answer(String),
    Quit,
    Expired,
}

pub async fn execute(
    grade: Option<u8>,
    room: Option<String>,
    new: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let request = room_request(grade, room, new)?;
    let config = load_config_from(config_path.as_deref())?;

    let deps = SessionDeps {
        store: create_document_store(&config.store)?,
        device: create_device_storage(&config),
        questions: Arc::new(BankQuestionSource::from_path(&config.question_banks)?),
        clock: Arc::new(SystemClock),
    };

    let mut session =
        match SessionOrchestrator::start(deps, config.session.to_session_config(), request).await {
            Ok(session) => session,
            Err(e) if e.is_recoverable() => {
                anyhow::bail!("{e}. Start a fresh room with: mathroom play --grade N --new")
            }
            Err(e) => return Err(e.into()),
        };

    let code = session.room_code().to_string();
    println!(
        "Room code: {code}  (grade {}, level {}, {} left)",
        session.room().grade,
        session.engine().level(),
        format_duration(session.room().remaining_seconds)
    );
    println!("Answer with the option number or the answer text. Type 'quit' to stop.\n");

    let (timers, mut events) = session.start_timers();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let summary = loop {
        let question = match session.next_turn().await? {
            Turn::Finished(summary) => break Some(summary),
            Turn::Question(q) => q.clone(),
        };
        print_question(&question, &session);

        let input = loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break Input::Quit;
                    };
                    session.record_activity();
                    let text = line.trim();
                    if text.is_empty() {
                        continue;
                    }
                    if text.eq_ignore_ascii_case("quit") || text.eq_ignore_ascii_case("q") {
                        break Input::Quit;
                    }
                    break Input::Answer(resolve_answer(&question, text));
                }
                Some(event) = events.recv() => {
                    session.on_timer(event).await;
                    if session.room().remaining_seconds == 0 {
                        break Input::Expired;
                    }
                }
            }
        };

        match input {
            Input::Answer(answer) => {
                let outcome = session.submit_answer(&answer).await?;
                print_outcome(&question, &answer, &outcome);
            }
            Input::Expired => println!("\nTime is up!"),
            Input::Quit => break None,
        }
    };

    session.flush_timer().await;
    drop(events);
    timers.shutdown().await;

    match summary {
        Some(summary) => print_summary(&summary),
        None => {
            tracing::debug!("session {code} paused by the learner");
            println!(
                "\nProgress saved ({} left). Resume with: mathroom play --room {code}",
                format_duration(session.room().remaining_seconds)
            );
        }
    }

    Ok(())
}

fn room_request(grade: Option<u8>, room: Option<String>, new: bool) -> Result<RoomRequest> {
    if let Some(code) = room {
        return Ok(RoomRequest::Join(code.trim().to_uppercase()));
    }
    let Some(grade) = grade else {
        anyhow::bail!("--grade is required unless --room is given");
    };
    let grade = Grade::try_from(grade).map_err(|e| anyhow::anyhow!(e))?;
    Ok(if new {
        RoomRequest::Fresh(grade)
    } else {
        RoomRequest::Continue(grade)
    })
}

/// Map an option number to its text; anything else is taken verbatim.
/// Input that matches an option's text exactly is never treated as a number.
fn resolve_answer(question: &Question, input: &str) -> String {
    if question.options.iter().any(|o| o.trim() == input) {
        return input.to_string();
    }
    input
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=question.options.len()).contains(n))
        .map(|n| question.options[n - 1].clone())
        .unwrap_or_else(|| input.to_string())
}

fn print_question(question: &Question, session: &SessionOrchestrator) {
    let room = session.room();
    println!(
        "[level {} | score {} | {} left] {}",
        session.engine().level(),
        room.score,
        format_duration(room.remaining_seconds),
        question.question
    );
    for (i, option) in question.options.iter().enumerate() {
        println!("  {}) {option}", i + 1);
    }
}

fn print_outcome(question: &Question, answer: &str, outcome: &AnswerOutcome) {
    if outcome.is_correct {
        println!("Correct!");
    } else {
        println!("Not quite. The answer is {}.", outcome.correct_answer);
        if let Some(hint) = question.failure_modes.get(answer.trim()) {
            println!("Hint: {hint}");
        }
    }
    if !outcome.ideal_solution.is_empty() {
        println!("Solution: {}", outcome.ideal_solution);
    }
    match outcome.change {
        LevelChange::Up { to, .. } => println!("Level up! Now at level {to}."),
        LevelChange::Down { to, .. } => println!("Let's slow down. Now at level {to}."),
        LevelChange::Unchanged => {}
    }
    println!();
}

fn print_summary(summary: &SessionSummary) {
    println!("\nSession complete: {}", summary.reason);
    println!("  Room:        {}", summary.room_code);
    println!("  Score:       {}/{}", summary.score, summary.answered);
    println!("  Accuracy:    {:.0}%", summary.accuracy * 100.0);
    println!("  Final level: {}", summary.final_level);
    println!(
        "  Time left:   {}",
        format_duration(summary.remaining_seconds)
    );
}
