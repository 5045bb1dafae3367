//! The `mathroom init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("mathroom.toml").exists() {
        println!("mathroom.toml already exists, skipping.");
    } else {
        std::fs::write("mathroom.toml", SAMPLE_CONFIG)?;
        println!("Created mathroom.toml");
    }

    std::fs::create_dir_all("question-banks")?;
    let example_path = std::path::Path::new("question-banks/example.toml");
    if example_path.exists() {
        println!("question-banks/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_BANK)?;
        println!("Created question-banks/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit mathroom.toml to choose where rooms are stored");
    println!("  2. Run: mathroom validate --bank question-banks");
    println!("  3. Run: mathroom play --grade 3");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# mathroom configuration

question_banks = "./question-banks"
device_storage = "./.mathroom/device.json"

[store]
type = "file"
dir = "./.mathroom/rooms"

# Shared rooms across devices:
# [store]
# type = "rest"
# base_url = "https://rooms.example.com/v1"
# api_key = "${MATHROOM_API_KEY}"
# collection = "rooms"

[session]
time_allowance_secs = 3600
inactivity_threshold_secs = 300
countdown_interval_secs = 1
flush_interval_secs = 30
"#;

const EXAMPLE_BANK: &str = r#"[bank]
id = "example"
name = "Example Grade 3"
grade = 3
description = "A small starter bank"

[[questions]]
id = "ex-add-1"
level = 1
type = "Arithmetic"
question = "What is 8 + 6?"
options = ["12", "13", "14", "15"]
correct_answer = "14"
ideal_solution = "8 + 2 = 10, and 4 more makes 14."

[questions.failure_modes]
"13" = "Count on carefully: 9, 10, 11, 12, 13, 14 is six steps."

[[questions]]
id = "ex-logic-1"
level = 1
type = "Logic"
question = "Which number is missing: 5, 10, __, 20?"
options = ["12", "15", "16"]
correct_answer = "15"
ideal_solution = "The numbers go up by 5 each time."

[questions.failure_modes]
"12" = "Check the gap between each pair of numbers."

[[questions]]
id = "ex-add-2"
level = 2
type = "Arithmetic"
question = "What is 47 + 28?"
options = ["65", "75", "85"]
correct_answer = "75"
ideal_solution = "40 + 20 = 60 and 7 + 8 = 15, so 60 + 15 = 75."

[questions.failure_modes]
"65" = "Remember to carry the 1 from 7 + 8 = 15."

[[questions]]
id = "ex-logic-2"
level = 2
type = "Logic"
question = "Ana is taller than Ben. Ben is taller than Cy. Who is shortest?"
options = ["Ana", "Ben", "Cy"]
correct_answer = "Cy"
ideal_solution = "Ana > Ben > Cy, so Cy is the shortest."

[questions.failure_modes]
Ben = "Ben is taller than someone, so he cannot be the shortest."
"#;
