//! Asks the user about every new entry on the terminal.
//!
//! Answers are single words or letters. Keys of the Ukrainian/Russian layout
//! sitting on the same physical keys are accepted too, so the answer works
//! without switching the keyboard layout.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use bluetube_core::contract::Selector;
use bluetube_core::model::Entity;
use chrono::{DateTime, Local};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::executor::CommandExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Download,
    Reject,
    Summary,
    Browser,
    Player,
    Unknown,
}

pub fn parse_answer(input: &str) -> Answer {
    match input.trim() {
        "d" | "y" | "yes" | "В" | "в" | "Н" | "н" => Answer::Download,
        "r" | "n" | "no" | "к" | "К" | "т" | "Т" => Answer::Reject,
        "s" | "S" | "і" | "І" | "ы" | "Ы" => Answer::Summary,
        "b" | "B" | "и" | "И" => Answer::Browser,
        "p" | "P" | "з" | "З" => Answer::Player,
        _ => Answer::Unknown,
    }
}

/// `title (HH:MM DD.MM)` in local time.
pub fn question(entity: &Entity) -> String {
    match DateTime::from_timestamp(entity.published, 0) {
        Some(utc) => {
            let local = utc.with_timezone(&Local);
            format!("{} ({})", entity.title, local.format("%H:%M %d.%m"))
        }
        None => entity.title.clone(),
    }
}

pub struct ConsoleSelector {
    yes: bool,
    media_player: Option<String>,
    executor: CommandExecutor,
}

impl ConsoleSelector {
    /// With `yes` every entry is accepted without asking.
    pub fn new(yes: bool, media_player: Option<String>, executor: CommandExecutor) -> Self {
        Self {
            yes,
            media_player,
            executor,
        }
    }

    fn prompt(&self, with_summary: bool) -> String {
        let mut choices = vec!["download", "reject", "open in a browser"];
        if self.media_player.is_some() {
            choices.push("open in a media player");
        }
        if with_summary {
            choices.push("summary");
        }
        format!("{}? ", choices.join(" | "))
    }
}

/// Reads one line from the reader `open` returns, on a plain thread that
/// does not hold up runtime shutdown. `None` on end of input.
pub fn read_line_detached<F, R>(open: F) -> oneshot::Receiver<Option<String>>
where
    F: FnOnce() -> R + Send + 'static,
    R: BufRead,
{
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let answer = match open().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line),
        };
        let _ = tx.send(answer);
    });
    rx
}

async fn read_answer(prompt: String) -> Option<String> {
    print!("{prompt}");
    io::stdout().flush().ok()?;
    read_line_detached(|| io::stdin().lock()).await.ok().flatten()
}

#[async_trait]
impl Selector for ConsoleSelector {
    async fn select(&self, entity: &Entity) -> bool {
        if self.yes {
            return true;
        }
        println!("{}", question(entity));
        let with_summary = !entity.summary.trim().is_empty();
        loop {
            let Some(line) = read_answer(self.prompt(with_summary)).await else {
                warn!(title = %entity.title, "No answer on standard input, rejecting");
                return false;
            };
            match parse_answer(&line) {
                Answer::Download => return true,
                Answer::Reject => return false,
                Answer::Summary => println!("{}", entity.summary),
                Answer::Browser => {
                    if let Err(e) = self.executor.open_url(entity.origin()) {
                        println!("cannot open a browser: {e}");
                    }
                }
                Answer::Player => match &self.media_player {
                    Some(player) => {
                        if let Err(e) = self
                            .executor
                            .spawn_detached(player, &[entity.origin().to_string()])
                        {
                            println!("cannot start {player}: {e}");
                        }
                    }
                    None => println!("no media_player in configs.toml"),
                },
                Answer::Unknown => {
                    debug!(answer = %line.trim(), "Unknown answer");
                    println!("Please answer d (download), r (reject), b (browser), p (player) or s (summary)");
                }
            }
        }
    }
}
