use bluetube_core::contract::{Event, EventListener};
use colored::Colorize;

/// Renders pipeline events on the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleListener;

/// One line for an event.
pub fn render(event: &Event) -> String {
    match event {
        Event::Info(msg) => format!("[info] {msg}"),
        Event::Success(msg) => format!("{} {msg}", "[INFO]".green().bold()),
        Event::Warn(msg) => format!("{} {msg}", "[WARNING]".yellow()),
        Event::Error(msg) => format!("{} {msg}", "[ERROR]".red()),
    }
}

impl EventListener for ConsoleListener {
    fn notify(&self, event: Event) {
        match event {
            Event::Error(_) | Event::Warn(_) => eprintln!("{}", render(&event)),
            _ => println!("{}", render(&event)),
        }
    }
}
