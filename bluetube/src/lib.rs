pub mod cli;
pub mod console;
pub mod executor;
pub mod feed_source;
pub mod ffmpeg;
pub mod load_config;
pub mod obex;
pub mod selector;
pub mod ytdlp;

pub use cli::{run, Cli, Commands};
