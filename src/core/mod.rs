pub mod dependencies;
pub mod disk;
pub mod engine;
pub mod error;
pub mod events;
pub mod ffmpeg;
pub mod filename;
pub mod logging;
pub mod process;
pub mod progress;
pub mod queue;
pub mod ytdlp;
