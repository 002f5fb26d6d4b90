//! Concrete implementations of the generation capabilities.

mod command;
mod openai;
mod piper;
mod placeholder;
mod suno;

pub use command::CommandMusicGenerator;
pub use openai::{OpenAiImageGenerator, compose_prompt};
pub use piper::PiperNarrator;
pub use placeholder::PlaceholderImageGenerator;
pub use suno::SunoMusicGenerator;
