// Generative commentary: Claude client, prompts, trigger and analysis log.

pub mod client;
pub mod commentary;
pub mod prompt;
