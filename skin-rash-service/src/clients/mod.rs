pub mod blip;
pub mod openrouter;

pub use blip::{BlipCaptioner, UnavailableCaptioner};
pub use openrouter::OpenRouterClient;
