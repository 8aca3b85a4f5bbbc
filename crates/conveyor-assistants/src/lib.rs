//! # Conveyor Assistants
//!
//! The message-send collaborator, implemented against an OpenAI-compatible
//! assistants surface (threads + runs). One client struct handles every
//! compatible endpoint; deployments are distinguished only by base URL and
//! API key.

pub mod client;

pub use client::AssistantClient;
