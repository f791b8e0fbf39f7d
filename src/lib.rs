//! Jarvis Relay - voice control for a Home Assistant hub
//!
//! This library provides the pieces of a wake-word driven assistant:
//! - Voice processing (microphone capture, wake word, command capture, STT, spoken replies)
//! - Intent resolution through an LLM against a fixed device catalog
//! - Service calls to the Home Assistant REST API
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌─────────────────┐   ┌───────────────────┐
//! │ Wake Detector│──▶│ Command Capturer │──▶│ Intent Resolver │──▶│ Action Dispatcher │
//! │  (spotter)   │   │   (mic + STT)    │   │      (LLM)      │   │  (hub + speaker)  │
//! └──────▲───────┘   └──────────────────┘   └─────────────────┘   └─────────┬─────────┘
//!        └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stages run one after another on a single thread; see [`assistant`].

pub mod assistant;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod hub;
pub mod intent;
pub mod voice;

pub use assistant::{Assistant, Components, CycleOutcome, LoopState, is_stop_phrase};
pub use catalog::DeviceCatalog;
pub use config::Config;
pub use dispatch::{ActionDispatcher, DispatchReport};
pub use error::{Error, Result};
pub use hub::{HomeAssistantClient, HomeHub};
pub use intent::{ActionRecord, IntentResolver, LanguageModel, LlmClient, ServiceCall};
