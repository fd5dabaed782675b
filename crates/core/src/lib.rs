//! Storyboard domain core.
//!
//! Pure data model and logic shared by the store, the provider crates and
//! the HTTP layer. Nothing in here talks to the network.

pub mod batch_linker;
pub mod document;
pub mod error;
pub mod export;
pub mod export_pdf;
pub mod generation;
pub mod inputs;
pub mod matching;
pub mod naming;
pub mod project;
pub mod prompts;
pub mod reconcile;
pub mod references;
pub mod samples;
pub mod settings;
pub mod shot_prompt;
pub mod story;
pub mod types;
