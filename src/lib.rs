//! Compiles free-text editing prompts into ordered ffmpeg argument lists.
//!
//! The pipeline is `prompt_parser::parse` -> `plan::assemble` -> `filter_graph::compile`,
//! with `tempo::clamp_tempo` splitting speed changes into `atempo`-sized steps.

pub mod config;
pub mod error_codes;
pub mod executor;
pub mod filter_graph;
pub mod logging;
pub mod operation;
pub mod plan;
pub mod prompt_parser;
pub mod tempo;
