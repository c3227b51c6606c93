//! igcse-assess-core: mastery analysis and practice-paper assembly.
//!
//! This crate holds the data model, the topic mapper, the weakness
//! analyzer, the paper assembler and the engine that runs them over a
//! whole class.

pub mod analyzer;
pub mod assembler;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod mapper;
pub mod model;
pub mod parser;
pub mod report;
pub mod roster;
pub mod statistics;
