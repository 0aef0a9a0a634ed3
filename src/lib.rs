//! Packs a chart's remote assets (video, jacket, audio, chart data) into a
//! single stored-only `.adx` archive.
//!
//! [`app::App::download_item`] is the entry point: it fetches every requested
//! resource concurrently, tolerates partial failure, builds the archive with
//! fixed entry names and hands it to a [`delivery::DeliverySink`], emitting
//! one `loading` and one terminal status through [`notify::center`].

pub mod app;
pub mod archive;
pub mod assembler;
pub mod config;
pub mod delivery;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod notify;
pub mod output;
