//! Gap detection and cursor-paginated
//! backfill for time-slotted post
//! archives.
//!
//! Layout follows a ports/adapters
//! split: `domain` holds pure types and
//! algorithms, `ports` the async seams,
//! `infra` the concrete adapters and
//! `app` the orchestration on top.

pub mod app;
pub mod domain;
pub mod infra;
pub mod ports;
