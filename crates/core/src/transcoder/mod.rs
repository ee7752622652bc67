//! Transcoder worker: one external transcode per media item.
//!
//! A [`Transcoder`] is `Idle` until [`Transcoder::process`] hands it an item,
//! then `Busy` until the orchestrator reaps the result with
//! [`Transcoder::reap`]. The run itself reports a numeric [`ResultCode`] and
//! never an error; the orchestrator decides whether a code is a retry or a
//! permanent failure.

mod worker;

pub use worker::{ResultCode, TranscodeOutcome, Transcoder, TranscoderState};
