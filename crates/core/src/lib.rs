//! Dual peak filter core
//!
//! Parameter surface, coefficient math, per-channel filter chains and the
//! response-curve engine. Nothing in here talks to an audio device; see the
//! `dualpeak-infra` crate for that.

pub mod domain;
