//! # Continuum Types Crate
//!
//! Addressing and envelope types shared by every Continuum crate.
//!
//! ## Contents
//!
//! - [`Cri`]: the Continuum Resource Identifier,
//!   `scheme://[scope@]resourceName[#version][/path]`.
//! - [`CriPattern`]: glob patterns over CRIs, used by authorization allow-lists.
//! - [`Event`]: the protocol-neutral message envelope (CRI, metadata, payload).
//! - [`Participant`]: the authenticated identity acting through a session.
//!
//! ## Design Principles
//!
//! - **Immutable addresses**: a `Cri` never changes after it is parsed or
//!   created; derived addresses are new values.
//! - **Round trip**: `Cri::parse(cri.raw())` reproduces the same components
//!   for every CRI this crate builds.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod cri;
pub mod event;
pub mod participant;

pub use cri::{Cri, CriError, CriPattern, Scheme};
pub use event::{headers, Event, Metadata};
pub use participant::{decode_scope_segment, encode_scope_segment, Participant};
