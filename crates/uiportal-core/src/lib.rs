//! Core types and logic for uiportal.
//!
//! This crate provides shared data structures and algorithms for driving a
//! device UI from an automation agent. It's used by both the CLI/daemon and
//! embedding host processes.
//!
//! # Modules
//!
//! - [`error`]: error taxonomy with actionable suggestions for AI consumers
//! - [`geometry`]: screen rectangles and offset correction
//! - [`input`]: keyboard payload decoding (base64/hex text, key codes)
//! - [`protocol`]: JSON-line request/response envelope
//! - [`tree`]: element snapshot model and tree serialization
//!
//! # Response contract
//!
//! Every request terminates in exactly one [`protocol::ResponseEnvelope`]:
//! either `{"status":"success","data":...}` or
//! `{"status":"error","error":"[CODE] message"}`. Collaborator failures,
//! malformed payloads, and unknown endpoints all surface as error envelopes;
//! nothing propagates to the caller as a transport-level fault.

pub mod error;
pub mod geometry;
pub mod input;
pub mod protocol;
pub mod tree;
