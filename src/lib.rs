//! Conductor - request orchestration for conversational AI.
//!
//! Every inbound event runs through a fixed eight-stage pipeline: intake
//! and validation, context analysis, persona routing, capability
//! execution, memory update, response generation and feedback. Provider
//! calls go through a circuit-breaking router with plan-aware fallbacks,
//! and capabilities run under per-definition timeout, rate-limit and
//! fallback policies.

pub mod adapters;
pub mod application;
pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod ports;
