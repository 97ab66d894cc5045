//! # delve-core
//!
//! Foundation types for the Delve deep-research client.
//!
//! This crate provides the shared vocabulary the session client is built on:
//!
//! - **Wire protocol**: [`protocol::Frame`] tagged union with a total decoder
//! - **Errors**: [`errors`] hierarchy via `thiserror`, with remediation hints
//! - **Classification**: [`classify`] maps backend error text to categories
//! - **Configuration**: [`config`] serde types consumed, not owned, by the core
//! - **Backoff**: portable reconnect delay math in [`backoff`]
//! - **Branded IDs**: [`ids::SessionId`] newtype for log correlation

#![deny(unsafe_code)]

pub mod backoff;
pub mod classify;
pub mod config;
pub mod errors;
pub mod ids;
pub mod protocol;
