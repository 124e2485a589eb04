//! Test Helper Utilities
//!
//! Shared utilities for testing tarot-reader

#![allow(dead_code)]

pub mod app;
pub mod scripted_transport;

pub use app::{connected_state, eventually, test_config, test_state};
pub use scripted_transport::{Reply, ScriptedTransport};
