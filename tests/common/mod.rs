//! Shared test utilities for bisectrix
//!
//! This module provides common helpers for integration tests:
//! - Temporary databases with store access
//! - Session specs and orchestrators wired to mock evaluators

pub mod fixtures;
