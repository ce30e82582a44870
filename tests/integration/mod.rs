//! Integration tests for bisectrix
//!
//! These tests verify that multiple components work together correctly.

#[path = "../common/mod.rs"]
pub mod common;

pub mod bisection_flow;
pub mod orchestrator_flow;
