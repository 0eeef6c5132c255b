//! HTTP utilities for modkit
//!
//! This module provides shared HTTP types and utilities for building
//! modular web applications.

pub mod client;
pub mod otel;
pub mod simple_otel;
pub mod sse;
