//! Simple OpenTelemetry helpers that work with current ecosystem
//!
//! This module provides basic trace context propagation using manual header
//! manipulation to avoid version conflicts in the OpenTelemetry ecosystem.

use http::{HeaderMap, HeaderName, HeaderValue};
use tracing::Span;

/// W3C Trace Context header name
pub const TRACEPARENT: &str = "traceparent";

/// Extract trace information from headers and return a span that can be used as parent
pub fn extract_trace_parent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(TRACEPARENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Inject current trace context into headers (simplified approach)
pub fn inject_trace_context(headers: &mut HeaderMap, _span: &Span) {
    // For now, we'll create a simple traceparent header
    // In a production implementation, this would extract the actual trace context from the span
    let span_id = format!("{:016x}", rand::random::<u64>());
    let trace_id = format!("{:032x}", rand::random::<u128>());
    let flags = "01"; // sampled

    let traceparent = format!("00-{}-{}-{}", trace_id, span_id, flags);

    if let Ok(header_value) = HeaderValue::from_str(&traceparent) {
        headers.insert(HeaderName::from_static(TRACEPARENT), header_value);
    }
}

/// Set span as child of the trace context from headers
pub fn set_parent_from_headers(span: &Span, headers: &HeaderMap) {
    if let Some(traceparent) = extract_trace_parent(headers) {
        // Record the parent trace ID for correlation
        if let Some(trace_id) = parse_trace_id(&traceparent) {
            span.record("trace_id", &trace_id);
            span.record("parent.trace_id", &trace_id);
        }
    }
}

/// Parse trace ID from traceparent header
fn parse_trace_id(traceparent: &str) -> Option<String> {
    let parts: Vec<&str> = traceparent.split('-').collect();
    if parts.len() >= 4 && parts[0] == "00" {
        Some(parts[1].to_string())
    } else {
        None
    }
}
