// =============================================================================
// Dashboard API Module
// =============================================================================
//
// Read-only HTTP surface over the shared DashboardState: a REST router for
// point-in-time queries and a WebSocket feed for version-gated pushes.
// =============================================================================

pub mod rest;
pub mod ws;
