// =============================================================================
// Dashboard API
// =============================================================================
//
// JSON over HTTP for a browser dashboard. No authentication: the server is
// meant to run locally next to the UI.

pub mod rest;

pub use rest::router;
