#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

//! Citadel daemon library: HTTP scan API and MCP stdio proxy.

pub mod api;
pub mod proxy;
pub mod setup;
pub mod state;
