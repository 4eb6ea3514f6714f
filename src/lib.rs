// SPDX-FileCopyrightText: 2026 Coderelay contributors
// SPDX-License-Identifier: MIT

//! Coderelay — codebase graph server with command dispatch, snapshots, and an
//! MCP tool surface.
//!
//! The interesting machinery lives in [`dispatch`] (filtered, at-most-once
//! command delivery to waiting agents) and [`snapshot`] (point-in-time
//! capture/restore of the graph). Everything else is the model, the graph
//! store seam, and the MCP surface that exposes it all.

pub mod dispatch;
pub mod graph;
pub mod history;
pub mod mcp;
pub mod model;
pub mod snapshot;

#[cfg(test)]
mod tests {
    #[test]
    fn sanity() {
        assert_eq!(2 + 2, 4);
    }
}
