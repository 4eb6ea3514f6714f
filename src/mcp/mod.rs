// SPDX-FileCopyrightText: 2026 Coderelay contributors
// SPDX-License-Identifier: MIT

//! Model Context Protocol (MCP) server surface.
//!
//! Every tool maps 1:1 onto an operation of the dispatch core, the snapshot
//! store, the change history, or the graph store.

mod server;
mod types;

pub use server::CoderelayMcp;
