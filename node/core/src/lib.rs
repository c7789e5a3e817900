// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # AEGIS Mesh core
//!
//! Peer-to-peer messaging substrate for autonomous agents. Every node is
//! symmetric: it accepts signed envelopes from swarm peers over HTTPS and
//! emits its own. There is no broker; each node owns its store, inbox and
//! outbox, and the swarm master is the only membership authority.
//!
//! # Architecture
//!
//! - **domain:** wire envelope, swarm membership records, invite claims,
//!   wake preferences, node configuration, error taxonomy.
//! - **application:** membership, messaging, receive pipeline, lifecycle
//!   notifications, wake trigger, session manager.
//! - **infrastructure:** Ed25519 crypto, invite JWTs, SQLite store and
//!   repositories, outbound transport, rate limiting, invoker, state export.
//! - **presentation:** axum routers for `/swarm/*` and `/api/wake`.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

/// Wire protocol version spoken by this node.
pub const PROTOCOL_VERSION: &str = "0.1.0";
