// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod envelope;
pub mod error;
pub mod inbox;
pub mod invite;
pub mod node_config;
pub mod session;
pub mod swarm;
pub mod wake;

pub use envelope::{Envelope, MessageType, Priority, Sender, SystemContent};
pub use error::ErrorCode;
pub use swarm::{Member, SwarmMembership, SwarmSettings};
