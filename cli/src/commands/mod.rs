// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod init;
pub mod message;
pub mod mute;
pub mod serve;
pub mod state;
pub mod swarm;

pub use message::MessageCommand;
pub use mute::{MuteCommand, UnmuteCommand};
pub use state::StateCommand;
pub use swarm::SwarmCommand;
