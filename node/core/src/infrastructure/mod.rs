// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod crypto;
pub mod db;
pub mod export;
pub mod invoker;
pub mod rate_limit;
pub mod repositories;
pub mod tokens;
pub mod transport;
