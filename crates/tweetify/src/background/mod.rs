// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background tasks: playback polling and idle connection sweeping.

pub mod playback;
pub mod sweeper;

pub use playback::{spawn_playback_poller, PlaybackPoller};
pub use sweeper::{spawn_idle_sweeper, sweep_once};
