// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain types shared by every vcycle crate: spaces, machinetypes,
//! machines, configuration, the testable clock, and the error
//! classification threaded through the whole core (SPEC_FULL.md §3, §7).

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

#[macro_use]
mod macros;

pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod machine;
pub mod machinetype;
pub mod space;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{Config, Settings};
pub use error::{Result, Severity, VcycleError};
pub use ids::MachineName;
pub use machine::{Machine, MachineState};
pub use machinetype::{ImageRef, Machinetype, MachinetypeCounters};
pub use space::{Space, SpaceCredentials, VacmonEndpoint};
