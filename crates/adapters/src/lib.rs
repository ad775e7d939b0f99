// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! vcycle-adapters: cloud backend implementations behind the
//! [`cloud::CloudAdapter`] trait.

pub mod cloud;
pub mod openstack;

pub use cloud::{AdapterError, BlockDeviceMapping, CloudAdapter, Flavor, ServerRecord, ServerSpec};
pub use openstack::{OpenStackAdapter, OpenStackConfig};

#[cfg(any(test, feature = "test-support"))]
pub use cloud::fake::FakeCloudAdapter;
