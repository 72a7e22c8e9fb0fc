// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Control-plane backends.

pub mod http;
pub mod mock;
mod traits;

pub use http::HttpControlPlane;
pub use mock::{MockCall, MockControlPlane, MockOp};
pub use traits::*;
