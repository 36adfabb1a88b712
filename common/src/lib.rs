// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Operations center common facilities
//!
//! Types shared by every crate of the operations center control plane: the
//! public error taxonomy and the retry policies used by callers that wrap
//! control plane operations in an outer retry loop.

pub mod api;
pub mod backoff;
