// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Library interface to the operations center, which forms hypervisor servers
//! into clusters and keeps its record of those clusters in line with reality

// We only use rustdoc for internal documentation, including private items, so
// it's expected that we'll have links to private items in the docs.
#![allow(rustdoc::private_intra_doc_links)]

pub mod app;
pub mod params;
pub mod views;

pub use app::Opcenter;
pub use opcenter_config::Config;
pub use opcenter_db_queries::{context, db};

use slog::Logger;

#[macro_use]
extern crate slog;

/// Builds the process-wide logger described by the `[log]` table of
/// `config`.
pub fn build_logger(config: &Config) -> Result<Logger, String> {
    config
        .log
        .to_logger("opcenter")
        .map_err(|message| format!("initializing logger: {}", message))
}
