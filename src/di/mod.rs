//! Dependency injection: the environment and the graph it commits to.

mod environment;
mod injector;

pub use environment::{Environment, EnvironmentState};
pub use injector::{Injector, Resolver};

use serde::{Deserialize, Serialize};

/// How the graph build treats two bindings for the same key.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ConflictPolicy {
    /// The binding from the later module replaces the earlier one.
    #[default]
    LastWriteWins,
    /// Duplicate keys fail the commit.
    Reject,
}
