//! nativedeps-lib: fetch, patch and build third-party native projects.
//!
//! The pipeline is a target graph: a host requirement check, then per
//! component `fetch -> patch -> build`, with the core component's build
//! gated on every selected solver build. Completed targets leave sentinels
//! in the work tree so repeated invocations only redo what changed.
//!
//! - `config`: the `nativedeps.toml` declaration and setting resolution
//! - `execute`: declaring, planning and realizing the target graph
//! - `action`: what targets do, behind the `ActionRunner` capability
//! - `clean`: returning the work tree to its pre-fetch state

pub mod action;
pub mod clean;
pub mod config;
pub mod consts;
pub mod execute;
pub mod init;
pub mod lock;
pub mod paths;
pub mod requirements;
pub mod sentinel;
pub mod target;
pub mod util;
