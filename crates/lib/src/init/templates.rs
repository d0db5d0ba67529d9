//! Template content for `nativedeps init`.

/// Sample pipeline: NuSMV core with MiniSat (default) and ZChaff (optional).
pub const SAMPLE_CONFIG: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/nativedeps.toml"));
