// handlers/mod.rs - Two-tier handler layout
//
// Public (token acquisition, index, fallbacks) and protected (the resource
// pipeline). Authentication itself happens in middleware before either runs.

pub mod protected;
pub mod public;
