// handlers/protected/mod.rs - Handlers behind bearer authentication
//
// Every declared resource is served by the same pipeline; the resource
// registry decides which verbs, roles and rules apply.

pub mod resource;
