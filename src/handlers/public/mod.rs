// handlers/public/mod.rs - Handlers reachable without a bearer token
//
// The index route still passes through authentication unless it is listed
// as a public path; `get-token` is always public.

pub mod index;
pub mod token;

pub use index::{index, not_found};
pub use token::get_token;
