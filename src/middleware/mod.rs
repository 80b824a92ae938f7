pub mod auth;
pub mod maintenance;
pub mod response;
pub mod security;

pub use auth::{jwt_auth_middleware, AuthConfig, AuthUser};
pub use maintenance::maintenance_middleware;
pub use response::{render, Envelope};
pub use security::{with_security_headers, SECURITY_HEADERS};
