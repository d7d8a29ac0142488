pub mod auth;
pub mod rate_limit;

pub use auth::{actor_middleware, issue_token, Claims, JwtIdentityResolver};
pub use rate_limit::rate_limit_middleware;
