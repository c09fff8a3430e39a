pub mod identity;
pub mod middleware;
pub mod permissions;
pub mod verifier;
