//! Session credentials: the bearer access token and the anti-CSRF token.

pub mod token;

pub use token::*;
