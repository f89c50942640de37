//! Authentication system
//!
//! Handles user authentication and credential validation.

pub mod credentials;
pub mod validator;

pub use validator::{Authenticator, LoginStep, StaticAuthenticator};
