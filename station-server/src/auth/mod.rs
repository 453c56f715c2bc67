//! Access control: password storage, caller identity and permission
//! policies.

mod admin;
mod identity;
mod password;
mod permission;

pub use admin::{AdminError, ensure_admin};
pub use identity::{BasicCredentials, IdentityError, authenticate, basic_header, parse_basic};
pub use password::{
    HashError, MIN_LENGTH, PasswordError, hash_password, validate_password, verify_password,
};
pub use permission::{
    AccessDenied, Action, AdminOrAuthenticatedReadOnly, AllowAny, Authenticated, Permission,
};
