mod extract;
mod jwt;
mod password;

pub use extract::AuthUser;
pub use jwt::{create_token, verify_token, Claims};
pub use password::{hash_password, verify_password};
