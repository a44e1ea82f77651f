pub mod sessions;
pub mod streams;
pub mod tokens;
pub mod validation;
