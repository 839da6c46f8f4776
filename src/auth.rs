//! Credential names, scope sets, and token models.

pub mod name;
pub mod scope;
pub mod token;

pub use name::*;
pub use scope::*;
pub use token::{record::*, secret::*};
