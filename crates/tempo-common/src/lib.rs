#![doc = "Common types shared across the tempo workspace."]

pub mod binding;
pub mod conditions;
pub mod config;
pub mod error;
pub mod time;
pub mod value;

pub use binding::*;
pub use conditions::*;
pub use config::*;
pub use error::*;
pub use time::*;
pub use value::*;
