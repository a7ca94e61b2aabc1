pub mod path;

pub use self::path::{sanitize, split_extension};
