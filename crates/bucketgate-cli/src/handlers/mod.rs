//! Gateway request handlers

pub mod bucket;
pub mod object;
pub mod service;

pub use bucket::*;
pub use object::*;
pub use service::*;
