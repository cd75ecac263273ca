mod entity;
mod query;
mod result;

pub use entity::*;
pub use query::*;
pub use result::*;
