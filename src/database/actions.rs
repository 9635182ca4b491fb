mod collections;
mod follows;
mod ingredients;
mod recipes;
mod tags;
mod users;

pub use collections::*;
pub use follows::*;
pub use ingredients::*;
pub use recipes::*;
pub use tags::*;
pub use users::*;
