mod database {
    pub mod actions;
    pub mod error;
    pub mod form;
    pub mod schema;
}
mod authentication {
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
mod config;
mod constants;

mod cache {
    pub mod catalog;
}

pub mod shopping_list {
    mod aggregate;
    mod download;
    mod render;

    pub use aggregate::*;
    pub use download::*;
    pub use render::*;
}

pub use authentication::*;
pub use cache::catalog::*;
pub use config::*;
pub use constants::*;
pub use database::*;
