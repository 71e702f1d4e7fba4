//! Routers: operational endpoints, catalog administration and module records.

mod catalog;
mod common;
mod records;

pub use catalog::catalog_routes;
pub use common::{common_routes, common_routes_with_ready};
pub use records::record_routes;
