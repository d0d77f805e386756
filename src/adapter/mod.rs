//! Framework adapters. Each one turns [`RouteMapping`](crate::router::RouteMapping)s
//! into native routes and native requests into a
//! [`ControllerContext`](crate::controller::ControllerContext).
pub mod axum;

pub use self::axum::{create_router, AxumAdapter, StoreFactory, DEFAULT_BODY_LIMIT};
