//! Schema-driven CRUD resources.
//!
//! Schemas become controllers (`controller`), route specs become mappings
//! (`router`), and an adapter (`adapter`) mounts the mappings on an HTTP
//! framework. Query strings use the bracket filter DSL in `filter`.

pub mod adapter;
pub mod config;
pub mod controller;
pub mod error;
pub mod filter;
pub mod middleware;
pub mod repository;
pub mod resource;
pub mod router;
pub mod schema;
