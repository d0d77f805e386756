pub mod types;
pub mod parser;
pub mod request;
pub mod compile;
pub mod filter_where;
pub mod filter_order;
pub mod eval;

pub use types::*;
pub use parser::parse_filters;
pub use request::{create_pagination_response, parse_find_options, parse_pagination, parse_sort, PaginationMeta};
pub use compile::{compile, compile_sort, CompileTarget, Condition, OrderBy, Predicate};
pub use filter_where::FilterWhere;
pub use filter_order::FilterOrder;
