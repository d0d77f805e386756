use super::compile::OrderBy;
use super::filter_where::quote_ident;

pub struct FilterOrder;

impl FilterOrder {
    pub fn generate(order: &[OrderBy]) -> String {
        if order.is_empty() { return String::new(); }
        let parts: Vec<String> = order
            .iter()
            .map(|o| format!("{} {}", quote_ident(&o.column), o.direction.to_sql()))
            .collect();
        format!("ORDER BY {}", parts.join(", "))
    }
}
