//! Hooks Module
//!
//! Catalog-specific query bindings. Each hook builds a stable key, wires the
//! matching API call as the fetch function and mounts a [`Query`](crate::query::Query).
//! Parameterized hooks treat a missing or empty parameter as disabled: no
//! key, no entry, no fetch.

mod catalog;
mod context;
mod products;

pub use catalog::{use_categories, use_option_types, use_option_values};
pub use context::CatalogContext;
pub use products::{
    use_all_products, use_product_by_id, use_product_by_name, use_products_by_category,
    PRODUCT_DETAIL_GC_TIME,
};

/// Non-empty parameter or nothing.
fn present(param: Option<&str>) -> Option<&str> {
    param.filter(|p| !p.is_empty())
}
