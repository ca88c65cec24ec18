//! Product query hooks.
//!
//! Keys:
//! - `["products", "all"]`
//! - `["product", id]`
//! - `["products", "category", category]`
//! - `["product", "name", name]`

use std::time::Duration;

use crate::cache::QueryKey;
use crate::hooks::{present, CatalogContext};
use crate::models::{Product, Sku};
use crate::query::{fetch_fn, Query};
use crate::query_key;

/// Idle lifetime of product detail entries. Pinned at ten minutes so the
/// detail pages keep it even when the configured default changes.
pub const PRODUCT_DETAIL_GC_TIME: Duration = Duration::from_secs(10 * 60);

/// All products listed by the storefront.
pub fn use_all_products(ctx: &CatalogContext) -> Query<Vec<Product>> {
    let api = ctx.products.clone();
    let fetch = fetch_fn(move |_| {
        let api = api.clone();
        async move { api.get_products().await }
    });
    Query::observe(
        &ctx.queries,
        Some(query_key!["products", "all"]),
        fetch,
        ctx.queries.defaults().clone(),
    )
}

/// SKUs of one product. Disabled until `product_id` is a non-empty string.
pub fn use_product_by_id(ctx: &CatalogContext, product_id: Option<&str>) -> Query<Vec<Sku>> {
    let key = present(product_id).map(|id| query_key!["product", id]);
    let api = ctx.products.clone();
    let fetch = fetch_fn(move |key: QueryKey| {
        let api = api.clone();
        async move { api.get_product_by_id(&param(&key, 1)).await }
    });
    let options = ctx
        .queries
        .defaults()
        .clone()
        .gc_time(PRODUCT_DETAIL_GC_TIME)
        .enabled(key.is_some());
    Query::observe(&ctx.queries, key, fetch, options)
}

/// Products of one category. Disabled until `category` is non-empty.
pub fn use_products_by_category(ctx: &CatalogContext, category: Option<&str>) -> Query<Vec<Product>> {
    let key = present(category).map(|c| query_key!["products", "category", c]);
    let api = ctx.products.clone();
    let fetch = fetch_fn(move |key: QueryKey| {
        let api = api.clone();
        async move { api.get_products_by_category(&param(&key, 2)).await }
    });
    let options = ctx.queries.defaults().clone().enabled(key.is_some());
    Query::observe(&ctx.queries, key, fetch, options)
}

/// Products whose name matches `name`. Disabled until `name` is non-empty.
pub fn use_product_by_name(ctx: &CatalogContext, name: Option<&str>) -> Query<Vec<Product>> {
    let key = present(name).map(|n| query_key!["product", "name", n]);
    let api = ctx.products.clone();
    let fetch = fetch_fn(move |key: QueryKey| {
        let api = api.clone();
        async move { api.get_product_by_name(&param(&key, 2)).await }
    });
    let options = ctx.queries.defaults().clone().enabled(key.is_some());
    Query::observe(&ctx.queries, key, fetch, options)
}

// The fetch reads its parameter back from the key so one FetchFn serves
// every key of the hook.
fn param(key: &QueryKey, index: usize) -> String {
    match key.parts().get(index) {
        Some(crate::cache::KeyPart::Str(s)) => s.clone(),
        Some(part) => part.to_string(),
        None => String::new(),
    }
}
