//! Reference-data hooks used by the admin pages.
//!
//! Keys: `["categories"]`, `["options", "type"]`, `["options", "value", type_id]`.

use crate::cache::{KeyPart, QueryKey};
use crate::client::OptionApi;
use crate::error::QueryError;
use crate::hooks::CatalogContext;
use crate::models::{Category, OptionType, OptionValue};
use crate::query::{fetch_fn, FetchFn, Query};
use crate::query_key;

pub fn use_categories(ctx: &CatalogContext) -> Query<Vec<Category>> {
    let api = ctx.categories.clone();
    let fetch = fetch_fn(move |_| {
        let api = api.clone();
        async move { api.get_all_categories().await }
    });
    Query::observe(
        &ctx.queries,
        Some(query_key!["categories"]),
        fetch,
        ctx.queries.defaults().clone(),
    )
}

pub fn use_option_types(ctx: &CatalogContext) -> Query<Vec<OptionType>> {
    let api = ctx.options.clone();
    let fetch = fetch_fn(move |_| {
        let api = api.clone();
        async move { api.get_option_types().await }
    });
    Query::observe(
        &ctx.queries,
        Some(query_key!["options", "type"]),
        fetch,
        ctx.queries.defaults().clone(),
    )
}

/// Values of one option group. Disabled until a group is selected.
pub fn use_option_values(ctx: &CatalogContext, type_id: Option<i64>) -> Query<Vec<OptionValue>> {
    let key = type_id.map(|id| query_key!["options", "value", id]);
    let fetch = option_values_fetch(ctx.options.clone());
    let options = ctx.queries.defaults().clone().enabled(key.is_some());
    Query::observe(&ctx.queries, key, fetch, options)
}

// Reads the group id back from `["options", "value", type_id]`.
fn option_values_fetch(api: OptionApi) -> FetchFn {
    fetch_fn(move |key: QueryKey| {
        let api = api.clone();
        async move {
            let type_id = match key.parts().get(2) {
                Some(KeyPart::Int(id)) => *id,
                _ => {
                    return Err(QueryError::Misuse(format!(
                        "option values key {} has no group id",
                        key
                    )))
                }
            };
            api.get_option_values(type_id).await
        }
    })
}
