//! Application-root handle threaded through every hook.

use crate::client::{AdminProductApi, ApiClient, CategoryApi, OptionApi, ProductApi, SkuApi};
use crate::config::Config;
use crate::query::QueryClient;

/// Query client plus the API services the hooks fetch through.
///
/// Build one at the application root and pass references down; clones
/// share the same cache and connection pool.
#[derive(Debug, Clone)]
pub struct CatalogContext {
    pub queries: QueryClient,
    pub products: ProductApi,
    pub categories: CategoryApi,
    pub options: OptionApi,
    pub admin_products: AdminProductApi,
    pub skus: SkuApi,
}

impl CatalogContext {
    /// Wires the services for a storefront base URL and an admin base URL.
    pub fn new(queries: QueryClient, api_base_url: &str, admin_base_url: &str) -> Self {
        let http = reqwest::Client::new();
        let storefront = ApiClient::with_client(http.clone(), api_base_url);
        let admin = ApiClient::with_client(http, admin_base_url);
        Self {
            products: ProductApi::new(storefront),
            categories: CategoryApi::new(admin.clone(), queries.clone()),
            options: OptionApi::new(admin.clone(), queries.clone()),
            admin_products: AdminProductApi::new(admin.clone(), queries.clone()),
            skus: SkuApi::new(admin, queries.clone()),
            queries,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            QueryClient::from_config(config),
            &config.api_base_url,
            &config.admin_base_url,
        )
    }
}
