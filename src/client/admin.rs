//! Admin product and SKU endpoints.

use tracing::info;

use crate::cache::KeyPart;
use crate::client::ApiClient;
use crate::error::Result;
use crate::models::{Product, ProductInput, Sku, SkuInput};
use crate::query::QueryClient;
use crate::query_key;

/// Product registration against `{admin}/product`.
#[derive(Debug, Clone)]
pub struct AdminProductApi {
    api: ApiClient,
    queries: QueryClient,
}

impl AdminProductApi {
    pub fn new(api: ApiClient, queries: QueryClient) -> Self {
        Self { api, queries }
    }

    /// GET /product
    pub async fn get_products(&self) -> Result<Vec<Product>> {
        Ok(self.api.get::<Vec<Product>>("/product").await?.data)
    }

    /// POST /product
    ///
    /// Every storefront product listing is invalidated, since the new
    /// product may belong to any of them.
    pub async fn create_product(&self, input: &ProductInput) -> Result<Product> {
        let created = self.api.post::<_, Product>("/product", input).await?.data;
        let invalidated = self.queries.invalidate_matching(&[KeyPart::from("products")]);
        info!(product = created.id, invalidated, "product created");
        Ok(created)
    }
}

/// SKU reads and mutations for one product at a time.
///
/// Reads live under `{admin}/product/{id}/sku` and `{admin}/sku/{id}`;
/// writes go to `{admin}/{product_id}/sku`.
#[derive(Debug, Clone)]
pub struct SkuApi {
    api: ApiClient,
    queries: QueryClient,
}

impl SkuApi {
    pub fn new(api: ApiClient, queries: QueryClient) -> Self {
        Self { api, queries }
    }

    /// GET /product/{product_id}/sku
    pub async fn get_skus_by_product_id(&self, product_id: i64) -> Result<Vec<Sku>> {
        let path = format!("/product/{}/sku", product_id);
        Ok(self.api.get::<Vec<Sku>>(&path).await?.data)
    }

    /// GET /sku/{sku_id}
    pub async fn get_sku_by_id(&self, sku_id: i64) -> Result<Sku> {
        Ok(self.api.get::<Sku>(&format!("/sku/{}", sku_id)).await?.data)
    }

    /// POST /{product_id}/sku
    pub async fn create_sku(&self, product_id: i64, input: &SkuInput) -> Result<Sku> {
        let path = format!("/{}/sku", product_id);
        let created = self.api.post::<_, Sku>(&path, input).await?.data;
        self.invalidate_product(product_id);
        Ok(created)
    }

    /// PUT /{product_id}/sku/{sku_id}
    pub async fn update_sku(&self, product_id: i64, sku_id: i64, input: &SkuInput) -> Result<Sku> {
        let path = format!("/{}/sku/{}", product_id, sku_id);
        let updated = self.api.put::<_, Sku>(&path, input).await?.data;
        self.invalidate_product(product_id);
        Ok(updated)
    }

    /// DELETE /{product_id}/sku/{sku_id}
    pub async fn delete_sku(&self, product_id: i64, sku_id: i64) -> Result<()> {
        self.api.delete(&format!("/{}/sku/{}", product_id, sku_id)).await?;
        self.invalidate_product(product_id);
        Ok(())
    }

    // SKU prices feed the listings' price ranges, so those go stale too.
    fn invalidate_product(&self, product_id: i64) {
        // Detail keys carry the id as it appears in the storefront URL.
        let detail = self.queries.invalidate(&query_key!["product", product_id.to_string()]);
        let listings = self.queries.invalidate_matching(&[KeyPart::from("products")]);
        info!(product = product_id, detail, listings, "skus changed, cached queries invalidated");
    }
}
