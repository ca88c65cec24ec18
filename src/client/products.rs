//! Storefront product endpoints.

use crate::client::ApiClient;
use crate::error::Result;
use crate::models::{Product, Sku};

/// Product reads against the storefront API (`{api}/product`).
#[derive(Debug, Clone)]
pub struct ProductApi {
    api: ApiClient,
}

impl ProductApi {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// GET /product
    pub async fn get_products(&self) -> Result<Vec<Product>> {
        Ok(self.api.get::<Vec<Product>>("/product").await?.data)
    }

    /// GET /product/{id}: the product's SKUs.
    pub async fn get_product_by_id(&self, id: &str) -> Result<Vec<Sku>> {
        Ok(self.api.get::<Vec<Sku>>(&format!("/product/{}", id)).await?.data)
    }

    /// GET /product?category={category}
    pub async fn get_products_by_category(&self, category: &str) -> Result<Vec<Product>> {
        Ok(self
            .api
            .get_query::<Vec<Product>>("/product", &[("category", category)])
            .await?
            .data)
    }

    /// GET /product/search?name={name}
    pub async fn get_product_by_name(&self, name: &str) -> Result<Vec<Product>> {
        Ok(self
            .api
            .get_query::<Vec<Product>>("/product/search", &[("name", name)])
            .await?
            .data)
    }
}
