//! Admin catalog endpoints: categories and option groups.
//!
//! Mutations invalidate the cached queries they affect once the server has
//! accepted them, so mounted bindings refetch.

use tracing::info;

use crate::cache::KeyPart;
use crate::client::ApiClient;
use crate::error::Result;
use crate::models::{
    Category, CategoryInput, OptionType, OptionTypeInput, OptionValue, OptionValueInput,
};
use crate::query::QueryClient;

/// Category reads and mutations against `{admin}/category`.
#[derive(Debug, Clone)]
pub struct CategoryApi {
    api: ApiClient,
    queries: QueryClient,
}

impl CategoryApi {
    pub fn new(api: ApiClient, queries: QueryClient) -> Self {
        Self { api, queries }
    }

    /// GET /category
    pub async fn get_all_categories(&self) -> Result<Vec<Category>> {
        Ok(self.api.get::<Vec<Category>>("/category").await?.data)
    }

    /// POST /category
    pub async fn create_category(&self, input: &CategoryInput) -> Result<Category> {
        let created = self.api.post::<_, Category>("/category", input).await?.data;
        self.invalidate_categories();
        Ok(created)
    }

    /// PUT /category/{id}
    pub async fn update_category(&self, id: i64, input: &CategoryInput) -> Result<Category> {
        let updated = self.api.put::<_, Category>(&format!("/category/{}", id), input).await?.data;
        self.invalidate_categories();
        Ok(updated)
    }

    /// DELETE /category/{id}
    pub async fn delete_category(&self, id: i64) -> Result<()> {
        self.api.delete(&format!("/category/{}", id)).await?;
        self.invalidate_categories();
        Ok(())
    }

    fn invalidate_categories(&self) {
        let mut invalidated = self.queries.invalidate_matching(&[KeyPart::from("categories")]);
        invalidated += self
            .queries
            .invalidate_matching(&[KeyPart::from("products"), KeyPart::from("category")]);
        info!(invalidated, "category changed, cached queries invalidated");
    }
}

/// Option groups and their values against `{admin}/options`.
#[derive(Debug, Clone)]
pub struct OptionApi {
    api: ApiClient,
    queries: QueryClient,
}

impl OptionApi {
    pub fn new(api: ApiClient, queries: QueryClient) -> Self {
        Self { api, queries }
    }

    /// GET /options/type
    pub async fn get_option_types(&self) -> Result<Vec<OptionType>> {
        Ok(self.api.get::<Vec<OptionType>>("/options/type").await?.data)
    }

    /// GET /options/type/{id}
    pub async fn get_option_type(&self, id: i64) -> Result<OptionType> {
        Ok(self.api.get::<OptionType>(&format!("/options/type/{}", id)).await?.data)
    }

    /// POST /options/type
    pub async fn create_option_type(&self, input: &OptionTypeInput) -> Result<OptionType> {
        let created = self.api.post::<_, OptionType>("/options/type", input).await?.data;
        self.invalidate_options();
        Ok(created)
    }

    /// PUT /options/type/{id}
    pub async fn update_option_type(&self, id: i64, input: &OptionTypeInput) -> Result<OptionType> {
        let path = format!("/options/type/{}", id);
        let updated = self.api.put::<_, OptionType>(&path, input).await?.data;
        self.invalidate_options();
        Ok(updated)
    }

    /// DELETE /options/type/{id}
    pub async fn delete_option_type(&self, id: i64) -> Result<()> {
        self.api.delete(&format!("/options/type/{}", id)).await?;
        self.invalidate_options();
        Ok(())
    }

    /// GET /options/value?optionTypeId={type_id}
    pub async fn get_option_values(&self, type_id: i64) -> Result<Vec<OptionValue>> {
        let type_id = type_id.to_string();
        Ok(self
            .api
            .get_query::<Vec<OptionValue>>("/options/value", &[("optionTypeId", type_id.as_str())])
            .await?
            .data)
    }

    /// GET /options/value/{id}
    pub async fn get_option_value(&self, id: i64) -> Result<OptionValue> {
        Ok(self.api.get::<OptionValue>(&format!("/options/value/{}", id)).await?.data)
    }

    /// POST /options/value
    pub async fn create_option_value(&self, input: &OptionValueInput) -> Result<OptionValue> {
        let created = self.api.post::<_, OptionValue>("/options/value", input).await?.data;
        self.invalidate_options();
        Ok(created)
    }

    /// PUT /options/value/{id}
    pub async fn update_option_value(&self, id: i64, input: &OptionValueInput) -> Result<OptionValue> {
        let path = format!("/options/value/{}", id);
        let updated = self.api.put::<_, OptionValue>(&path, input).await?.data;
        self.invalidate_options();
        Ok(updated)
    }

    /// DELETE /options/value/{id}
    pub async fn delete_option_value(&self, id: i64) -> Result<()> {
        self.api.delete(&format!("/options/value/{}", id)).await?;
        self.invalidate_options();
        Ok(())
    }

    fn invalidate_options(&self) {
        let invalidated = self.queries.invalidate_matching(&[KeyPart::from("options")]);
        info!(invalidated, "option groups changed, cached queries invalidated");
    }
}
