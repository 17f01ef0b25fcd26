use crate::helper::slug_helpers;
use crate::models::db_operations::gateway::{Collection, Filter, Query};
use crate::models::db_operations::posts_db_operations::{
    from_record, claim_error, to_record, ContentRepository, RepositoryError,
};
use crate::models::Category;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Serialize)]
struct CategoryInsert<'a> {
    name: &'a str,
    slug: &'a str,
}

impl ContentRepository {
    /// Categories sorted by name.
    pub fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        self.gateway
            .select(Collection::Categories, &Query::new().order_asc("name"))?
            .into_iter()
            .map(|row| from_record(Collection::Categories, row))
            .collect()
    }

    pub fn find_category_by_slug(&self, slug: &str) -> Result<Option<Category>, RepositoryError> {
        let rows = self
            .gateway
            .select(Collection::Categories, &Query::new().eq("slug", slug).limit(1))?;
        rows.into_iter()
            .next()
            .map(|row| from_record(Collection::Categories, row))
            .transpose()
    }

    /// Stores a category, deriving the slug from `name` when `slug` is blank.
    /// Fails with `SlugTaken` when another category holds the slug.
    pub fn create_category(&self, name: &str, slug: &str) -> Result<Category, RepositoryError> {
        let slug = if slug.trim().is_empty() {
            slug_helpers::slugify(name)
        } else {
            slug.to_string()
        };
        let record = to_record(Collection::Categories, &CategoryInsert { name: name.trim(), slug: &slug })?;
        let stored = self
            .gateway
            .insert_unique(Collection::Categories, record, "slug")
            .map_err(claim_error)?;
        from_record(Collection::Categories, stored)
    }

    /// Hard delete. Posts referencing the category are left alone and read
    /// back as "Uncategorized".
    pub fn delete_category(&self, id: &str) -> Result<(), RepositoryError> {
        self.gateway.delete(Collection::Categories, &[Filter::eq("id", id)])?;
        Ok(())
    }

    /// `id -> name` lookup used to join category names onto posts.
    pub(crate) fn category_names(&self) -> Result<HashMap<String, String>, RepositoryError> {
        Ok(self
            .list_categories()?
            .into_iter()
            .map(|category| (category.id, category.name))
            .collect())
    }
}
