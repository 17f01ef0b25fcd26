use crate::helper::slug_helpers;
use crate::models::db_operations::gateway::{Collection, Filter, GatewayError, PersistenceGateway, Query, Record};
use crate::models::{NewPost, Post, PostChanges, PostStatus, PostView, UNCATEGORIZED};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("{0}")]
    Gateway(#[from] GatewayError),
    #[error("Malformed row in '{collection}': {message}")]
    Malformed { collection: &'static str, message: String },
    #[error("Slug '{0}' is already in use.")]
    SlugTaken(String),
}

// A slug conflict from a guarded write becomes `SlugTaken`.
pub(crate) fn claim_error(e: GatewayError) -> RepositoryError {
    match e {
        GatewayError::Conflict { column: "slug", value } => RepositoryError::SlugTaken(value),
        other => RepositoryError::Gateway(other),
    }
}

#[derive(Serialize)]
struct PostInsert<'a> {
    #[serde(flatten)]
    fields: &'a NewPost,
    created_at: DateTime<Utc>,
}

/// Typed CRUD for posts and categories. The untyped gateway rows stop here.
///
/// Role checks are not done at this level; the publishing workflow is the
/// only caller of the mutating operations.
#[derive(Clone)]
pub struct ContentRepository {
    pub(crate) gateway: Arc<dyn PersistenceGateway>,
}

impl ContentRepository {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        ContentRepository { gateway }
    }

    /// Published posts, newest publication first, each joined with its
    /// category name.
    pub fn list_published(&self) -> Result<Vec<PostView>, RepositoryError> {
        let query = Query::new()
            .eq("status", PostStatus::Published.as_str())
            .order_desc("published_at");
        let posts = self.select_posts(&query)?;
        self.annotate(posts)
    }

    /// `None` when no published post carries `slug`. When several do, the
    /// most recently created one wins.
    pub fn get_published_by_slug(&self, slug: &str) -> Result<Option<PostView>, RepositoryError> {
        let query = Query::new()
            .eq("slug", slug)
            .eq("status", PostStatus::Published.as_str())
            .order_desc("created_at")
            .limit(1);
        let posts = self.select_posts(&query)?;
        Ok(self.annotate(posts)?.into_iter().next())
    }

    /// Every post regardless of status, newest first.
    pub fn list_all(&self) -> Result<Vec<Post>, RepositoryError> {
        self.select_posts(&Query::new().order_desc("created_at"))
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<Post>, RepositoryError> {
        let posts = self.select_posts(&Query::new().eq("id", id).limit(1))?;
        Ok(posts.into_iter().next())
    }

    /// All posts using `slug`, in any status.
    pub fn find_by_slug(&self, slug: &str) -> Result<Vec<Post>, RepositoryError> {
        self.select_posts(&Query::new().eq("slug", slug).order_desc("created_at"))
    }

    /// Stores a new post. A blank slug is derived from the title. Slugs are
    /// not deduplicated here.
    pub fn create(&self, draft: NewPost) -> Result<Post, RepositoryError> {
        let record = post_record(draft)?;
        let stored = self.gateway.insert(Collection::Posts, record)?;
        from_record(Collection::Posts, stored)
    }

    /// `create`, failing with `SlugTaken` when another post already holds
    /// the slug. The check and the insert are one write.
    pub fn create_claiming_slug(&self, draft: NewPost) -> Result<Post, RepositoryError> {
        let record = post_record(draft)?;
        let stored = self
            .gateway
            .insert_unique(Collection::Posts, record, "slug")
            .map_err(claim_error)?;
        from_record(Collection::Posts, stored)
    }

    /// Applies a partial update. `None` when the id is unknown.
    pub fn update(&self, id: &str, changes: &PostChanges) -> Result<Option<Post>, RepositoryError> {
        let patch = to_record(Collection::Posts, changes)?;
        if patch.is_empty() {
            return self.get_by_id(id);
        }
        match self.gateway.update(Collection::Posts, id, patch)? {
            Some(stored) => Ok(Some(from_record(Collection::Posts, stored)?)),
            None => Ok(None),
        }
    }

    /// `update`, failing with `SlugTaken` when the resulting slug belongs to
    /// a different post.
    pub fn update_claiming_slug(&self, id: &str, changes: &PostChanges) -> Result<Option<Post>, RepositoryError> {
        let patch = to_record(Collection::Posts, changes)?;
        match self
            .gateway
            .update_unique(Collection::Posts, id, patch, "slug")
            .map_err(claim_error)?
        {
            Some(stored) => Ok(Some(from_record(Collection::Posts, stored)?)),
            None => Ok(None),
        }
    }

    /// Hard delete. Deleting an unknown id is not an error.
    pub fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let removed = self.gateway.delete(Collection::Posts, &[Filter::eq("id", id)])?;
        if removed == 0 {
            log::debug!("Delete of post {} matched no rows", id);
        }
        Ok(())
    }

    fn select_posts(&self, query: &Query) -> Result<Vec<Post>, RepositoryError> {
        self.gateway
            .select(Collection::Posts, query)?
            .into_iter()
            .map(|row| from_record(Collection::Posts, row))
            .collect()
    }

    fn annotate(&self, posts: Vec<Post>) -> Result<Vec<PostView>, RepositoryError> {
        if posts.is_empty() {
            return Ok(Vec::new());
        }
        let names = self.category_names()?;
        Ok(posts
            .into_iter()
            .map(|post| {
                let category_name = resolve_category_name(&names, post.category_id.as_deref());
                PostView { post, category_name }
            })
            .collect())
    }
}

fn post_record(mut draft: NewPost) -> Result<Record, RepositoryError> {
    if draft.slug.trim().is_empty() {
        draft.slug = slug_helpers::slugify(&draft.title);
    }
    to_record(Collection::Posts, &PostInsert { fields: &draft, created_at: Utc::now() })
}

/// Falls back to "Uncategorized" for missing and dangling references.
pub fn resolve_category_name(names: &HashMap<String, String>, category_id: Option<&str>) -> String {
    category_id
        .and_then(|id| names.get(id))
        .cloned()
        .unwrap_or_else(|| UNCATEGORIZED.to_string())
}

pub(crate) fn to_record<T: Serialize>(collection: Collection, value: &T) -> Result<Record, RepositoryError> {
    match serde_json::to_value(value).map_err(GatewayError::from)? {
        Value::Object(map) => Ok(map),
        _ => Err(RepositoryError::Malformed {
            collection: collection.name(),
            message: "record did not serialize to an object".to_string(),
        }),
    }
}

pub(crate) fn from_record<T: DeserializeOwned>(collection: Collection, record: Record) -> Result<T, RepositoryError> {
    serde_json::from_value(Value::Object(record)).map_err(|e| RepositoryError::Malformed {
        collection: collection.name(),
        message: e.to_string(),
    })
}
