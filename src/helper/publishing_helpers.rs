use crate::helper::identity_helpers::{AuthorizationError, IdentityResolver};
use crate::helper::media_helpers::{self, ImageUpload, ObjectStorage, StorageError, FEATURED_IMAGES_BUCKET};
use crate::helper::{sanitization_helpers, slug_helpers};
use crate::models::db_operations::posts_db_operations::{ContentRepository, RepositoryError};
use crate::models::validation::{self, ValidationError};
use crate::models::{Category, NewPost, Post, PostChanges, PostForm, PostStatus, Session};
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] AuthorizationError),
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Repository(#[from] RepositoryError),
    #[error("{0}")]
    Storage(#[from] StorageError),
    #[error("Deleting '{0}' requires explicit confirmation.")]
    ConfirmationRequired(String),
    #[error("No {kind} with id '{id}'.")]
    NotFound { kind: &'static str, id: String },
}

/// The "are you sure?" answer for a delete. It must name the record being
/// deleted.
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteConfirmation {
    pub confirm: String,
}

impl DeleteConfirmation {
    pub fn for_target(id: &str) -> Self {
        DeleteConfirmation { confirm: id.to_string() }
    }

    pub fn confirms(&self, id: &str) -> bool {
        self.confirm == id
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
    })
}

fn rich_or_none(value: Option<String>) -> Option<String> {
    blank_to_none(value).and_then(|html| {
        let cleaned = sanitization_helpers::sanitize_rich_text(&html);
        if cleaned.trim().is_empty() { None } else { Some(cleaned) }
    })
}

/// An edit buffer after normalisation and validation, ready to be written.
#[derive(Debug)]
struct PreparedPost {
    id: Option<String>,
    slug: String,
    title: String,
    excerpt: Option<String>,
    primary_content: Option<String>,
    secondary_content: Option<String>,
    featured_image_url: Option<String>,
    category_id: Option<String>,
    meta_title: Option<String>,
    meta_description: Option<String>,
    meta_keywords: Option<String>,
    ad_markup: Option<String>,
}

impl PreparedPost {
    fn from_form(form: PostForm) -> Result<Self, ValidationError> {
        let title = form.title.trim().to_string();
        validation::validate_title(&title)?;
        validation::validate_plain_text("Title", Some(&title))?;

        let meta_title = blank_to_none(form.meta_title);
        validation::validate_meta_title(meta_title.as_deref())?;
        validation::validate_plain_text("Meta title", meta_title.as_deref())?;
        let meta_description = blank_to_none(form.meta_description);
        validation::validate_meta_description(meta_description.as_deref())?;
        validation::validate_plain_text("Meta description", meta_description.as_deref())?;

        let slug = validation::resolve_slug(&form.slug, &title)?;

        let excerpt = blank_to_none(form.excerpt);
        validation::validate_plain_text("Excerpt", excerpt.as_deref())?;
        let meta_keywords = blank_to_none(form.meta_keywords);
        validation::validate_plain_text("Meta keywords", meta_keywords.as_deref())?;

        Ok(PreparedPost {
            id: blank_to_none(form.id),
            slug,
            title,
            excerpt,
            primary_content: rich_or_none(form.primary_content),
            secondary_content: rich_or_none(form.secondary_content),
            featured_image_url: blank_to_none(form.featured_image_url),
            category_id: blank_to_none(form.category_id),
            meta_title,
            meta_description,
            meta_keywords,
            // Stored verbatim: ad snippets carry their own scripts.
            ad_markup: form.ad_markup.filter(|markup| !markup.trim().is_empty()),
        })
    }
}

/// The only caller of the repository's mutating operations. Every call
/// re-runs role resolution first and fails with `Unauthorized` before any
/// other work when the session is not an admin.
pub struct PublishingWorkflow<'a> {
    identity: &'a IdentityResolver,
    repository: &'a ContentRepository,
}

impl<'a> PublishingWorkflow<'a> {
    pub fn new(identity: &'a IdentityResolver, repository: &'a ContentRepository) -> Self {
        PublishingWorkflow { identity, repository }
    }

    fn authorize(&self) -> Result<Session, WorkflowError> {
        self.identity.authorize_editor().map_err(|e| {
            log::warn!("Editor action refused: {}", e);
            WorkflowError::Unauthorized(e)
        })
    }

    /// Saves the buffer with `status = draft`. A new post gets no
    /// `published_at`; an existing one keeps whatever it had.
    pub fn save_draft(&self, form: PostForm) -> Result<Post, WorkflowError> {
        self.save(form, PostStatus::Draft)
    }

    /// Saves the buffer with `status = published` and stamps `published_at`
    /// with the current time, also when re-publishing.
    pub fn publish(&self, form: PostForm) -> Result<Post, WorkflowError> {
        self.save(form, PostStatus::Published)
    }

    fn save(&self, form: PostForm, status: PostStatus) -> Result<Post, WorkflowError> {
        let session = self.authorize()?;
        let prepared = PreparedPost::from_form(form)?;

        let published_at = (status == PostStatus::Published).then(Utc::now);
        let post = match prepared.id {
            None => self
                .repository
                .create_claiming_slug(NewPost {
                    slug: prepared.slug,
                    title: prepared.title,
                    excerpt: prepared.excerpt,
                    primary_content: prepared.primary_content,
                    secondary_content: prepared.secondary_content,
                    featured_image_url: prepared.featured_image_url,
                    category_id: prepared.category_id,
                    status,
                    published_at,
                    meta_title: prepared.meta_title,
                    meta_description: prepared.meta_description,
                    meta_keywords: prepared.meta_keywords,
                    ad_markup: prepared.ad_markup,
                })
                .map_err(slug_conflict)?,
            Some(id) => {
                let changes = PostChanges {
                    slug: Some(prepared.slug),
                    title: Some(prepared.title),
                    excerpt: Some(prepared.excerpt),
                    primary_content: Some(prepared.primary_content),
                    secondary_content: Some(prepared.secondary_content),
                    featured_image_url: Some(prepared.featured_image_url),
                    category_id: Some(prepared.category_id),
                    status: Some(status),
                    published_at: published_at.map(Some),
                    meta_title: Some(prepared.meta_title),
                    meta_description: Some(prepared.meta_description),
                    meta_keywords: Some(prepared.meta_keywords),
                    ad_markup: Some(prepared.ad_markup),
                };
                self.repository
                    .update_claiming_slug(&id, &changes)
                    .map_err(slug_conflict)?
                    .ok_or(WorkflowError::NotFound { kind: "post", id })?
            }
        };

        log::info!("{} saved post '{}' as {}", session.user.email, post.slug, post.status);
        Ok(post)
    }

    /// Every post in any status, newest first.
    pub fn list_all(&self) -> Result<Vec<Post>, WorkflowError> {
        self.authorize()?;
        Ok(self.repository.list_all()?)
    }

    /// Loads a post of any status into the edit buffer.
    pub fn load_post(&self, id: &str) -> Result<Post, WorkflowError> {
        self.authorize()?;
        self.repository
            .get_by_id(id)?
            .ok_or_else(|| WorkflowError::NotFound { kind: "post", id: id.to_string() })
    }

    pub fn delete_post(&self, id: &str, confirmation: Option<&DeleteConfirmation>) -> Result<(), WorkflowError> {
        let session = self.authorize()?;
        require_confirmation(id, confirmation)?;
        self.repository.delete(id)?;
        log::info!("{} deleted post {}", session.user.email, id);
        Ok(())
    }

    pub fn list_categories(&self) -> Result<Vec<Category>, WorkflowError> {
        self.authorize()?;
        Ok(self.repository.list_categories()?)
    }

    pub fn create_category(&self, name: &str) -> Result<Category, WorkflowError> {
        let session = self.authorize()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyCategoryName.into());
        }
        validation::validate_plain_text("Category name", Some(name))?;
        let slug = slug_helpers::slugify(name);
        if !slug_helpers::is_valid_slug(&slug) {
            return Err(ValidationError::MalformedSlug(slug).into());
        }

        let category = self.repository.create_category(name, &slug).map_err(slug_conflict)?;
        log::info!("{} created category '{}'", session.user.email, category.slug);
        Ok(category)
    }

    /// Posts in the category are kept and read back as "Uncategorized".
    pub fn delete_category(&self, id: &str, confirmation: Option<&DeleteConfirmation>) -> Result<(), WorkflowError> {
        let session = self.authorize()?;
        require_confirmation(id, confirmation)?;
        self.repository.delete_category(id)?;
        log::info!("{} deleted category {}", session.user.email, id);
        Ok(())
    }

    /// Stores an image in the featured-images bucket and returns its public URL.
    pub fn upload_featured_image(&self, storage: &dyn ObjectStorage, upload: ImageUpload) -> Result<String, WorkflowError> {
        self.authorize()?;
        let name = media_helpers::generated_object_name(upload.extension()?);
        Ok(storage.upload(FEATURED_IMAGES_BUCKET, &name, &upload.bytes)?)
    }
}

fn slug_conflict(e: RepositoryError) -> WorkflowError {
    match e {
        RepositoryError::SlugTaken(slug) => ValidationError::DuplicateSlug(slug).into(),
        other => other.into(),
    }
}

fn require_confirmation(id: &str, confirmation: Option<&DeleteConfirmation>) -> Result<(), WorkflowError> {
    match confirmation {
        Some(c) if c.confirms(id) => Ok(()),
        _ => Err(WorkflowError::ConfirmationRequired(id.to_string())),
    }
}
