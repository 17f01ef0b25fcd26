use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Label used whenever a post has no category or points at a deleted one.
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored article. `secondary_content` is the alternate-language body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub primary_content: Option<String>,
    pub secondary_content: Option<String>,
    pub featured_image_url: Option<String>,
    pub category_id: Option<String>,
    #[serde(default)]
    pub status: PostStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub ad_markup: Option<String>,
}

/// A post joined with the display name of its category.
#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub category_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub slug: String,
}

/// Fields for a post that does not exist yet. `id` and `created_at` are
/// assigned by the store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewPost {
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub primary_content: Option<String>,
    pub secondary_content: Option<String>,
    pub featured_image_url: Option<String>,
    pub category_id: Option<String>,
    pub status: PostStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub ad_markup: Option<String>,
}

/// Partial update. `None` leaves a field untouched; `Some(None)` clears a
/// nullable field.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PostChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_content: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_content: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured_image_url: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PostStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_title: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_keywords: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad_markup: Option<Option<String>>,
}

/// The authoring surface's edit buffer, submitted whole on save or publish.
/// A missing `id` means the post is new. The submitted `status` is ignored:
/// the action chosen decides it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostForm {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub primary_content: Option<String>,
    #[serde(default)]
    pub secondary_content: Option<String>,
    #[serde(default)]
    pub featured_image_url: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub status: Option<PostStatus>,
    #[serde(default)]
    pub meta_title: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub meta_keywords: Option<String>,
    #[serde(default)]
    pub ad_markup: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
}

/// One authenticated browser context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    #[serde(skip_serializing)]
    pub token: String,
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
        }
    }
}

/// A `(user_id, role)` relation row from the `user_roles` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub id: String,
    pub user_id: String,
    pub role: Role,
}

/// Which body variant a reader asked for.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Primary,
    Secondary,
}

pub mod db_operations;
pub mod validation;
