use crate::helper::variant_helpers;
use crate::models::db_operations::posts_db_operations::{ContentRepository, RepositoryError};
use crate::models::{Language, PostView};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const RELATED_POSTS_LIMIT: usize = 2;
pub const SUGGESTED_POSTS_LIMIT: usize = 3;

/// Fragment index after which the post's own ad markup is placed.
const AD_MARKUP_AFTER_FRAGMENT: usize = 1;

/// List entry for a post, without its bodies.
#[derive(Debug, Clone, Serialize)]
pub struct PostCard {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub featured_image_url: Option<String>,
    pub category_name: String,
    pub published_at: Option<DateTime<Utc>>,
}

impl From<&PostView> for PostCard {
    fn from(view: &PostView) -> Self {
        PostCard {
            id: view.post.id.clone(),
            slug: view.post.slug.clone(),
            title: view.post.title.clone(),
            excerpt: view.post.excerpt.clone(),
            featured_image_url: view.post.featured_image_url.clone(),
            category_name: view.category_name.clone(),
            published_at: view.post.published_at,
        }
    }
}

/// Everything a post page needs, with the body already split for ad slots.
#[derive(Debug, Serialize)]
pub struct ArticleView {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub featured_image_url: Option<String>,
    pub category_name: String,
    pub published_at: Option<DateTime<Utc>>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub language: Language,
    pub secondary_available: bool,
    pub fragments: Vec<String>,
    pub ad_markup: Option<String>,
    pub ad_markup_after: Option<usize>,
    pub related: Vec<PostCard>,
    pub suggested: Vec<PostCard>,
}

pub fn fetch_published_cards(
    repository: &ContentRepository,
    limit: Option<usize>,
    offset: usize,
) -> Result<Vec<PostCard>, RepositoryError> {
    Ok(repository
        .list_published()?
        .iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .map(PostCard::from)
        .collect())
}

/// `None` when no published post has `slug`.
pub fn build_article_view(
    repository: &ContentRepository,
    slug: &str,
    preference: Language,
) -> Result<Option<ArticleView>, RepositoryError> {
    let Some(view) = repository.get_published_by_slug(slug)? else {
        return Ok(None);
    };
    let others = repository.list_published()?;
    let related = related_posts(&view, &others);
    let suggested = suggested_posts(&view, &others);

    let fragments: Vec<String> = variant_helpers::split_into_fragments(variant_helpers::select_variant(&view.post, preference))
        .into_iter()
        .map(str::to_string)
        .collect();
    let ad_markup = view.post.ad_markup.clone().filter(|markup| !markup.trim().is_empty());
    let ad_markup_after = match &ad_markup {
        Some(_) if fragments.len() > AD_MARKUP_AFTER_FRAGMENT => Some(AD_MARKUP_AFTER_FRAGMENT),
        _ => None,
    };

    Ok(Some(ArticleView {
        language: variant_helpers::effective_language(&view.post, preference),
        secondary_available: variant_helpers::has_secondary_variant(&view.post),
        fragments,
        ad_markup,
        ad_markup_after,
        related,
        suggested,
        id: view.post.id,
        slug: view.post.slug,
        title: view.post.title,
        excerpt: view.post.excerpt,
        featured_image_url: view.post.featured_image_url,
        category_name: view.category_name,
        published_at: view.post.published_at,
        meta_title: view.post.meta_title,
        meta_description: view.post.meta_description,
        meta_keywords: view.post.meta_keywords,
    }))
}

/// Other posts in the same category, in listing order.
pub fn related_posts(current: &PostView, published: &[PostView]) -> Vec<PostCard> {
    published
        .iter()
        .filter(|other| other.post.id != current.post.id && other.post.category_id == current.post.category_id)
        .take(RELATED_POSTS_LIMIT)
        .map(PostCard::from)
        .collect()
}

pub fn suggested_posts(current: &PostView, published: &[PostView]) -> Vec<PostCard> {
    published
        .iter()
        .filter(|other| other.post.id != current.post.id)
        .take(SUGGESTED_POSTS_LIMIT)
        .map(PostCard::from)
        .collect()
}

/// Case-insensitive substring match on title, excerpt and category name.
pub fn search_published(repository: &ContentRepository, query: &str) -> Result<Vec<PostCard>, RepositoryError> {
    let needle = query.trim().to_lowercase();
    Ok(repository
        .list_published()?
        .iter()
        .filter(|view| matches_query(view, &needle))
        .map(PostCard::from)
        .collect())
}

fn matches_query(view: &PostView, needle: &str) -> bool {
    view.post.title.to_lowercase().contains(needle)
        || view.post.excerpt.as_deref().is_some_and(|e| e.to_lowercase().contains(needle))
        || view.category_name.to_lowercase().contains(needle)
}
