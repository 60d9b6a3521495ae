//! Row types for every table, plus the input shapes used to create and patch them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{require, to_row, Entity};
use crate::error::{DataError, Result};
use crate::store::{Order, Row};

// ============================================================================
// Leads
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub business_description: Option<String>,
    #[serde(default)]
    pub requirements: Option<String>,
    pub status: LeadStatus,
    pub created_at: DateTime<Utc>,
}

/// Contact form submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewLead {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub business_description: Option<String>,
    #[serde(default)]
    pub requirements: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadStatusUpdate {
    pub status: LeadStatus,
}

impl Entity for Lead {
    const TABLE: &'static str = "leads";
    const LABEL: &'static str = "Lead";
    type New = NewLead;
    type Patch = LeadStatusUpdate;

    fn prepare_new(new: NewLead) -> Result<Row> {
        let name = require("name", &new.name)?;
        let email = require("email", &new.email)?;
        if !email.contains('@') {
            return Err(DataError::validation("Invalid email format"));
        }
        to_row(&json!({
            "name": name,
            "email": email,
            "phone": non_blank(new.phone),
            "business_description": non_blank(new.business_description),
            "requirements": non_blank(new.requirements),
            "status": LeadStatus::New,
        }))
    }

    fn prepare_patch(patch: LeadStatusUpdate) -> Result<Row> {
        to_row(&patch)
    }
}

// ============================================================================
// Feedback
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackStatus {
    #[default]
    Unread,
    Read,
}

impl FeedbackStatus {
    pub fn flipped(self) -> Self {
        match self {
            FeedbackStatus::Unread => FeedbackStatus::Read,
            FeedbackStatus::Read => FeedbackStatus::Unread,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    pub message: String,
    pub status: FeedbackStatus,
    pub approved: bool,
    #[serde(default)]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Public face of approved feedback. Contact and moderation fields stay private.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Testimonial {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    pub message: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Testimonial {
    pub const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "company",
        "role",
        "subject",
        "message",
        "image_url",
        "created_at",
    ];
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewFeedback {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<FeedbackStatus>,
    #[serde(default)]
    pub approved: Option<bool>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FeedbackStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Entity for Feedback {
    const TABLE: &'static str = "feedbacks";
    const LABEL: &'static str = "Feedback";
    type New = NewFeedback;
    type Patch = FeedbackPatch;

    fn prepare_new(new: NewFeedback) -> Result<Row> {
        let name = require("name", &new.name)?;
        let message = require("message", &new.message)?;
        to_row(&json!({
            "name": name,
            "email": non_blank(new.email),
            "company": non_blank(new.company),
            "role": non_blank(new.role),
            "subject": non_blank(new.subject),
            "message": message,
            "status": new.status.unwrap_or_default(),
            "approved": new.approved.unwrap_or(false),
            "image_url": non_blank(new.image_url),
        }))
    }

    fn prepare_patch(patch: FeedbackPatch) -> Result<Row> {
        if let Some(name) = &patch.name {
            require("name", name)?;
        }
        if let Some(message) = &patch.message {
            require("message", message)?;
        }
        to_row(&patch)
    }
}

// ============================================================================
// Services
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewService {
    #[serde(default)]
    pub name: String,
}

impl Entity for Service {
    const TABLE: &'static str = "services";
    const LABEL: &'static str = "Service";
    type New = NewService;
    type Patch = NewService;

    /// Alphabetical, for the category dropdown.
    fn default_order() -> Order {
        Order::ascending("name")
    }

    fn prepare_new(new: NewService) -> Result<Row> {
        let name = require("name", &new.name)?;
        to_row(&json!({ "name": name }))
    }

    fn prepare_patch(patch: NewService) -> Result<Row> {
        Self::prepare_new(patch)
    }
}

// ============================================================================
// Featured work
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturedWork {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub subject: Option<String>,
    /// Service name captured by value; not kept in sync with `services`.
    pub category: String,
    pub image_url: String,
    #[serde(default)]
    pub blog_post_url: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewFeaturedWork {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub blog_post_url: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeaturedWorkPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blog_post_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Entity for FeaturedWork {
    const TABLE: &'static str = "featured_work";
    const LABEL: &'static str = "Featured work";
    type New = NewFeaturedWork;
    type Patch = FeaturedWorkPatch;

    fn prepare_new(new: NewFeaturedWork) -> Result<Row> {
        let title = require("title", &new.title)?;
        let category = require("category", &new.category)?;
        let image_url = require("image_url", &new.image_url)?;
        to_row(&json!({
            "title": title,
            "subject": non_blank(new.subject),
            "category": category,
            "image_url": image_url,
            "blog_post_url": non_blank(new.blog_post_url),
            "color": non_blank(new.color),
        }))
    }

    fn prepare_patch(patch: FeaturedWorkPatch) -> Result<Row> {
        for (field, value) in [
            ("title", &patch.title),
            ("category", &patch.category),
            ("image_url", &patch.image_url),
        ] {
            if let Some(value) = value {
                require(field, value)?;
            }
        }
        to_row(&patch)
    }
}

// ============================================================================
// Blog posts
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: String,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub views: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewBlogPost {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub published: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlogPostPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
}

fn checked_slug(slug: &str) -> Result<String> {
    let slug = slug.trim();
    if !super::slug::is_valid_slug(slug) {
        return Err(DataError::validation(
            "Invalid slug format. Use lowercase letters, numbers, and hyphens only.",
        ));
    }
    Ok(slug.to_string())
}

impl Entity for BlogPost {
    const TABLE: &'static str = "blog_posts";
    const LABEL: &'static str = "Blog post";
    const UNIQUE: &'static [&'static str] = &["slug"];
    type New = NewBlogPost;
    type Patch = BlogPostPatch;

    fn prepare_new(new: NewBlogPost) -> Result<Row> {
        let title = require("title", &new.title)?;
        let content = require("content", &new.content)?;
        let slug = match new.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => checked_slug(slug)?,
            _ => {
                let derived = super::slug::derive_slug(&title);
                if derived.is_empty() {
                    return Err(DataError::validation(
                        "Title must contain letters or numbers to derive a slug",
                    ));
                }
                derived
            }
        };
        let now = Utc::now();
        to_row(&json!({
            "title": title,
            "slug": slug,
            "excerpt": non_blank(new.excerpt),
            "content": ammonia::clean(&content),
            "cover_image": non_blank(new.cover_image),
            "published": new.published,
            "views": 0,
            "updated_at": now,
        }))
    }

    /// Slugs are only ever replaced by an explicit new slug, never re-derived.
    fn prepare_patch(patch: BlogPostPatch) -> Result<Row> {
        let mut row = Row::new();
        if let Some(title) = &patch.title {
            row.insert("title".into(), Value::String(require("title", title)?));
        }
        if let Some(slug) = &patch.slug {
            row.insert("slug".into(), Value::String(checked_slug(slug)?));
        }
        if let Some(excerpt) = patch.excerpt {
            row.insert("excerpt".into(), json!(non_blank(Some(excerpt))));
        }
        if let Some(content) = &patch.content {
            let content = require("content", content)?;
            row.insert("content".into(), Value::String(ammonia::clean(&content)));
        }
        if let Some(cover_image) = patch.cover_image {
            row.insert("cover_image".into(), json!(non_blank(Some(cover_image))));
        }
        if let Some(published) = patch.published {
            row.insert("published".into(), Value::Bool(published));
        }
        if !row.is_empty() {
            row.insert("updated_at".into(), json!(Utc::now()));
        }
        Ok(row)
    }
}

// ============================================================================
// Site settings
// ============================================================================

pub const AVAILABILITY_KEY: &str = "project_availability";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSetting {
    pub id: String,
    pub key: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSiteSetting {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityValue {
    pub is_available: bool,
}

impl Entity for SiteSetting {
    const TABLE: &'static str = "site_settings";
    const LABEL: &'static str = "Setting";
    const UNIQUE: &'static [&'static str] = &["key"];
    type New = NewSiteSetting;
    type Patch = NewSiteSetting;

    fn prepare_new(new: NewSiteSetting) -> Result<Row> {
        let key = require("key", &new.key)?;
        to_row(&json!({ "key": key, "value": new.value }))
    }

    fn prepare_patch(patch: NewSiteSetting) -> Result<Row> {
        Self::prepare_new(patch)
    }
}

// ============================================================================
// Profiles
// ============================================================================

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProfile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub role: String,
}

impl Entity for Profile {
    const TABLE: &'static str = "profiles";
    const LABEL: &'static str = "Profile";
    type New = NewProfile;
    type Patch = ProfilePatch;

    fn prepare_new(new: NewProfile) -> Result<Row> {
        let id = require("id", &new.id)?;
        let role = require("role", &new.role)?;
        to_row(&json!({ "id": id, "role": role }))
    }

    fn prepare_patch(patch: ProfilePatch) -> Result<Row> {
        let role = require("role", &patch.role)?;
        to_row(&json!({ "role": role }))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
