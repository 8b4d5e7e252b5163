use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed page size for every paginated listing.
pub const PAGE_SIZE: i64 = 12;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub is_active: bool,
    #[serde(skip_serializing)]
    pub recovery_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: i64,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
    pub title: String,
    #[serde(rename = "photo")]
    pub filename: String,
    pub up_votes: i64,
    pub down_votes: i64,
}

impl Photo {
    pub fn can_edit(&self, viewer: Option<&User>) -> bool {
        match viewer {
            Some(user) => user.is_admin || self.owner_id == user.id,
            None => false,
        }
    }

    pub fn can_delete(&self, viewer: Option<&User>) -> bool {
        self.can_edit(viewer)
    }

    /// `has_voted` is the viewer's vote-set membership for this photo,
    /// looked up by the caller (indexed existence check on the votes table).
    pub fn can_vote(&self, viewer: Option<&User>, has_voted: bool) -> bool {
        match viewer {
            Some(user) => self.owner_id != user.id && !has_voted,
            None => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// Reporting view: one row per tag with an example photo filename.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagCount {
    pub name: String,
    pub photo: String,
    pub num_photos: i64,
}

/// Viewer-relative permissions. Derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub edit: bool,
    pub delete: bool,
    pub vote: bool,
}

impl Permissions {
    pub fn compute(photo: &Photo, viewer: Option<&User>, has_voted: bool) -> Self {
        Self {
            edit: photo.can_edit(viewer),
            delete: photo.can_delete(viewer),
            vote: photo.can_vote(viewer, has_voted),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoDetail {
    #[serde(flatten)]
    pub photo: Photo,
    pub owner_name: String,
    pub tags: Vec<String>,
    pub perms: Permissions,
}

/// Paginated listing envelope shared by all list operations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoList {
    pub photos: Vec<Photo>,
    pub total: i64,
    pub current_page: i64,
    pub num_pages: i64,
}

impl PhotoList {
    pub fn new(photos: Vec<Photo>, total: i64, page: i64) -> Self {
        Self {
            photos,
            total,
            current_page: page,
            num_pages: num_pages(total),
        }
    }
}

/// `ceil(total / PAGE_SIZE)`; zero items means zero pages.
pub fn num_pages(total: i64) -> i64 {
    (total + PAGE_SIZE - 1) / PAGE_SIZE
}

/// Row offset for a 1-based page number. Clamps non-positive pages to the
/// first page and saturates on huge ones; the page number comes straight
/// from the query string.
pub fn page_offset(page: i64) -> i64 {
    page.max(1).saturating_sub(1).saturating_mul(PAGE_SIZE)
}

/// Ordering for the all-photos listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhotoOrder {
    #[default]
    Newest,
    Votes,
}

impl PhotoOrder {
    pub fn from_param(param: &str) -> Self {
        if param == "votes" {
            PhotoOrder::Votes
        } else {
            PhotoOrder::Newest
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            PhotoOrder::Newest => "created_at",
            PhotoOrder::Votes => "(up_votes - down_votes)",
        }
    }
}
