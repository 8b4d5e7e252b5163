// Repository pattern - isolates all database side effects
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};

use crate::db::models::{
    page_offset, Photo, PhotoDetail, PhotoList, PhotoOrder, TagCount, User, Permissions, PAGE_SIZE,
};
use crate::error::{AppError, AppResult};
use crate::photos::search::{compile, parse_query};
use crate::photos::tags::normalize_tags;
use crate::state::DbPool;
use crate::storage::PhotoCleaner;

const PHOTO_COLUMNS: &str = "id, owner_id, created_at, title, filename, up_votes, down_votes";

/// Input for a new photo row. Tags are raw user input and get normalized
/// during the insert.
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub owner_id: i64,
    pub title: String,
    pub filename: String,
    pub tags: Vec<String>,
}

#[async_trait]
pub trait PhotoRepository: Send + Sync {
    /// Insert the photo row and sync its tag set in one transaction.
    async fn insert(&self, new: NewPhoto) -> AppResult<Photo>;

    /// Update the photo row only (tags go through `update_tags`).
    async fn update(&self, photo: &Photo) -> AppResult<()>;

    /// Make the persisted tag associations exactly equal the desired set.
    async fn update_tags(&self, photo_id: i64, tags: &[String]) -> AppResult<()>;

    /// Delete the row and schedule best-effort removal of the stored file.
    async fn delete(&self, photo: &Photo) -> AppResult<()>;

    async fn get(&self, photo_id: i64) -> AppResult<Option<Photo>>;

    /// Photo plus owner name, tag names and viewer-relative permissions.
    async fn get_detail(&self, photo_id: i64, viewer: Option<&User>)
        -> AppResult<Option<PhotoDetail>>;

    async fn all(&self, page: i64, order: PhotoOrder) -> AppResult<PhotoList>;

    async fn by_owner(&self, page: i64, owner_id: i64) -> AppResult<PhotoList>;

    /// None means the query was blank and no search was performed.
    async fn search(&self, page: i64, query: &str) -> AppResult<Option<PhotoList>>;

    async fn tag_counts(&self) -> AppResult<Vec<TagCount>>;
}

pub struct SqlitePhotoRepository {
    pool: DbPool,
    cleaner: Arc<dyn PhotoCleaner>,
}

impl SqlitePhotoRepository {
    pub fn new(pool: DbPool, cleaner: Arc<dyn PhotoCleaner>) -> Self {
        Self { pool, cleaner }
    }
}

fn photo_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Photo> {
    Ok(Photo {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        created_at: row.get(2)?,
        title: row.get(3)?,
        filename: row.get(4)?,
        up_votes: row.get(5)?,
        down_votes: row.get(6)?,
    })
}

/// Reconcile a photo's associations with an already-normalized name set.
/// Must run inside a transaction so readers never see a partial set.
fn sync_tags(conn: &Connection, photo_id: i64, names: &[String]) -> rusqlite::Result<()> {
    if names.is_empty() {
        conn.execute("DELETE FROM photo_tags WHERE photo_id = ?1", params![photo_id])?;
        return Ok(());
    }

    for name in names {
        // Lazy tag creation; the unique name constraint makes concurrent
        // creation of the same tag converge instead of erroring.
        conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", params![name])?;
        conn.execute(
            "INSERT OR IGNORE INTO photo_tags (photo_id, tag_id)
             SELECT ?1, id FROM tags WHERE name = ?2",
            params![photo_id, name],
        )?;
    }

    // Drop associations that fell out of the desired set.
    let placeholders: Vec<String> = (2..names.len() + 2).map(|n| format!("?{}", n)).collect();
    let sql = format!(
        "DELETE FROM photo_tags WHERE photo_id = ?1 \
         AND tag_id NOT IN (SELECT id FROM tags WHERE name IN ({}))",
        placeholders.join(",")
    );
    let mut values = vec![Value::Integer(photo_id)];
    values.extend(names.iter().map(|n| Value::Text(n.clone())));
    conn.execute(&sql, params_from_iter(values))?;

    Ok(())
}

fn photo_tag_names(conn: &Connection, photo_id: i64) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT t.name FROM tags t \
         JOIN photo_tags pt ON pt.tag_id = t.id \
         WHERE pt.photo_id = ?1 ORDER BY t.name",
    )?;
    let names = stmt
        .query_map(params![photo_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}

#[async_trait]
impl PhotoRepository for SqlitePhotoRepository {
    async fn insert(&self, new: NewPhoto) -> AppResult<Photo> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let created_at = Utc::now();
        tx.execute(
            "INSERT INTO photos (owner_id, created_at, title, filename) VALUES (?1, ?2, ?3, ?4)",
            params![new.owner_id, created_at, new.title, new.filename],
        )?;
        let photo_id = tx.last_insert_rowid();

        let names = normalize_tags(&new.tags);
        sync_tags(&tx, photo_id, &names)?;

        tx.commit()?;

        Ok(Photo {
            id: photo_id,
            owner_id: new.owner_id,
            created_at,
            title: new.title,
            filename: new.filename,
            up_votes: 0,
            down_votes: 0,
        })
    }

    async fn update(&self, photo: &Photo) -> AppResult<()> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE photos SET title = ?1, filename = ?2 WHERE id = ?3",
            params![photo.title, photo.filename, photo.id],
        )?;
        if rows == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn update_tags(&self, photo_id: i64, tags: &[String]) -> AppResult<()> {
        let mut conn = self.pool.get()?;
        // IMMEDIATE takes the write lock up front, serializing concurrent
        // edits of the same photo's tag set.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM photos WHERE id = ?1",
            params![photo_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(AppError::NotFound);
        }

        let names = normalize_tags(tags);
        sync_tags(&tx, photo_id, &names)?;
        tx.commit()?;
        Ok(())
    }

    async fn delete(&self, photo: &Photo) -> AppResult<()> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM photos WHERE id = ?1", params![photo.id])?;
        if rows == 0 {
            return Err(AppError::NotFound);
        }
        // File removal is fire-and-forget; its outcome is not ours to report.
        self.cleaner.clean(&photo.filename);
        Ok(())
    }

    async fn get(&self, photo_id: i64) -> AppResult<Option<Photo>> {
        let conn = self.pool.get()?;
        let photo = conn
            .query_row(
                &format!("SELECT {} FROM photos WHERE id = ?1", PHOTO_COLUMNS),
                params![photo_id],
                photo_from_row,
            )
            .optional()?;
        Ok(photo)
    }

    async fn get_detail(
        &self,
        photo_id: i64,
        viewer: Option<&User>,
    ) -> AppResult<Option<PhotoDetail>> {
        let conn = self.pool.get()?;

        let row = conn
            .query_row(
                "SELECT p.id, p.owner_id, p.created_at, p.title, p.filename, \
                        p.up_votes, p.down_votes, u.name \
                 FROM photos p JOIN users u ON u.id = p.owner_id \
                 WHERE p.id = ?1",
                params![photo_id],
                |row| {
                    let photo = photo_from_row(row)?;
                    let owner_name: String = row.get(7)?;
                    Ok((photo, owner_name))
                },
            )
            .optional()?;

        let Some((photo, owner_name)) = row else {
            return Ok(None);
        };

        let tags = photo_tag_names(&conn, photo.id)?;

        let has_voted = match viewer {
            Some(user) => conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM votes WHERE user_id = ?1 AND photo_id = ?2)",
                params![user.id, photo.id],
                |row| row.get(0),
            )?,
            None => false,
        };

        let perms = Permissions::compute(&photo, viewer, has_voted);
        Ok(Some(PhotoDetail {
            photo,
            owner_name,
            tags,
            perms,
        }))
    }

    async fn all(&self, page: i64, order: PhotoOrder) -> AppResult<PhotoList> {
        let conn = self.pool.get()?;
        let total: i64 = conn.query_row("SELECT COUNT(id) FROM photos", [], |row| row.get(0))?;

        let sql = format!(
            "SELECT {} FROM photos ORDER BY {} DESC LIMIT ?1 OFFSET ?2",
            PHOTO_COLUMNS,
            order.sql()
        );
        let mut stmt = conn.prepare(&sql)?;
        let photos = stmt
            .query_map(params![PAGE_SIZE, page_offset(page)], photo_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PhotoList::new(photos, total, page))
    }

    async fn by_owner(&self, page: i64, owner_id: i64) -> AppResult<PhotoList> {
        let conn = self.pool.get()?;
        let total: i64 = conn.query_row(
            "SELECT COUNT(id) FROM photos WHERE owner_id = ?1",
            params![owner_id],
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {} FROM photos WHERE owner_id = ?1 \
             ORDER BY (up_votes - down_votes) DESC, created_at DESC \
             LIMIT ?2 OFFSET ?3",
            PHOTO_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let photos = stmt
            .query_map(params![owner_id, PAGE_SIZE, page_offset(page)], photo_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PhotoList::new(photos, total, page))
    }

    async fn search(&self, page: i64, query: &str) -> AppResult<Option<PhotoList>> {
        let predicates = parse_query(query);
        if predicates.is_empty() {
            // Blank query: no search performed, distinct from zero results.
            return Ok(None);
        }
        let compiled = compile(&predicates);

        let conn = self.pool.get()?;
        let total: i64 = conn.query_row(
            &compiled.count_sql(),
            params_from_iter(compiled.params()),
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&compiled.page_sql())?;
        let photos = stmt
            .query_map(
                params_from_iter(compiled.params_with_page(PAGE_SIZE, page_offset(page))),
                photo_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(PhotoList::new(photos, total, page)))
    }

    async fn tag_counts(&self) -> AppResult<Vec<TagCount>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT t.name, MIN(p.filename), COUNT(p.id) \
             FROM tags t \
             JOIN photo_tags pt ON pt.tag_id = t.id \
             JOIN photos p ON p.id = pt.photo_id \
             GROUP BY t.id, t.name \
             ORDER BY COUNT(p.id) DESC, t.name",
        )?;
        let counts = stmt
            .query_map([], |row| {
                Ok(TagCount {
                    name: row.get(0)?,
                    photo: row.get(1)?,
                    num_photos: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }
}

/// Type alias for Arc-wrapped repository (for AppState)
pub type DynPhotoRepository = Arc<dyn PhotoRepository>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use std::sync::Mutex;

    /// Records cleaned filenames instead of touching the filesystem.
    struct RecordingCleaner {
        cleaned: Mutex<Vec<String>>,
    }

    impl RecordingCleaner {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                cleaned: Mutex::new(Vec::new()),
            })
        }
    }

    impl PhotoCleaner for RecordingCleaner {
        fn clean(&self, filename: &str) {
            self.cleaned.lock().unwrap().push(filename.to_string());
        }
    }

    fn test_repo() -> (SqlitePhotoRepository, Arc<RecordingCleaner>, DbPool) {
        let pool = db::test_pool();
        let cleaner = RecordingCleaner::new();
        let repo = SqlitePhotoRepository::new(pool.clone(), cleaner.clone());
        (repo, cleaner, pool)
    }

    fn seed_user(pool: &DbPool, name: &str) -> i64 {
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO users (created_at, name, email, password_hash) \
             VALUES (?1, ?2, ?3, 'x')",
            params![Utc::now(), name, format!("{}@example.com", name)],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn get_user(pool: &DbPool, id: i64) -> User {
        let conn = pool.get().unwrap();
        conn.query_row(
            "SELECT id, created_at, name, email, password_hash, is_admin, is_active, recovery_code \
             FROM users WHERE id = ?1",
            params![id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                    name: row.get(2)?,
                    email: row.get(3)?,
                    password_hash: row.get(4)?,
                    is_admin: row.get(5)?,
                    is_active: row.get(6)?,
                    recovery_code: row.get(7)?,
                })
            },
        )
        .unwrap()
    }

    fn new_photo(owner_id: i64, title: &str, tags: &[&str]) -> NewPhoto {
        NewPhoto {
            owner_id,
            title: title.to_string(),
            filename: format!("{}.jpg", title.replace(' ', "-")),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn insert_creates_photo_with_tags() {
        let (repo, _, pool) = test_repo();
        let alice = seed_user(&pool, "alice");

        let photo = repo
            .insert(new_photo(alice, "sunset", &["Beach", " sunset ", "beach"]))
            .await
            .unwrap();
        assert!(photo.id > 0);
        assert_eq!(photo.up_votes, 0);

        let detail = repo.get_detail(photo.id, None).await.unwrap().unwrap();
        assert_eq!(detail.owner_name, "alice");
        assert_eq!(detail.tags, vec!["beach".to_string(), "sunset".to_string()]);
    }

    #[tokio::test]
    async fn update_tags_makes_set_exactly_equal() {
        let (repo, _, pool) = test_repo();
        let alice = seed_user(&pool, "alice");
        let photo = repo
            .insert(new_photo(alice, "sunset", &["beach", "sunset"]))
            .await
            .unwrap();

        repo.update_tags(photo.id, &["sunset".to_string(), "dusk".to_string()])
            .await
            .unwrap();

        let detail = repo.get_detail(photo.id, None).await.unwrap().unwrap();
        assert_eq!(detail.tags, vec!["dusk".to_string(), "sunset".to_string()]);
    }

    #[tokio::test]
    async fn update_tags_with_empty_set_removes_all_associations() {
        let (repo, _, pool) = test_repo();
        let alice = seed_user(&pool, "alice");
        let photo = repo
            .insert(new_photo(alice, "sunset", &["beach", "sunset"]))
            .await
            .unwrap();

        repo.update_tags(photo.id, &[]).await.unwrap();

        let detail = repo.get_detail(photo.id, None).await.unwrap().unwrap();
        assert!(detail.tags.is_empty());

        // Orphaned tag rows are left behind on purpose.
        let conn = pool.get().unwrap();
        let tag_rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(tag_rows, 2);
    }

    #[tokio::test]
    async fn update_tags_on_missing_photo_is_not_found() {
        let (repo, _, _pool) = test_repo();
        let result = repo.update_tags(999, &["cats".to_string()]).await;
        assert!(matches!(result, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn get_missing_photo_returns_none() {
        let (repo, _, _pool) = test_repo();
        assert!(repo.get(12345).await.unwrap().is_none());
        assert!(repo.get_detail(12345, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_row_and_schedules_file_cleanup() {
        let (repo, cleaner, pool) = test_repo();
        let alice = seed_user(&pool, "alice");
        let photo = repo
            .insert(new_photo(alice, "sunset", &["beach"]))
            .await
            .unwrap();

        repo.delete(&photo).await.unwrap();

        assert!(repo.get(photo.id).await.unwrap().is_none());
        assert_eq!(*cleaner.cleaned.lock().unwrap(), vec!["sunset.jpg".to_string()]);

        // Associations cascade away with the row
        let conn = pool.get().unwrap();
        let assoc: i64 = conn
            .query_row("SELECT COUNT(*) FROM photo_tags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(assoc, 0);
    }

    #[tokio::test]
    async fn delete_missing_photo_is_not_found_and_cleans_nothing() {
        let (repo, cleaner, pool) = test_repo();
        let alice = seed_user(&pool, "alice");
        let mut photo = repo
            .insert(new_photo(alice, "sunset", &[]))
            .await
            .unwrap();
        photo.id += 100;

        let result = repo.delete(&photo).await;
        assert!(matches!(result, Err(AppError::NotFound)));
        assert!(cleaner.cleaned.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_intersects_tag_and_owner_predicates() {
        let (repo, _, pool) = test_repo();
        let alice = seed_user(&pool, "alice");
        let bob = seed_user(&pool, "bob");

        repo.insert(new_photo(alice, "alice cat", &["cats"])).await.unwrap();
        repo.insert(new_photo(bob, "bob cat", &["cats"])).await.unwrap();
        repo.insert(new_photo(alice, "alice dog", &["dogs"])).await.unwrap();

        let list = repo.search(1, "#cats @alice").await.unwrap().unwrap();
        assert_eq!(list.total, 1);
        assert_eq!(list.photos[0].title, "alice cat");

        // Case-insensitive on both predicate kinds
        let list = repo.search(1, "#CATS @Alice").await.unwrap().unwrap();
        assert_eq!(list.total, 1);
    }

    #[tokio::test]
    async fn search_fuzzy_matches_title_owner_and_tags() {
        let (repo, _, pool) = test_repo();
        let alice = seed_user(&pool, "alice");
        let bob = seed_user(&pool, "bob");

        repo.insert(new_photo(alice, "Sunset at the bay", &[])).await.unwrap();
        repo.insert(new_photo(bob, "morning", &["sunsets"])).await.unwrap();
        repo.insert(new_photo(bob, "unrelated", &[])).await.unwrap();

        let list = repo.search(1, "SUNSET").await.unwrap().unwrap();
        assert_eq!(list.total, 2);

        // Owner-name substring also matches
        let list = repo.search(1, "lice").await.unwrap().unwrap();
        assert_eq!(list.total, 1);
    }

    #[tokio::test]
    async fn blank_search_is_distinct_from_zero_results() {
        let (repo, _, _pool) = test_repo();
        assert!(repo.search(1, "").await.unwrap().is_none());
        assert!(repo.search(1, "   ").await.unwrap().is_none());

        let list = repo.search(1, "nothing-matches").await.unwrap().unwrap();
        assert_eq!(list.total, 0);
        assert_eq!(list.num_pages, 0);
        assert!(list.photos.is_empty());
    }

    #[tokio::test]
    async fn listings_paginate_at_twelve() {
        let (repo, _, pool) = test_repo();
        let alice = seed_user(&pool, "alice");
        for i in 0..13 {
            repo.insert(new_photo(alice, &format!("photo {}", i), &[]))
                .await
                .unwrap();
        }

        let page1 = repo.all(1, PhotoOrder::Newest).await.unwrap();
        assert_eq!(page1.total, 13);
        assert_eq!(page1.photos.len(), 12);
        assert_eq!(page1.num_pages, 2);
        assert_eq!(page1.current_page, 1);

        let page2 = repo.all(2, PhotoOrder::Newest).await.unwrap();
        assert_eq!(page2.photos.len(), 1);

        // Non-positive page clamps to the first page
        let clamped = repo.all(0, PhotoOrder::Newest).await.unwrap();
        assert_eq!(clamped.photos.len(), 12);
    }

    #[tokio::test]
    async fn all_orders_by_votes_when_requested() {
        let (repo, _, pool) = test_repo();
        let alice = seed_user(&pool, "alice");
        let low = repo.insert(new_photo(alice, "low", &[])).await.unwrap();
        let high = repo.insert(new_photo(alice, "high", &[])).await.unwrap();

        let conn = pool.get().unwrap();
        conn.execute("UPDATE photos SET up_votes = 5 WHERE id = ?1", params![high.id])
            .unwrap();
        conn.execute("UPDATE photos SET down_votes = 2 WHERE id = ?1", params![low.id])
            .unwrap();
        drop(conn);

        let by_votes = repo.all(1, PhotoOrder::Votes).await.unwrap();
        assert_eq!(by_votes.photos[0].title, "high");
        assert_eq!(by_votes.photos[1].title, "low");
    }

    #[tokio::test]
    async fn by_owner_filters_to_that_owner() {
        let (repo, _, pool) = test_repo();
        let alice = seed_user(&pool, "alice");
        let bob = seed_user(&pool, "bob");
        repo.insert(new_photo(alice, "a1", &[])).await.unwrap();
        repo.insert(new_photo(alice, "a2", &[])).await.unwrap();
        repo.insert(new_photo(bob, "b1", &[])).await.unwrap();

        let list = repo.by_owner(1, alice).await.unwrap();
        assert_eq!(list.total, 2);
        assert!(list.photos.iter().all(|p| p.owner_id == alice));
    }

    #[tokio::test]
    async fn tag_counts_aggregate_usage() {
        let (repo, _, pool) = test_repo();
        let alice = seed_user(&pool, "alice");
        repo.insert(new_photo(alice, "one", &["cats", "dogs"])).await.unwrap();
        repo.insert(new_photo(alice, "two", &["cats"])).await.unwrap();

        let counts = repo.tag_counts().await.unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].name, "cats");
        assert_eq!(counts[0].num_photos, 2);
        assert!(!counts[0].photo.is_empty());
        assert_eq!(counts[1].name, "dogs");
        assert_eq!(counts[1].num_photos, 1);
    }

    #[tokio::test]
    async fn get_detail_computes_viewer_permissions() {
        let (repo, _, pool) = test_repo();
        let alice = seed_user(&pool, "alice");
        let bob = seed_user(&pool, "bob");
        let photo = repo.insert(new_photo(alice, "sunset", &[])).await.unwrap();

        let alice_user = get_user(&pool, alice);
        let detail = repo
            .get_detail(photo.id, Some(&alice_user))
            .await
            .unwrap()
            .unwrap();
        assert!(detail.perms.edit);
        assert!(detail.perms.delete);
        assert!(!detail.perms.vote);

        let bob_user = get_user(&pool, bob);
        let detail = repo
            .get_detail(photo.id, Some(&bob_user))
            .await
            .unwrap()
            .unwrap();
        assert!(!detail.perms.edit);
        assert!(detail.perms.vote);

        let detail = repo.get_detail(photo.id, None).await.unwrap().unwrap();
        assert!(!detail.perms.edit);
        assert!(!detail.perms.vote);
    }

    #[tokio::test]
    async fn update_changes_title_only() {
        let (repo, _, pool) = test_repo();
        let alice = seed_user(&pool, "alice");
        let mut photo = repo
            .insert(new_photo(alice, "before", &["cats"]))
            .await
            .unwrap();

        photo.title = "after".to_string();
        repo.update(&photo).await.unwrap();

        let detail = repo.get_detail(photo.id, None).await.unwrap().unwrap();
        assert_eq!(detail.photo.title, "after");
        // Tag set untouched by a row update
        assert_eq!(detail.tags, vec!["cats".to_string()]);
    }
}
