// End-to-end flows through the repository layer against a real database file.

use std::sync::Arc;

use tempfile::TempDir;

use photoshare::db;
use photoshare::db::models::PhotoOrder;
use photoshare::error::AppError;
use photoshare::photos::{NewPhoto, PhotoRepository, SqlitePhotoRepository};
use photoshare::state::DbPool;
use photoshare::storage::PhotoCleaner;
use photoshare::users::{NewUser, SqliteUserRepository, UserRepository};
use photoshare::votes::{VoteCoordinator, VoteDirection};

struct NoopCleaner;

impl PhotoCleaner for NoopCleaner {
    fn clean(&self, _filename: &str) {}
}

fn setup() -> (TempDir, DbPool) {
    let tmp = TempDir::new().unwrap();
    let pool = db::create_pool(&tmp.path().join("test.db")).unwrap();
    db::run_migrations(&pool).unwrap();
    (tmp, pool)
}

fn signup(name: &str) -> NewUser {
    NewUser {
        name: name.to_string(),
        email: format!("{}@example.com", name),
        password: "hunter22".to_string(),
    }
}

#[tokio::test]
async fn full_photo_lifecycle() {
    let (_tmp, pool) = setup();
    let users = SqliteUserRepository::new(pool.clone());
    let photos = SqlitePhotoRepository::new(pool.clone(), Arc::new(NoopCleaner));

    let alice = users.insert(signup("alice")).await.unwrap();
    let bob = users.insert(signup("bob")).await.unwrap();

    // Alice uploads a tagged photo
    let photo = photos
        .insert(NewPhoto {
            owner_id: alice.id,
            title: "Sunset at the bay".to_string(),
            filename: "abc123.jpg".to_string(),
            tags: vec!["Sunset".to_string(), "beach".to_string()],
        })
        .await
        .unwrap();

    // Everyone can find it, with intersection semantics
    let found = photos.search(1, "#sunset @alice").await.unwrap().unwrap();
    assert_eq!(found.total, 1);
    let none = photos.search(1, "#sunset @bob").await.unwrap().unwrap();
    assert_eq!(none.total, 0);

    // Bob sees vote permission, Alice does not
    let detail = photos
        .get_detail(photo.id, Some(&bob))
        .await
        .unwrap()
        .unwrap();
    assert!(detail.perms.vote);
    assert!(!detail.perms.edit);
    let detail = photos
        .get_detail(photo.id, Some(&alice))
        .await
        .unwrap()
        .unwrap();
    assert!(!detail.perms.vote);
    assert!(detail.perms.edit);

    // Retagging replaces the set
    photos
        .update_tags(photo.id, &["dusk".to_string()])
        .await
        .unwrap();
    let detail = photos.get_detail(photo.id, None).await.unwrap().unwrap();
    assert_eq!(detail.tags, vec!["dusk".to_string()]);

    // Listings include it until the delete
    let all = photos.all(1, PhotoOrder::Newest).await.unwrap();
    assert_eq!(all.total, 1);

    photos.delete(&photo).await.unwrap();
    assert!(photos.get(photo.id).await.unwrap().is_none());
    let all = photos.all(1, PhotoOrder::Newest).await.unwrap();
    assert_eq!(all.total, 0);
}

#[tokio::test]
async fn vote_registration_is_once_per_user_per_photo() {
    let (_tmp, pool) = setup();
    let users = SqliteUserRepository::new(pool.clone());
    let photos = SqlitePhotoRepository::new(pool.clone(), Arc::new(NoopCleaner));
    let votes = VoteCoordinator::new(pool.clone());

    let alice = users.insert(signup("alice")).await.unwrap();
    let bob = users.insert(signup("bob")).await.unwrap();

    let photo = photos
        .insert(NewPhoto {
            owner_id: alice.id,
            title: "city lights".to_string(),
            filename: "lights.jpg".to_string(),
            tags: vec![],
        })
        .await
        .unwrap();

    // Bob's first vote lands
    votes
        .register_vote(photo.id, Some(&bob), VoteDirection::Up)
        .await
        .unwrap();
    let after = photos.get(photo.id).await.unwrap().unwrap();
    assert_eq!(after.up_votes, 1);
    assert!(users.has_voted(bob.id, photo.id).await.unwrap());

    // The second is rejected and changes nothing
    let second = votes
        .register_vote(photo.id, Some(&bob), VoteDirection::Up)
        .await;
    assert!(matches!(second, Err(AppError::Conflict(_))));
    let after = photos.get(photo.id).await.unwrap().unwrap();
    assert_eq!(after.up_votes, 1);
    assert_eq!(after.down_votes, 0);

    // Having voted also flips the detail permission off
    let detail = photos
        .get_detail(photo.id, Some(&bob))
        .await
        .unwrap()
        .unwrap();
    assert!(!detail.perms.vote);
}
