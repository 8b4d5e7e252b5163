use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::photos::repository::DynPhotoRepository;
use crate::storage::UploadStore;
use crate::users::repository::DynUserRepository;
use crate::votes::VoteCoordinator;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub photos: DynPhotoRepository,
    pub users: DynUserRepository,
    pub votes: Arc<VoteCoordinator>,
    pub uploads: Arc<UploadStore>,
}
