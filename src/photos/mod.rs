pub mod repository;
pub mod search;
pub mod tags;

pub use repository::{NewPhoto, PhotoRepository, SqlitePhotoRepository};
