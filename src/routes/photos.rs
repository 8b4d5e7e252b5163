use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::models::{Photo, PhotoDetail, PhotoList, PhotoOrder, TagCount, User};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::photos::NewPhoto;
use crate::state::AppState;
use crate::storage::is_allowed_content_type;
use crate::validation::validate_photo_title;
use crate::votes::VoteDirection;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/photos", get(list).post(upload))
        .route("/photos/search", get(search))
        .route("/photos/owner/{owner_id}", get(by_owner))
        .route("/photos/{id}", get(detail).delete(delete_photo))
        .route("/photos/{id}/title", put(edit_title))
        .route("/photos/{id}/tags", put(edit_tags))
        .route("/photos/{id}/upvote", post(vote_up))
        .route("/photos/{id}/downvote", post(vote_down))
        .route("/tags", get(tag_counts))
}

fn default_page() -> i64 {
    1
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default, rename = "orderBy")]
    order_by: String,
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default)]
    q: String,
}

async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<PhotoList>> {
    let order = PhotoOrder::from_param(&params.order_by);
    Ok(Json(state.photos.all(params.page, order).await?))
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<PhotoList>> {
    match state.photos.search(params.page, &params.q).await? {
        Some(photos) => Ok(Json(photos)),
        // Blank query: no search was performed; keep the payload shape.
        None => Ok(Json(PhotoList::new(Vec::new(), 0, params.page))),
    }
}

async fn by_owner(
    State(state): State<AppState>,
    Path(owner_id): Path<i64>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<PhotoList>> {
    Ok(Json(state.photos.by_owner(params.page, owner_id).await?))
}

async fn detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    maybe_user: MaybeUser,
) -> AppResult<Json<PhotoDetail>> {
    let detail = state
        .photos
        .get_detail(id, maybe_user.0.as_ref())
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(detail))
}

async fn upload(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Json<Photo>> {
    let mut title = String::new();
    let mut taglist = String::new();
    let mut image: Option<Vec<u8>> = None;
    let mut content_type = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        match field.name() {
            Some("title") => {
                title = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
            }
            Some("taglist") => {
                taglist = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
            }
            Some("photo") => {
                content_type = field.content_type().unwrap_or_default().to_string();
                image = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(e.to_string()))?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }

    let Some(image) = image else {
        return Err(AppError::BadRequest("No image was posted".to_string()));
    };
    if !is_allowed_content_type(&content_type) {
        return Err(AppError::BadRequest("No image was posted".to_string()));
    }
    validate_photo_title(&title)?;

    let filename = state.uploads.save(&image, &content_type).await?;

    let photo = state
        .photos
        .insert(NewPhoto {
            owner_id: user.id,
            title: title.trim().to_string(),
            filename,
            tags: taglist.split_whitespace().map(String::from).collect(),
        })
        .await?;

    Ok(Json(photo))
}

/// Fetch a photo and check the viewer may modify it.
async fn photo_for_edit(state: &AppState, id: i64, user: &User) -> AppResult<Photo> {
    let photo = state.photos.get(id).await?.ok_or(AppError::NotFound)?;
    if !photo.can_edit(Some(user)) {
        return Err(AppError::Forbidden);
    }
    Ok(photo)
}

#[derive(Deserialize)]
struct TitleForm {
    title: String,
}

async fn edit_title(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    CurrentUser(user): CurrentUser,
    Json(form): Json<TitleForm>,
) -> AppResult<StatusCode> {
    let mut photo = photo_for_edit(&state, id, &user).await?;
    validate_photo_title(&form.title)?;
    photo.title = form.title.trim().to_string();
    state.photos.update(&photo).await?;
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
struct TagsForm {
    tags: Vec<String>,
}

async fn edit_tags(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    CurrentUser(user): CurrentUser,
    Json(form): Json<TagsForm>,
) -> AppResult<StatusCode> {
    let photo = photo_for_edit(&state, id, &user).await?;
    state.photos.update_tags(photo.id, &form.tags).await?;
    Ok(StatusCode::OK)
}

async fn delete_photo(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    CurrentUser(user): CurrentUser,
) -> AppResult<StatusCode> {
    let photo = state.photos.get(id).await?.ok_or(AppError::NotFound)?;
    if !photo.can_delete(Some(&user)) {
        return Err(AppError::Forbidden);
    }
    state.photos.delete(&photo).await?;
    Ok(StatusCode::OK)
}

async fn vote_up(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    CurrentUser(user): CurrentUser,
) -> AppResult<StatusCode> {
    state
        .votes
        .register_vote(id, Some(&user), VoteDirection::Up)
        .await?;
    Ok(StatusCode::OK)
}

async fn vote_down(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    CurrentUser(user): CurrentUser,
) -> AppResult<StatusCode> {
    state
        .votes
        .register_vote(id, Some(&user), VoteDirection::Down)
        .await?;
    Ok(StatusCode::OK)
}

async fn tag_counts(State(state): State<AppState>) -> AppResult<Json<Vec<TagCount>>> {
    Ok(Json(state.photos.tag_counts().await?))
}
