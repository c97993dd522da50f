use serde::{Deserialize, Serialize};

use crate::domain::{AlbumWithPhotos, BookMeInfo, Photo, UserId};

/// Account record returned by `GET /api/me`. Extra server fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeUser {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub picture: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub user: MeUser,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumListResponse {
    pub list: Vec<AlbumWithPhotos>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoListResponse {
    pub list: Vec<Photo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPhotoResponse {
    pub photo_url: String,
    pub s3_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPhotoRequest {
    pub index_in_album: i32,
    pub s3_id: String,
    pub src: String,
    pub main_color: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePhotoRequest {
    pub index_in_album: i32,
    pub is_favorite: bool,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoResponse {
    pub photo: Photo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookMeResponse {
    pub info: BookMeInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateBookMeRequest {
    pub email: String,
}
