use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn nil() -> Self {
                Self(Uuid::nil())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::nil()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(AlbumId);
id_newtype!(PhotoId);
id_newtype!(BookMeId);

/// The signed-in account, as projected from the "who am I" endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: AlbumId,
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: PhotoId,
    pub album_id: AlbumId,
    pub user_id: UserId,
    pub index_in_album: i32,
    #[serde(default)]
    pub s3_id: Option<String>,
    pub src: String,
    pub main_color: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub width: i32,
    pub height: i32,
    pub is_favorite: bool,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
}

/// An album together with its ordered photo sequence.
///
/// On the wire this is a two element array `[album, photos]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(Album, Vec<Photo>)", into = "(Album, Vec<Photo>)")]
pub struct AlbumWithPhotos {
    pub album: Album,
    pub photos: Vec<Photo>,
}

impl AlbumWithPhotos {
    pub fn new(album: Album, photos: Vec<Photo>) -> Self {
        Self { album, photos }
    }

    pub fn id(&self) -> AlbumId {
        self.album.id
    }
}

impl From<(Album, Vec<Photo>)> for AlbumWithPhotos {
    fn from((album, photos): (Album, Vec<Photo>)) -> Self {
        Self { album, photos }
    }
}

impl From<AlbumWithPhotos> for (Album, Vec<Photo>) {
    fn from(value: AlbumWithPhotos) -> Self {
        (value.album, value.photos)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookMeInfo {
    pub id: BookMeId,
    pub user_id: UserId,
    pub email: String,
}

impl BookMeInfo {
    /// Local-only record used before the server has returned one.
    pub fn draft(email: impl Into<String>) -> Self {
        Self {
            id: BookMeId::nil(),
            user_id: UserId::nil(),
            email: email.into(),
        }
    }
}
