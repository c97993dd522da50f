//! Closed set of signals understood by the reducers and the orchestrator.

use std::{fmt, sync::Arc};

use shared::{
    domain::{AlbumId, AlbumWithPhotos, AuthenticatedUser, BookMeInfo, Photo, PhotoId},
    error::ApiError,
};

use crate::slice::RequestId;

/// The request / success / failure / cancel quadruple of one asynchronous operation.
#[derive(Debug, Clone)]
pub enum AsyncSignal<Req, Res, Err = ApiError> {
    Request { id: RequestId, input: Req },
    Success { id: RequestId, output: Res },
    Failure { id: RequestId, error: Err },
    Cancel { id: RequestId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalPhase {
    Request(RequestId),
    Settled(RequestId),
    Cancel(RequestId),
}

impl<Req, Res, Err> AsyncSignal<Req, Res, Err> {
    pub fn id(&self) -> RequestId {
        match self {
            Self::Request { id, .. }
            | Self::Success { id, .. }
            | Self::Failure { id, .. }
            | Self::Cancel { id } => *id,
        }
    }

    pub fn phase(&self) -> SignalPhase {
        match self {
            Self::Request { id, .. } => SignalPhase::Request(*id),
            Self::Success { id, .. } | Self::Failure { id, .. } => SignalPhase::Settled(*id),
            Self::Cancel { id } => SignalPhase::Cancel(*id),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    Auth(AuthAction),
    Albums(AlbumsAction),
    BookMe(BookMeAction),
}

#[derive(Debug, Clone)]
pub enum AuthAction {
    SetToken(String),
    /// Input is the bearer token handed back by the identity provider.
    Authenticate(AsyncSignal<String, AuthenticatedUser>),
    CheckCredentials,
    Logout,
}

#[derive(Debug, Clone)]
pub enum AlbumsAction {
    FetchAll(AsyncSignal<(), Vec<AlbumWithPhotos>>),
    Open(AsyncSignal<AlbumId, AlbumWithPhotos>),
    FetchPhotos(AsyncSignal<AlbumId, AlbumPhotos>),
    AddPhoto(AsyncSignal<NewPhoto, Photo>),
    UpdatePhoto(AsyncSignal<PhotoUpdate, Photo>),
    DeletePhoto(AsyncSignal<PhotoId, PhotoId>),
    MarkRebuildNeeded,
    BuildApplication,
}

#[derive(Debug, Clone)]
pub enum BookMeAction {
    FetchInfo(AsyncSignal<(), BookMeInfo>),
    UpdateInfo(AsyncSignal<String, BookMeInfo, UpdateInfoFailure>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumPhotos {
    pub album_id: AlbumId,
    pub photos: Vec<Photo>,
}

#[derive(Clone)]
pub struct PhotoFile {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Arc<[u8]>,
}

impl PhotoFile {
    pub fn new(file_name: impl Into<String>, mime_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type,
            bytes: bytes.into(),
        }
    }
}

impl fmt::Debug for PhotoFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhotoFile")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub file: PhotoFile,
    pub main_color: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUpdate {
    pub id: PhotoId,
    pub is_favorite: bool,
    pub title: Option<String>,
    pub description: Option<String>,
    pub index_in_album: i32,
}

impl PhotoUpdate {
    pub fn from_photo(photo: &Photo) -> Self {
        Self {
            id: photo.id,
            is_favorite: photo.is_favorite,
            title: photo.title.clone(),
            description: photo.description.clone(),
            index_in_album: photo.index_in_album,
        }
    }
}

/// Book-me update failure; carries the submitted email so it is not lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfoFailure {
    pub error: ApiError,
    pub email: String,
}

impl Action {
    pub fn phase(&self) -> Option<SignalPhase> {
        match self {
            Self::Auth(AuthAction::Authenticate(signal)) => Some(signal.phase()),
            Self::Auth(_) => None,
            Self::Albums(action) => match action {
                AlbumsAction::FetchAll(signal) => Some(signal.phase()),
                AlbumsAction::Open(signal) => Some(signal.phase()),
                AlbumsAction::FetchPhotos(signal) => Some(signal.phase()),
                AlbumsAction::AddPhoto(signal) => Some(signal.phase()),
                AlbumsAction::UpdatePhoto(signal) => Some(signal.phase()),
                AlbumsAction::DeletePhoto(signal) => Some(signal.phase()),
                AlbumsAction::MarkRebuildNeeded | AlbumsAction::BuildApplication => None,
            },
            Self::BookMe(BookMeAction::FetchInfo(signal)) => Some(signal.phase()),
            Self::BookMe(BookMeAction::UpdateInfo(signal)) => Some(signal.phase()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Auth(AuthAction::SetToken(_)) => "auth/set_token",
            Self::Auth(AuthAction::Authenticate(_)) => "auth/authenticate",
            Self::Auth(AuthAction::CheckCredentials) => "auth/check_credentials",
            Self::Auth(AuthAction::Logout) => "auth/logout",
            Self::Albums(AlbumsAction::FetchAll(_)) => "albums/fetch",
            Self::Albums(AlbumsAction::Open(_)) => "albums/open",
            Self::Albums(AlbumsAction::FetchPhotos(_)) => "albums/fetch_photos",
            Self::Albums(AlbumsAction::AddPhoto(_)) => "albums/add_photo",
            Self::Albums(AlbumsAction::UpdatePhoto(_)) => "albums/update_photo",
            Self::Albums(AlbumsAction::DeletePhoto(_)) => "albums/delete_photo",
            Self::Albums(AlbumsAction::MarkRebuildNeeded) => "albums/mark_rebuild_needed",
            Self::Albums(AlbumsAction::BuildApplication) => "albums/build_application",
            Self::BookMe(BookMeAction::FetchInfo(_)) => "book_me/fetch",
            Self::BookMe(BookMeAction::UpdateInfo(_)) => "book_me/update",
        }
    }
}

impl From<AuthAction> for Action {
    fn from(value: AuthAction) -> Self {
        Self::Auth(value)
    }
}

impl From<AlbumsAction> for Action {
    fn from(value: AlbumsAction) -> Self {
        Self::Albums(value)
    }
}

impl From<BookMeAction> for Action {
    fn from(value: BookMeAction) -> Self {
        Self::BookMe(value)
    }
}
