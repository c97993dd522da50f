//! Entity slices and their reducers.
//!
//! Reducers are synchronous and only touch the slice they own. Fetch-style
//! signals are fenced by [`RequestId`](crate::slice::RequestId); photo mutations are deltas and are
//! applied whenever they arrive.

use serde::{Deserialize, Serialize};
use shared::domain::{AlbumId, AlbumWithPhotos, AuthenticatedUser, BookMeInfo, Photo, PhotoId};
use tracing::warn;

use crate::{
    actions::{Action, AlbumPhotos, AlbumsAction, AsyncSignal, AuthAction, BookMeAction},
    slice::{AsyncSlice, DataPolicy},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub auth: AuthState,
    pub albums: AlbumsState,
    pub book_me: BookMeState,
}

impl AppState {
    pub fn reduce(&mut self, action: &Action) {
        match action {
            Action::Auth(action) => self.auth.reduce(action),
            Action::Albums(action) => self.albums.reduce(action),
            Action::BookMe(action) => self.book_me.reduce(action),
        }
    }
}

/// Persisted across restarts under the `auth` key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthState {
    pub token: Option<String>,
    pub user: AsyncSlice<AuthenticatedUser>,
}

impl AuthState {
    pub fn restored(self) -> Self {
        Self {
            token: self.token,
            user: self.user.restored(),
        }
    }

    fn reduce(&mut self, action: &AuthAction) {
        match action {
            AuthAction::SetToken(token) => self.token = Some(token.clone()),
            AuthAction::Authenticate(signal) => match signal {
                AsyncSignal::Request { id, .. } => self.user.begin(*id, DataPolicy::Clear),
                AsyncSignal::Success { id, output } => {
                    self.user.resolve(*id, output.clone());
                }
                AsyncSignal::Failure { id, error } => {
                    self.user.reject(*id, error.clone(), DataPolicy::Clear);
                }
                AsyncSignal::Cancel { id } => {
                    self.user.cancel(*id);
                }
            },
            AuthAction::CheckCredentials => {}
            AuthAction::Logout => *self = Self::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoChange {
    Added(PhotoId),
    Updated(PhotoId),
    Deleted(PhotoId),
}

/// The single album currently being worked on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenedAlbumState {
    pub album: AsyncSlice<AlbumWithPhotos>,
    pub changes: AsyncSlice<PhotoChange>,
    /// Set when a photo mutation succeeds; cleared when a rebuild is triggered.
    pub needs_rebuild: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlbumsState {
    pub list: AsyncSlice<Vec<AlbumWithPhotos>>,
    pub opened: OpenedAlbumState,
}

impl AlbumsState {
    fn reduce(&mut self, action: &AlbumsAction) {
        match action {
            AlbumsAction::FetchAll(signal) => match signal {
                AsyncSignal::Request { id, .. } => self.list.begin(*id, DataPolicy::Clear),
                AsyncSignal::Success { id, output } => {
                    self.list.resolve(*id, output.clone());
                }
                AsyncSignal::Failure { id, error } => {
                    self.list.reject(*id, error.clone(), DataPolicy::Clear);
                }
                AsyncSignal::Cancel { id } => {
                    self.list.cancel(*id);
                }
            },
            AlbumsAction::Open(signal) => {
                let album = &mut self.opened.album;
                match signal {
                    AsyncSignal::Request { id, .. } => album.begin(*id, DataPolicy::Clear),
                    AsyncSignal::Success { id, output } => {
                        album.resolve(*id, output.clone());
                    }
                    AsyncSignal::Failure { id, error } => {
                        album.reject(*id, error.clone(), DataPolicy::Clear);
                    }
                    AsyncSignal::Cancel { id } => {
                        album.cancel(*id);
                    }
                }
            }
            AlbumsAction::FetchPhotos(signal) => self.reduce_fetch_photos(signal),
            AlbumsAction::AddPhoto(signal) => match signal {
                AsyncSignal::Request { .. } => self.opened.changes.start(),
                AsyncSignal::Success { output, .. } => {
                    match self.opened.album.data.as_mut() {
                        Some(current) if current.id() == output.album_id => {
                            current.photos.push(output.clone());
                        }
                        _ => warn!(
                            photo_id = %output.id,
                            album_id = %output.album_id,
                            "albums: added photo does not belong to the opened album"
                        ),
                    }
                    self.photo_changed(PhotoChange::Added(output.id));
                }
                AsyncSignal::Failure { error, .. } => self.opened.changes.fail(error.clone()),
                AsyncSignal::Cancel { .. } => self.opened.changes = AsyncSlice::idle(),
            },
            AlbumsAction::UpdatePhoto(signal) => match signal {
                AsyncSignal::Request { .. } => self.opened.changes.start(),
                AsyncSignal::Success { output, .. } => {
                    if let Some(slot) = self.opened_photo_mut(output.id) {
                        *slot = output.clone();
                    }
                    self.photo_changed(PhotoChange::Updated(output.id));
                }
                AsyncSignal::Failure { error, .. } => self.opened.changes.fail(error.clone()),
                AsyncSignal::Cancel { .. } => self.opened.changes = AsyncSlice::idle(),
            },
            AlbumsAction::DeletePhoto(signal) => match signal {
                AsyncSignal::Request { .. } => self.opened.changes.start(),
                AsyncSignal::Success { output, .. } => {
                    if let Some(current) = self.opened.album.data.as_mut() {
                        if let Some(index) = current.photos.iter().position(|p| p.id == *output) {
                            current.photos.remove(index);
                        }
                    }
                    self.photo_changed(PhotoChange::Deleted(*output));
                }
                AsyncSignal::Failure { error, .. } => self.opened.changes.fail(error.clone()),
                AsyncSignal::Cancel { .. } => self.opened.changes = AsyncSlice::idle(),
            },
            AlbumsAction::MarkRebuildNeeded => self.opened.needs_rebuild = true,
            AlbumsAction::BuildApplication => self.opened.needs_rebuild = false,
        }
    }

    fn reduce_fetch_photos(&mut self, signal: &AsyncSignal<AlbumId, AlbumPhotos>) {
        let album = &mut self.opened.album;
        match signal {
            AsyncSignal::Request { id, input } => {
                let opened_id = album.data.as_ref().map(AlbumWithPhotos::id);
                if opened_id != Some(*input) {
                    warn!(
                        album_id = %input,
                        "albums: photo fetch requested for an album that is not opened"
                    );
                }
                album.begin(*id, DataPolicy::Retain);
            }
            AsyncSignal::Success { id, output } => {
                let Some(current) = album.data.as_ref() else {
                    warn!(
                        album_id = %output.album_id,
                        "albums: dropping photo listing, no album is opened"
                    );
                    album.release(*id);
                    return;
                };
                if current.id() != output.album_id {
                    warn!(
                        album_id = %output.album_id,
                        opened_album_id = %current.id(),
                        "albums: dropping photo listing for an album that is no longer opened"
                    );
                    album.release(*id);
                    return;
                }
                if album.is_current(*id) {
                    let next = AlbumWithPhotos::new(current.album.clone(), output.photos.clone());
                    album.resolve(*id, next);
                }
            }
            AsyncSignal::Failure { id, error } => {
                album.reject(*id, error.clone(), DataPolicy::Retain);
            }
            AsyncSignal::Cancel { id } => {
                album.cancel(*id);
            }
        }
    }

    fn opened_photo_mut(&mut self, id: PhotoId) -> Option<&mut Photo> {
        self.opened
            .album
            .data
            .as_mut()?
            .photos
            .iter_mut()
            .find(|photo| photo.id == id)
    }

    fn photo_changed(&mut self, change: PhotoChange) {
        self.opened.changes.succeed(change);
        self.opened.needs_rebuild = true;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookMeState {
    pub info: AsyncSlice<BookMeInfo>,
}

impl BookMeState {
    fn reduce(&mut self, action: &BookMeAction) {
        match action {
            BookMeAction::FetchInfo(signal) => match signal {
                AsyncSignal::Request { id, .. } => self.info.begin(*id, DataPolicy::Clear),
                AsyncSignal::Success { id, output } => {
                    self.info.resolve(*id, output.clone());
                }
                AsyncSignal::Failure { id, error } => {
                    self.info.reject(*id, error.clone(), DataPolicy::Clear);
                }
                AsyncSignal::Cancel { id } => {
                    self.info.cancel(*id);
                }
            },
            // The submitted email is shown right away and kept on failure.
            BookMeAction::UpdateInfo(signal) => match signal {
                AsyncSignal::Request { id, input } => {
                    self.info.begin(*id, DataPolicy::Retain);
                    self.write_email(input);
                }
                AsyncSignal::Success { id, output } => {
                    self.info.resolve(*id, output.clone());
                }
                AsyncSignal::Failure { id, error } => {
                    if self.info.reject(*id, error.error.clone(), DataPolicy::Retain) {
                        self.write_email(&error.email);
                    }
                }
                AsyncSignal::Cancel { id } => {
                    self.info.cancel(*id);
                }
            },
        }
    }

    fn write_email(&mut self, email: &str) {
        match self.info.data.as_mut() {
            Some(info) => info.email = email.to_string(),
            None => self.info.data = Some(BookMeInfo::draft(email)),
        }
    }
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
