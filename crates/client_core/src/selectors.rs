//! Read-only projections over [`AppState`] for the presentation layer.

use shared::domain::{AlbumId, AlbumWithPhotos, AuthenticatedUser, BookMeInfo, Photo};

use crate::{slice::AsyncSlice, state::AppState};

/// Two-way gate for protected views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access<'a> {
    Authenticated(&'a AuthenticatedUser),
    Unauthenticated,
}

pub fn select_token(state: &AppState) -> Option<&str> {
    state.auth.token.as_deref()
}

pub fn select_authenticated_user(state: &AppState) -> Option<&AuthenticatedUser> {
    state.auth.user.data.as_ref()
}

pub fn select_access(state: &AppState) -> Access<'_> {
    match select_authenticated_user(state) {
        Some(user) => Access::Authenticated(user),
        None => Access::Unauthenticated,
    }
}

pub fn select_albums(state: &AppState) -> &[AlbumWithPhotos] {
    state.albums.list.data.as_deref().unwrap_or_default()
}

pub fn find_album(state: &AppState, id: AlbumId) -> Option<&AlbumWithPhotos> {
    select_albums(state).iter().find(|album| album.id() == id)
}

pub fn select_opened_album(state: &AppState) -> &AsyncSlice<AlbumWithPhotos> {
    &state.albums.opened.album
}

pub fn select_opened_photos(state: &AppState) -> &[Photo] {
    state
        .albums
        .opened
        .album
        .data
        .as_ref()
        .map(|album| album.photos.as_slice())
        .unwrap_or_default()
}

pub fn select_needs_rebuild(state: &AppState) -> bool {
    state.albums.opened.needs_rebuild
}

pub fn select_book_me_info(state: &AppState) -> &AsyncSlice<BookMeInfo> {
    &state.book_me.info
}

pub fn select_book_me_email(state: &AppState) -> Option<&str> {
    state.book_me.info.data.as_ref().map(|info| info.email.as_str())
}

#[cfg(test)]
#[path = "tests/selectors_tests.rs"]
mod tests;
