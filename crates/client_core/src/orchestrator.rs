//! Effect orchestration: turns request signals into API calls and feeds the
//! outcome back into the store as success/failure signals.
//!
//! One listener task consumes the action stream. Every request signal gets
//! its own effect task, tracked by [`RequestId`] until it settles, so a
//! cancel signal can abort the call that is still running.

use std::{collections::HashMap, sync::Arc};

use shared::{
    domain::{AlbumId, AuthenticatedUser, BookMeInfo, Photo, PhotoId},
    error::ApiError,
    protocol::{NewPhotoRequest, UpdateBookMeRequest, UpdatePhotoRequest},
};
use tokio::{
    sync::{broadcast::error::RecvError, watch},
    task::{AbortHandle, JoinError, JoinHandle, JoinSet},
};
use tracing::{debug, info, warn};

use crate::{
    actions::{
        Action, AlbumPhotos, AlbumsAction, AsyncSignal, AuthAction, BookMeAction, NewPhoto,
        PhotoUpdate, SignalPhase, UpdateInfoFailure,
    },
    api::{BuildHook, PhotoApi},
    error::ClientError,
    selectors,
    slice::RequestId,
    store::{Store, TokenSource},
};

pub struct Orchestrator {
    store: Arc<Store>,
    api: Arc<dyn PhotoApi>,
    build_hook: Arc<dyn BuildHook>,
    shutdown: watch::Sender<bool>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<Store>,
        api: Arc<dyn PhotoApi>,
        build_hook: Arc<dyn BuildHook>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            api,
            build_hook,
            shutdown: watch::channel(false).0,
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Starts the listener. The action stream is subscribed before this
    /// returns, so signals dispatched afterwards are never missed.
    ///
    /// The task ends after [`Orchestrator::shutdown`], once every running
    /// effect has finished.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let mut actions = self.store.subscribe_actions();
        let mut stop = self.shutdown.subscribe();
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let mut effects = JoinSet::new();
            let mut in_flight: HashMap<RequestId, AbortHandle> = HashMap::new();
            loop {
                let received = tokio::select! {
                    biased;
                    received = actions.recv() => received,
                    Some(joined) = effects.join_next(), if !effects.is_empty() => {
                        log_join(joined);
                        continue;
                    }
                    _ = stop.changed() => break,
                };
                let action = match received {
                    Ok(action) => action,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "effects: listener lagged behind the action stream");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                match action.phase() {
                    Some(SignalPhase::Request(id)) => {
                        let handle = Arc::clone(&orchestrator).run_effect(action, &mut effects);
                        if let Some(handle) = handle {
                            in_flight.insert(id, handle);
                        }
                    }
                    Some(SignalPhase::Settled(id)) => {
                        in_flight.remove(&id);
                    }
                    Some(SignalPhase::Cancel(id)) => {
                        if let Some(handle) = in_flight.remove(&id) {
                            handle.abort();
                            debug!(request_id = %id, action = action.name(), "effects: aborted");
                        }
                    }
                    None => {
                        Arc::clone(&orchestrator).run_effect(action, &mut effects);
                    }
                }
            }
            debug!(running = effects.len(), "effects: listener stopped, draining");
            while let Some(joined) = effects.join_next().await {
                log_join(joined);
            }
        })
    }

    /// Stops the listener once the actions already dispatched have been
    /// taken up. Running effects are awaited; later requests are not served.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn fetch_all_albums(&self) -> RequestId {
        self.request(|id| AlbumsAction::FetchAll(AsyncSignal::Request { id, input: () }).into())
    }

    pub fn open_album(&self, album_id: AlbumId) -> RequestId {
        self.request(|id| {
            AlbumsAction::Open(AsyncSignal::Request {
                id,
                input: album_id,
            })
            .into()
        })
    }

    pub fn fetch_album_photos(&self, album_id: AlbumId) -> RequestId {
        self.request(|id| {
            AlbumsAction::FetchPhotos(AsyncSignal::Request {
                id,
                input: album_id,
            })
            .into()
        })
    }

    pub fn add_photo(&self, photo: NewPhoto) -> RequestId {
        self.request(|id| AlbumsAction::AddPhoto(AsyncSignal::Request { id, input: photo }).into())
    }

    pub fn update_photo(&self, update: PhotoUpdate) -> RequestId {
        self.request(|id| {
            AlbumsAction::UpdatePhoto(AsyncSignal::Request { id, input: update }).into()
        })
    }

    pub fn delete_photo(&self, photo_id: PhotoId) -> RequestId {
        self.request(|id| {
            AlbumsAction::DeletePhoto(AsyncSignal::Request {
                id,
                input: photo_id,
            })
            .into()
        })
    }

    pub fn mark_rebuild_needed(&self) {
        self.store.dispatch(AlbumsAction::MarkRebuildNeeded);
    }

    /// Clears the rebuild flag right away and fires the hook in the background.
    pub fn build_application(&self) {
        self.store.dispatch(AlbumsAction::BuildApplication);
    }

    pub fn authenticate(&self, token: impl Into<String>) -> RequestId {
        let token = token.into();
        self.request(|id| {
            AuthAction::Authenticate(AsyncSignal::Request { id, input: token }).into()
        })
    }

    pub fn check_credentials(&self) {
        self.store.dispatch(AuthAction::CheckCredentials);
    }

    pub fn logout(&self) {
        self.store.dispatch(AuthAction::Logout);
    }

    pub fn fetch_info(&self) -> RequestId {
        self.request(|id| BookMeAction::FetchInfo(AsyncSignal::Request { id, input: () }).into())
    }

    pub fn update_info(&self, email: impl Into<String>) -> RequestId {
        let email = email.into();
        self.request(|id| {
            BookMeAction::UpdateInfo(AsyncSignal::Request { id, input: email }).into()
        })
    }

    fn request(&self, make: impl FnOnce(RequestId) -> Action) -> RequestId {
        let id = self.store.next_request_id();
        self.store.dispatch(make(id));
        id
    }

    fn run_effect(
        self: Arc<Self>,
        action: Action,
        effects: &mut JoinSet<()>,
    ) -> Option<AbortHandle> {
        match action {
            Action::Auth(AuthAction::Authenticate(AsyncSignal::Request { id, input })) => {
                Some(effects.spawn(async move {
                    let result = self.authenticate_effect(input).await;
                    let signal = self.settle(id, "auth/authenticate", result);
                    self.store.dispatch(AuthAction::Authenticate(signal));
                }))
            }
            Action::Auth(AuthAction::CheckCredentials) => {
                Some(effects.spawn(async move { self.check_credentials_effect().await }))
            }
            Action::Albums(AlbumsAction::FetchAll(AsyncSignal::Request { id, .. })) => {
                Some(effects.spawn(async move {
                    let result = self.api.get_albums().await;
                    let signal = self.settle(id, "albums/fetch", result);
                    self.store.dispatch(AlbumsAction::FetchAll(signal));
                }))
            }
            Action::Albums(AlbumsAction::Open(AsyncSignal::Request { id, input })) => {
                Some(effects.spawn(async move { self.open_album_effect(id, input) }))
            }
            Action::Albums(AlbumsAction::FetchPhotos(AsyncSignal::Request { id, input })) => {
                Some(effects.spawn(async move {
                    let result = self
                        .api
                        .get_album_photos(input)
                        .await
                        .map(|photos| AlbumPhotos {
                            album_id: input,
                            photos,
                        });
                    let signal = self.settle(id, "albums/fetch_photos", result);
                    self.store.dispatch(AlbumsAction::FetchPhotos(signal));
                }))
            }
            Action::Albums(AlbumsAction::AddPhoto(AsyncSignal::Request { id, input })) => {
                Some(effects.spawn(async move {
                    let result = self.add_photo_effect(&input).await;
                    let signal = self.settle(id, "albums/add_photo", result);
                    self.store.dispatch(AlbumsAction::AddPhoto(signal));
                }))
            }
            Action::Albums(AlbumsAction::UpdatePhoto(AsyncSignal::Request { id, input })) => {
                Some(effects.spawn(async move {
                    let request = UpdatePhotoRequest {
                        index_in_album: input.index_in_album,
                        is_favorite: input.is_favorite,
                        title: input.title,
                        description: input.description,
                    };
                    let result = self.api.update_photo(input.id, &request).await;
                    let signal = self.settle(id, "albums/update_photo", result);
                    self.store.dispatch(AlbumsAction::UpdatePhoto(signal));
                }))
            }
            Action::Albums(AlbumsAction::DeletePhoto(AsyncSignal::Request { id, input })) => {
                Some(effects.spawn(async move {
                    let result = self.api.delete_photo(input).await.map(|()| input);
                    let signal = self.settle(id, "albums/delete_photo", result);
                    self.store.dispatch(AlbumsAction::DeletePhoto(signal));
                }))
            }
            Action::Albums(AlbumsAction::BuildApplication) => {
                Some(effects.spawn(async move { self.build_application_effect().await }))
            }
            Action::BookMe(BookMeAction::FetchInfo(AsyncSignal::Request { id, .. })) => {
                Some(effects.spawn(async move {
                    let result = self.api.get_book_me().await;
                    let signal = self.settle(id, "book_me/fetch", result);
                    self.store.dispatch(BookMeAction::FetchInfo(signal));
                }))
            }
            Action::BookMe(BookMeAction::UpdateInfo(AsyncSignal::Request { id, input })) => {
                Some(effects.spawn(async move {
                    let signal = self.update_info_effect(id, input).await;
                    self.store.dispatch(BookMeAction::UpdateInfo(signal));
                }))
            }
            _ => None,
        }
    }

    async fn authenticate_effect(&self, token: String) -> Result<AuthenticatedUser, ClientError> {
        self.store.dispatch(AuthAction::SetToken(token));
        match self.api.get_me().await? {
            Some(me) => Ok(AuthenticatedUser {
                id: me.user.id,
                email: me.user.email,
            }),
            None => Err(ClientError::Domain("could not authenticate".to_string())),
        }
    }

    async fn check_credentials_effect(&self) {
        if self.store.token().is_none() {
            debug!("auth: no stored token, skipping credential check");
            return;
        }
        match self.api.get_me().await {
            Ok(Some(me)) => info!(user_id = %me.user.id, "auth: stored credentials are valid"),
            Ok(None) => {
                warn!("auth: identity endpoint returned nothing, logging out");
                self.store.dispatch(AuthAction::Logout);
            }
            Err(err) => {
                warn!("auth: credential check failed, logging out: {err}");
                self.store.dispatch(AuthAction::Logout);
            }
        }
    }

    fn open_album_effect(&self, id: RequestId, album_id: AlbumId) {
        let found = self
            .store
            .with_state(|state| selectors::find_album(state, album_id).cloned());
        let Some(album) = found else {
            let error = ApiError::domain(format!("album {album_id} does not exist"));
            warn!(album_id = %album_id, "albums: cannot open album that is not in the loaded list");
            self.store
                .dispatch(AlbumsAction::Open(AsyncSignal::Failure { id, error }));
            return;
        };
        self.store.dispatch(AlbumsAction::Open(AsyncSignal::Success {
            id,
            output: album,
        }));
        self.fetch_album_photos(album_id);
    }

    async fn add_photo_effect(&self, input: &NewPhoto) -> Result<Photo, ClientError> {
        let opened = self.store.with_state(|state| {
            state
                .albums
                .opened
                .album
                .data
                .as_ref()
                .map(|album| (album.id(), album.photos.len()))
        });
        let Some((album_id, photo_count)) = opened else {
            return Err(ClientError::Domain("no opened album".to_string()));
        };

        let uploaded = self.api.upload_photo(&input.file).await?;
        let request = NewPhotoRequest {
            index_in_album: i32::try_from(photo_count).unwrap_or(i32::MAX),
            s3_id: uploaded.s3_id.clone(),
            src: uploaded.photo_url,
            main_color: input.main_color.clone(),
            title: input.title.clone(),
            description: input.description.clone(),
            width: input.width,
            height: input.height,
        };
        self.api
            .create_photo(album_id, &request)
            .await
            .inspect_err(|err| {
                warn!(
                    album_id = %album_id,
                    s3_id = %uploaded.s3_id,
                    "albums: photo record creation failed, upload left orphaned: {err}"
                );
            })
    }

    async fn build_application_effect(&self) {
        match self.build_hook.trigger().await {
            Ok(()) => info!("albums: rebuild triggered"),
            Err(err) => warn!("albums: rebuild hook failed: {err}"),
        }
    }

    async fn update_info_effect(
        &self,
        id: RequestId,
        email: String,
    ) -> AsyncSignal<String, BookMeInfo, UpdateInfoFailure> {
        let request = UpdateBookMeRequest {
            email: email.clone(),
        };
        match self.api.update_book_me(&request).await {
            Ok(output) => AsyncSignal::Success { id, output },
            Err(err) => AsyncSignal::Failure {
                id,
                error: UpdateInfoFailure {
                    error: self.failure("book_me/update", err),
                    email,
                },
            },
        }
    }

    fn settle<Req, Res>(
        &self,
        id: RequestId,
        operation: &'static str,
        result: Result<Res, ClientError>,
    ) -> AsyncSignal<Req, Res> {
        match result {
            Ok(output) => AsyncSignal::Success { id, output },
            Err(err) => AsyncSignal::Failure {
                id,
                error: self.failure(operation, err),
            },
        }
    }

    fn failure(&self, operation: &'static str, err: ClientError) -> ApiError {
        warn!(operation, code = ?err.code(), "effects: operation failed: {err}");
        if err.is_unauthorized() {
            self.store.dispatch(AuthAction::Logout);
        }
        err.into()
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        if err.is_panic() {
            warn!("effects: effect task panicked: {err}");
        }
    }
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
