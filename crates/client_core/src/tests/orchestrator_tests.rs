use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use super::*;
use crate::{
    actions::PhotoFile,
    fixtures,
    persist::{MemoryStorage, SliceStorage, AUTH_KEY},
    slice::{AsyncSlice, AsyncStatus},
    state::{AppState, AuthState},
};
use async_trait::async_trait;
use shared::{
    domain::{AlbumWithPhotos, UserId},
    error::ErrorCode,
    protocol::{MeResponse, MeUser, UploadPhotoResponse},
};
use tokio::{sync::broadcast, time::timeout};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, PartialEq, Eq)]
enum MeReply {
    Valid,
    Unauthorized,
    Nothing,
}

/// Sets its flag when the future holding it is dropped before finishing.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct FakeApi {
    me: MeReply,
    albums: Vec<AlbumWithPhotos>,
    hang_albums: bool,
    fail_create: bool,
    update_unauthorized: bool,
    fail_book_me_update: bool,
    calls: Mutex<Vec<&'static str>>,
    created: Mutex<Vec<(AlbumId, NewPhotoRequest)>>,
    albums_started: AtomicBool,
    albums_dropped: Arc<AtomicBool>,
}

impl FakeApi {
    fn new() -> Self {
        Self {
            me: MeReply::Valid,
            albums: vec![
                fixtures::album_with_photos("Trips", 3),
                fixtures::album_with_photos("Family", 0),
            ],
            hang_albums: false,
            fail_create: false,
            update_unauthorized: false,
            fail_book_me_update: false,
            calls: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            albums_started: AtomicBool::new(false),
            albums_dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().expect("calls lock").push(call);
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl PhotoApi for FakeApi {
    async fn get_me(&self) -> Result<Option<MeResponse>, ClientError> {
        self.record("get_me");
        match self.me {
            MeReply::Valid => Ok(Some(MeResponse {
                user: MeUser {
                    id: UserId::new(),
                    email: "ana@example.com".to_string(),
                    picture: None,
                },
                token: None,
            })),
            MeReply::Unauthorized => Err(ClientError::Unauthorized),
            MeReply::Nothing => Ok(None),
        }
    }

    async fn get_albums(&self) -> Result<Vec<AlbumWithPhotos>, ClientError> {
        self.record("get_albums");
        if self.hang_albums {
            let _guard = DropFlag(self.albums_dropped.clone());
            self.albums_started.store(true, Ordering::SeqCst);
            std::future::pending::<()>().await;
        }
        Ok(self.albums.clone())
    }

    async fn get_album_photos(&self, album_id: AlbumId) -> Result<Vec<Photo>, ClientError> {
        self.record("get_album_photos");
        Ok(self
            .albums
            .iter()
            .find(|album| album.id() == album_id)
            .map(|album| album.photos.clone())
            .unwrap_or_default())
    }

    async fn upload_photo(&self, _file: &PhotoFile) -> Result<UploadPhotoResponse, ClientError> {
        self.record("upload_photo");
        Ok(UploadPhotoResponse {
            photo_url: "https://cdn.example/uploads/new.jpg".to_string(),
            s3_id: "uploads/new".to_string(),
        })
    }

    async fn create_photo(
        &self,
        album_id: AlbumId,
        request: &NewPhotoRequest,
    ) -> Result<Photo, ClientError> {
        self.record("create_photo");
        if self.fail_create {
            return Err(ClientError::Server {
                status: 500,
                body: "insert failed".to_string(),
            });
        }
        self.created
            .lock()
            .expect("created lock")
            .push((album_id, request.clone()));
        let mut photo = fixtures::photo(album_id, request.index_in_album);
        photo.s3_id = Some(request.s3_id.clone());
        photo.src = request.src.clone();
        photo.main_color = request.main_color.clone();
        Ok(photo)
    }

    async fn update_photo(
        &self,
        photo_id: PhotoId,
        request: &UpdatePhotoRequest,
    ) -> Result<Photo, ClientError> {
        self.record("update_photo");
        if self.update_unauthorized {
            return Err(ClientError::Unauthorized);
        }
        let mut photo = self
            .albums
            .iter()
            .flat_map(|album| album.photos.iter())
            .find(|photo| photo.id == photo_id)
            .cloned()
            .ok_or_else(|| ClientError::Transport {
                status: 404,
                reason: "Not Found".to_string(),
            })?;
        photo.is_favorite = request.is_favorite;
        photo.title = request.title.clone();
        Ok(photo)
    }

    async fn delete_photo(&self, _photo_id: PhotoId) -> Result<(), ClientError> {
        self.record("delete_photo");
        Ok(())
    }

    async fn get_book_me(&self) -> Result<BookMeInfo, ClientError> {
        self.record("get_book_me");
        Ok(fixtures::book_me("saved@example.com"))
    }

    async fn update_book_me(
        &self,
        request: &UpdateBookMeRequest,
    ) -> Result<BookMeInfo, ClientError> {
        self.record("update_book_me");
        if self.fail_book_me_update {
            return Err(ClientError::Server {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        Ok(fixtures::book_me(&request.email))
    }
}

#[derive(Default)]
struct FakeHook {
    fail: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl BuildHook for FakeHook {
    async fn trigger(&self) -> Result<(), ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ClientError::Transport {
                status: 404,
                reason: "Not Found".to_string(),
            });
        }
        Ok(())
    }
}

struct Harness {
    orchestrator: Arc<Orchestrator>,
    api: Arc<FakeApi>,
    hook: Arc<FakeHook>,
    actions: broadcast::Receiver<Action>,
    listener: JoinHandle<()>,
}

impl Harness {
    fn store(&self) -> &Arc<Store> {
        self.orchestrator.store()
    }

    async fn wait_state(&self, predicate: impl FnMut(&AppState) -> bool) -> AppState {
        timeout(WAIT, self.store().wait_until(predicate))
            .await
            .expect("state reached in time")
    }

    async fn wait_action(&mut self, mut matches: impl FnMut(&Action) -> bool) -> Action {
        let actions = &mut self.actions;
        timeout(WAIT, async move {
            loop {
                let action = actions.recv().await.expect("action stream open");
                if matches(&action) {
                    return action;
                }
            }
        })
        .await
        .expect("action seen in time")
    }

    /// Loads the album list and opens the first album, photos included.
    async fn open_first_album(&mut self) -> AlbumWithPhotos {
        self.orchestrator.fetch_all_albums();
        self.wait_state(|state| state.albums.list.status == AsyncStatus::Done)
            .await;
        let album = self.api.albums[0].clone();
        self.orchestrator.open_album(album.id());
        self.wait_action(|action| {
            matches!(
                action,
                Action::Albums(AlbumsAction::FetchPhotos(AsyncSignal::Success { .. }))
            )
        })
        .await;
        album
    }
}

fn start_with(api: FakeApi, hook: FakeHook, storage: Arc<MemoryStorage>) -> Harness {
    let api = Arc::new(api);
    let hook = Arc::new(hook);
    let store = Store::new(storage);
    let actions = store.subscribe_actions();
    let orchestrator = Orchestrator::new(store, api.clone(), hook.clone());
    let listener = orchestrator.spawn();
    Harness {
        orchestrator,
        api,
        hook,
        actions,
        listener,
    }
}

fn start(api: FakeApi) -> Harness {
    start_with(api, FakeHook::default(), Arc::new(MemoryStorage::new()))
}

fn storage_with_token(token: &str) -> Arc<MemoryStorage> {
    let storage = Arc::new(MemoryStorage::new());
    let auth = AuthState {
        token: Some(token.to_string()),
        user: AsyncSlice::done(fixtures::user()),
    };
    storage
        .save(AUTH_KEY, &serde_json::to_string(&auth).expect("encode auth"))
        .expect("seed storage");
    storage
}

fn new_photo() -> NewPhoto {
    NewPhoto {
        file: PhotoFile::new("sunset.jpg", Some("image/jpeg".to_string()), vec![1, 2, 3]),
        main_color: "#c86432".to_string(),
        title: Some("Sunset".to_string()),
        description: None,
        width: 640,
        height: 480,
    }
}

#[tokio::test]
async fn authenticate_stores_token_then_user() {
    let harness = start(FakeApi::new());

    harness.orchestrator.authenticate("fresh-token");

    let state = harness
        .wait_state(|state| state.auth.user.status == AsyncStatus::Done)
        .await;
    assert_eq!(state.auth.token.as_deref(), Some("fresh-token"));
    assert_eq!(
        state.auth.user.data.as_ref().map(|user| user.email.as_str()),
        Some("ana@example.com")
    );
}

#[tokio::test]
async fn authenticate_without_identity_fails() {
    let mut api = FakeApi::new();
    api.me = MeReply::Nothing;
    let harness = start(api);

    harness.orchestrator.authenticate("token");

    let state = harness
        .wait_state(|state| state.auth.user.status == AsyncStatus::Error)
        .await;
    let error = state.auth.user.error.expect("error recorded");
    assert_eq!(error.code, ErrorCode::Domain);
    assert!(error.message.contains("could not authenticate"));
}

#[tokio::test]
async fn authenticate_rejected_token_logs_out() {
    let mut api = FakeApi::new();
    api.me = MeReply::Unauthorized;
    let mut harness = start(api);

    harness.orchestrator.authenticate("revoked");
    harness
        .wait_action(|action| {
            matches!(
                action,
                Action::Auth(AuthAction::Authenticate(AsyncSignal::Failure { .. }))
            )
        })
        .await;

    let state = harness.store().state();
    assert!(state.auth.token.is_none());
    assert!(state.auth.user.data.is_none());
}

#[tokio::test]
async fn check_credentials_with_rejected_token_clears_auth() {
    let mut api = FakeApi::new();
    api.me = MeReply::Unauthorized;
    let mut harness = start_with(api, FakeHook::default(), storage_with_token("stale"));
    assert_eq!(harness.store().token().as_deref(), Some("stale"));

    harness.orchestrator.check_credentials();
    harness
        .wait_action(|action| matches!(action, Action::Auth(AuthAction::Logout)))
        .await;

    let state = harness.store().state();
    assert!(state.auth.token.is_none());
    assert!(state.auth.user.data.is_none());
}

#[tokio::test]
async fn check_credentials_with_empty_identity_logs_out() {
    let mut api = FakeApi::new();
    api.me = MeReply::Nothing;
    let mut harness = start_with(api, FakeHook::default(), storage_with_token("odd"));

    harness.orchestrator.check_credentials();
    harness
        .wait_action(|action| matches!(action, Action::Auth(AuthAction::Logout)))
        .await;

    assert!(harness.store().token().is_none());
}

#[tokio::test]
async fn check_credentials_keeps_valid_token() {
    let harness = start_with(
        FakeApi::new(),
        FakeHook::default(),
        storage_with_token("valid"),
    );

    harness.orchestrator.check_credentials();
    timeout(WAIT, async {
        while !harness.api.calls().contains(&"get_me") {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("identity checked");
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(harness.store().token().as_deref(), Some("valid"));
}

#[tokio::test]
async fn check_credentials_without_token_skips_the_api() {
    let harness = start(FakeApi::new());

    harness.orchestrator.check_credentials();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(harness.api.calls().is_empty());
}

#[tokio::test]
async fn fetch_all_albums_stores_the_list() {
    let harness = start(FakeApi::new());

    harness.orchestrator.fetch_all_albums();

    let state = harness
        .wait_state(|state| state.albums.list.status == AsyncStatus::Done)
        .await;
    assert_eq!(state.albums.list.data.as_ref(), Some(&harness.api.albums));
}

#[tokio::test]
async fn open_album_resolves_from_list_and_fetches_photos() {
    let mut harness = start(FakeApi::new());

    let album = harness.open_first_album().await;

    let state = harness.store().state();
    assert_eq!(state.albums.opened.album.status, AsyncStatus::Done);
    assert_eq!(state.albums.opened.album.data, Some(album));
    assert_eq!(harness.api.calls(), vec!["get_albums", "get_album_photos"]);
}

#[tokio::test]
async fn open_album_before_list_is_loaded_fails() {
    let harness = start(FakeApi::new());
    let album_id = harness.api.albums[0].id();

    harness.orchestrator.open_album(album_id);

    let state = harness
        .wait_state(|state| state.albums.opened.album.status == AsyncStatus::Error)
        .await;
    let error = state.albums.opened.album.error.expect("error recorded");
    assert_eq!(error.code, ErrorCode::Domain);
    assert!(error.message.contains("does not exist"));
    assert!(!harness.api.calls().contains(&"get_album_photos"));
}

#[tokio::test]
async fn add_photo_without_opened_album_fails_before_upload() {
    let harness = start(FakeApi::new());

    harness.orchestrator.add_photo(new_photo());

    let state = harness
        .wait_state(|state| state.albums.opened.changes.status == AsyncStatus::Error)
        .await;
    let error = state.albums.opened.changes.error.expect("error recorded");
    assert_eq!(error.code, ErrorCode::Domain);
    assert_eq!(error.message, "no opened album");
    assert!(!harness.api.calls().contains(&"upload_photo"));
}

#[tokio::test]
async fn add_photo_uploads_then_appends_and_marks_rebuild() {
    let mut harness = start(FakeApi::new());
    let album = harness.open_first_album().await;

    harness.orchestrator.add_photo(new_photo());

    let state = harness
        .wait_state(|state| state.albums.opened.changes.status == AsyncStatus::Done)
        .await;
    let photos = &state.albums.opened.album.data.as_ref().expect("opened").photos;
    assert_eq!(photos.len(), album.photos.len() + 1);
    let added = photos.last().expect("added photo");
    assert_eq!(added.src, "https://cdn.example/uploads/new.jpg");
    assert!(state.albums.opened.needs_rebuild);

    let created = harness.api.created.lock().expect("created lock").clone();
    assert_eq!(created.len(), 1);
    let (album_id, request) = &created[0];
    assert_eq!(*album_id, album.id());
    assert_eq!(request.index_in_album, 3);
    assert_eq!(request.s3_id, "uploads/new");
    assert_eq!(request.main_color, "#c86432");
    assert_eq!((request.width, request.height), (640, 480));
}

#[tokio::test]
async fn add_photo_create_failure_reports_single_failure() {
    let mut api = FakeApi::new();
    api.fail_create = true;
    let mut harness = start(api);
    let album = harness.open_first_album().await;

    harness.orchestrator.add_photo(new_photo());

    let state = harness
        .wait_state(|state| state.albums.opened.changes.status == AsyncStatus::Error)
        .await;
    assert_eq!(
        state.albums.opened.changes.error.as_ref().map(|e| e.code),
        Some(ErrorCode::Server)
    );
    assert_eq!(state.albums.opened.album.data, Some(album));
    assert!(!state.albums.opened.needs_rebuild);
    assert!(harness.api.calls().contains(&"upload_photo"));
}

#[tokio::test]
async fn update_and_delete_keep_order_and_mark_rebuild() {
    let mut harness = start(FakeApi::new());
    let album = harness.open_first_album().await;
    let target = album.photos[1].clone();

    let mut update = PhotoUpdate::from_photo(&target);
    update.is_favorite = true;
    harness.orchestrator.update_photo(update);
    let state = harness
        .wait_state(|state| {
            state
                .albums
                .opened
                .album
                .data
                .as_ref()
                .is_some_and(|album| album.photos[1].is_favorite)
        })
        .await;
    assert!(state.albums.opened.needs_rebuild);

    harness.orchestrator.delete_photo(target.id);
    let state = harness
        .wait_state(|state| {
            state
                .albums
                .opened
                .album
                .data
                .as_ref()
                .is_some_and(|album| album.photos.len() == 2)
        })
        .await;
    let remaining: Vec<PhotoId> = selectors::select_opened_photos(&state)
        .iter()
        .map(|photo| photo.id)
        .collect();
    assert_eq!(remaining, vec![album.photos[0].id, album.photos[2].id]);
}

#[tokio::test]
async fn unauthorized_mutation_forces_logout() {
    let mut api = FakeApi::new();
    api.update_unauthorized = true;
    let mut harness = start_with(api, FakeHook::default(), storage_with_token("expired"));
    let album = harness.open_first_album().await;

    harness
        .orchestrator
        .update_photo(PhotoUpdate::from_photo(&album.photos[0]));

    let state = harness
        .wait_state(|state| state.albums.opened.changes.status == AsyncStatus::Error)
        .await;
    assert!(state.auth.token.is_none());
    assert!(state.auth.user.data.is_none());
    assert_eq!(
        state.albums.opened.changes.error.map(|e| e.code),
        Some(ErrorCode::Unauthorized)
    );
}

#[tokio::test]
async fn build_application_clears_flag_before_hook_runs() {
    let harness = start(FakeApi::new());
    harness.orchestrator.mark_rebuild_needed();
    assert!(selectors::select_needs_rebuild(&harness.store().state()));

    harness.orchestrator.build_application();

    assert!(!selectors::select_needs_rebuild(
        &harness.orchestrator.store().state()
    ));
    timeout(WAIT, async {
        while harness.hook.calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("hook triggered");
}

#[tokio::test]
async fn build_hook_failure_is_only_logged() {
    let hook = FakeHook {
        fail: true,
        ..FakeHook::default()
    };
    let harness = start_with(FakeApi::new(), hook, Arc::new(MemoryStorage::new()));
    harness.orchestrator.mark_rebuild_needed();
    let before = harness.store().state();

    harness.orchestrator.build_application();
    timeout(WAIT, async {
        while harness.hook.calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("hook triggered");
    tokio::time::sleep(Duration::from_millis(20)).await;

    let after = harness.store().state();
    assert!(!after.albums.opened.needs_rebuild);
    assert_eq!(after.auth, before.auth);
    assert_eq!(after.albums.list, before.albums.list);
    assert_eq!(after.albums.opened.changes, before.albums.opened.changes);
}

#[tokio::test]
async fn fetch_info_stores_record() {
    let harness = start(FakeApi::new());

    harness.orchestrator.fetch_info();

    let state = harness
        .wait_state(|state| state.book_me.info.status == AsyncStatus::Done)
        .await;
    assert_eq!(
        selectors::select_book_me_email(&state),
        Some("saved@example.com")
    );
}

#[tokio::test]
async fn update_info_failure_keeps_submitted_email() {
    let mut api = FakeApi::new();
    api.fail_book_me_update = true;
    let harness = start(api);

    harness.orchestrator.update_info("typed@example.com");

    let state = harness
        .wait_state(|state| state.book_me.info.status == AsyncStatus::Error)
        .await;
    assert_eq!(
        selectors::select_book_me_email(&state),
        Some("typed@example.com")
    );
    assert_eq!(
        state.book_me.info.error.map(|e| e.code),
        Some(ErrorCode::Server)
    );
}

#[tokio::test]
async fn cancel_aborts_in_flight_call() {
    let mut api = FakeApi::new();
    api.hang_albums = true;
    let harness = start(api);

    let id = harness.orchestrator.fetch_all_albums();
    timeout(WAIT, async {
        while !harness.api.albums_started.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("call started");
    assert!(harness.store().state().albums.list.is_loading());

    harness
        .store()
        .dispatch(AlbumsAction::FetchAll(AsyncSignal::Cancel { id }));

    timeout(WAIT, async {
        while !harness.api.albums_dropped.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("call aborted");
    assert_eq!(harness.store().state().albums.list, AsyncSlice::idle());
}

#[tokio::test]
async fn shutdown_drains_running_effects() {
    let harness = start(FakeApi::new());
    harness.orchestrator.mark_rebuild_needed();

    harness.orchestrator.build_application();
    harness.orchestrator.shutdown();
    timeout(WAIT, harness.listener)
        .await
        .expect("listener stopped in time")
        .expect("listener did not panic");

    assert_eq!(harness.hook.calls.load(Ordering::SeqCst), 1);
    assert!(!selectors::select_needs_rebuild(
        &harness.orchestrator.store().state()
    ));
}

#[tokio::test]
async fn requests_after_shutdown_are_not_served() {
    let harness = start(FakeApi::new());
    harness.orchestrator.shutdown();
    timeout(WAIT, harness.listener)
        .await
        .expect("listener stopped in time")
        .expect("listener did not panic");

    harness.orchestrator.fetch_all_albums();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(harness.api.calls().is_empty());
    assert!(harness.orchestrator.store().state().albums.list.is_loading());
}
