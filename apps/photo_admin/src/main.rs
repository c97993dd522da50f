use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    actions::{Action, AlbumsAction, NewPhoto, PhotoFile, PhotoUpdate, SignalPhase},
    color,
    config::{load_settings, Settings},
    selectors::{self, Access},
    AppState, FileStorage, HttpBuildHook, HttpPhotoApi, Orchestrator, RequestId, Store,
    TokenSource,
};
use shared::domain::{AlbumId, AlbumWithPhotos, PhotoId};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Manage photo albums and the booking contact")]
struct Cli {
    /// Where the session is kept between runs.
    #[arg(long)]
    state_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in with an API token.
    Login {
        #[arg(long)]
        token: String,
    },
    /// Verify the stored token; signs out if the server rejects it.
    Check,
    Logout,
    Albums,
    Photos {
        album_id: AlbumId,
    },
    AddPhoto {
        album_id: AlbumId,
        path: PathBuf,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Trigger a site rebuild afterwards.
        #[arg(long)]
        rebuild: bool,
    },
    Favorite {
        album_id: AlbumId,
        photo_id: PhotoId,
        /// Clear the flag instead of setting it.
        #[arg(long)]
        off: bool,
        #[arg(long)]
        rebuild: bool,
    },
    DeletePhoto {
        album_id: AlbumId,
        photo_id: PhotoId,
        #[arg(long)]
        rebuild: bool,
    },
    /// Trigger a rebuild of the public site.
    Rebuild,
    /// Show the booking contact, or replace it with `--email`.
    BookMe {
        #[arg(long)]
        email: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();
    let settings = load_settings()?;
    let state_dir = match cli.state_dir.clone().or_else(|| settings.state_dir.clone()) {
        Some(dir) => dir,
        None => default_state_dir()?,
    };

    let mut session = Session::start(&settings, state_dir)?;
    let outcome = run(&mut session, cli.command).await;
    session.finish().await;
    outcome
}

fn default_state_dir() -> Result<PathBuf> {
    Ok(dirs::data_local_dir()
        .ok_or_else(|| anyhow!("unable to resolve local app data dir"))?
        .join("photo_admin"))
}

async fn run(session: &mut Session, command: Command) -> Result<()> {
    match command {
        Command::Login { token } => {
            let id = session.orchestrator.authenticate(token);
            session.settled(id).await?;
            let state = session.state();
            match selectors::select_access(&state) {
                Access::Authenticated(user) => {
                    println!("signed in as {} ({})", user.email, user.id)
                }
                Access::Unauthenticated => {
                    let reason = state
                        .auth
                        .user
                        .error
                        .as_ref()
                        .map_or("token rejected", |err| err.message.as_str());
                    bail!("sign in failed: {reason}");
                }
            }
        }
        Command::Check => {
            if session.store().token().is_none() {
                println!("not signed in");
                return Ok(());
            }
            session.orchestrator.check_credentials();
            session.finish().await;
            println!("{}", describe_check(&session.state()));
        }
        Command::Logout => {
            session.orchestrator.logout();
            println!("signed out");
        }
        Command::Albums => {
            for album in session.load_albums().await? {
                println!(
                    "{}  {}  ({} photos)",
                    album.id(),
                    album.album.name,
                    album.photos.len()
                );
            }
        }
        Command::Photos { album_id } => {
            session.open_album(album_id).await?;
            let state = session.state();
            for photo in selectors::select_opened_photos(&state) {
                println!(
                    "{:>3}  {}  {}  {}x{}  {}  {}",
                    photo.index_in_album,
                    photo.id,
                    if photo.is_favorite { "*" } else { " " },
                    photo.width,
                    photo.height,
                    photo.main_color,
                    photo.title.as_deref().unwrap_or("")
                );
            }
        }
        Command::AddPhoto {
            album_id,
            path,
            title,
            description,
            rebuild,
        } => {
            let photo = read_photo(&path, title, description).await?;
            session.open_album(album_id).await?;
            let id = session.orchestrator.add_photo(photo);
            session.settled(id).await?;
            session.ensure_change_applied("add photo")?;
            println!("added {}", path.display());
            session.after_change(rebuild);
        }
        Command::Favorite {
            album_id,
            photo_id,
            off,
            rebuild,
        } => {
            session.open_album(album_id).await?;
            let state = session.state();
            let photo = selectors::select_opened_photos(&state)
                .iter()
                .find(|photo| photo.id == photo_id)
                .ok_or_else(|| anyhow!("photo {photo_id} is not in album {album_id}"))?;
            let update = PhotoUpdate {
                is_favorite: !off,
                ..PhotoUpdate::from_photo(photo)
            };
            let id = session.orchestrator.update_photo(update);
            session.settled(id).await?;
            session.ensure_change_applied("update photo")?;
            println!("{photo_id} favorite={}", !off);
            session.after_change(rebuild);
        }
        Command::DeletePhoto {
            album_id,
            photo_id,
            rebuild,
        } => {
            session.open_album(album_id).await?;
            let id = session.orchestrator.delete_photo(photo_id);
            session.settled(id).await?;
            session.ensure_change_applied("delete photo")?;
            println!("deleted {photo_id}");
            session.after_change(rebuild);
        }
        Command::Rebuild => {
            session.orchestrator.build_application();
            println!("rebuild requested");
        }
        Command::BookMe { email: None } => {
            let id = session.orchestrator.fetch_info();
            session.settled(id).await?;
            let state = session.state();
            if let Some(err) = &state.book_me.info.error {
                bail!("could not load booking contact: {err}");
            }
            println!(
                "{}",
                selectors::select_book_me_email(&state).unwrap_or("(none)")
            );
        }
        Command::BookMe { email: Some(email) } => {
            let id = session.orchestrator.update_info(email);
            session.settled(id).await?;
            let state = session.state();
            if let Some(err) = &state.book_me.info.error {
                bail!("could not update booking contact: {err}");
            }
            println!(
                "booking contact set to {}",
                selectors::select_book_me_email(&state).unwrap_or("(none)")
            );
        }
    }
    Ok(())
}

async fn read_photo(
    path: &Path,
    title: Option<String>,
    description: Option<String>,
) -> Result<NewPhoto> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let analysis = color::analyze_photo(&bytes)
        .with_context(|| format!("'{}' is not a supported image", path.display()))?;
    debug!(
        width = analysis.width,
        height = analysis.height,
        main_color = ?analysis.main_color,
        "photo: analyzed"
    );
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "photo".to_string());
    let mime_type = mime_guess::from_path(path).first_raw().map(str::to_string);
    Ok(NewPhoto {
        file: PhotoFile::new(file_name, mime_type, bytes),
        main_color: analysis.main_color.unwrap_or_default(),
        title,
        description,
        width: i32::try_from(analysis.width).context("image is too wide")?,
        height: i32::try_from(analysis.height).context("image is too tall")?,
    })
}

fn describe_check(state: &AppState) -> String {
    match (
        selectors::select_token(state),
        selectors::select_authenticated_user(state),
    ) {
        (None, _) => "stored credentials were rejected, signed out".to_string(),
        (Some(_), Some(user)) => format!("signed in as {}", user.email),
        (Some(_), None) => "stored token is valid".to_string(),
    }
}

struct Session {
    orchestrator: Arc<Orchestrator>,
    actions: broadcast::Receiver<Action>,
    listener: Option<JoinHandle<()>>,
    limit: Duration,
}

impl Session {
    fn start(settings: &Settings, state_dir: PathBuf) -> Result<Self> {
        debug!(state_dir = %state_dir.display(), "session: using state directory");
        let store = Store::new(Arc::new(FileStorage::new(state_dir)));
        let api = HttpPhotoApi::from_settings(settings, store.clone())?;
        let build_hook = HttpBuildHook::from_settings(settings)?;
        let actions = store.subscribe_actions();
        let orchestrator = Orchestrator::new(store, Arc::new(api), Arc::new(build_hook));
        let listener = orchestrator.spawn();
        Ok(Self {
            orchestrator,
            actions,
            listener: Some(listener),
            limit: settings.request_timeout() + Duration::from_secs(5),
        })
    }

    fn store(&self) -> &Arc<Store> {
        self.orchestrator.store()
    }

    fn state(&self) -> AppState {
        self.store().state()
    }

    async fn settled(&mut self, id: RequestId) -> Result<Action> {
        self.next_action(|action| action.phase() == Some(SignalPhase::Settled(id)))
            .await
    }

    async fn next_action(&mut self, mut matches: impl FnMut(&Action) -> bool) -> Result<Action> {
        let actions = &mut self.actions;
        let waited = timeout(self.limit, async move {
            loop {
                match actions.recv().await {
                    Ok(action) if matches(&action) => return Ok(action),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "session: skipped actions while waiting");
                    }
                    Err(RecvError::Closed) => return Err(anyhow!("action stream closed")),
                }
            }
        })
        .await;
        waited.context("timed out waiting for the server")?
    }

    async fn load_albums(&mut self) -> Result<Vec<AlbumWithPhotos>> {
        let id = self.orchestrator.fetch_all_albums();
        self.settled(id).await?;
        let state = self.state();
        if let Some(err) = &state.albums.list.error {
            bail!("could not load albums: {err}");
        }
        Ok(selectors::select_albums(&state).to_vec())
    }

    /// Loads the list, opens `album_id` from it and waits for its photos.
    async fn open_album(&mut self, album_id: AlbumId) -> Result<()> {
        self.load_albums().await?;
        let id = self.orchestrator.open_album(album_id);
        self.settled(id).await?;
        if let Some(err) = &selectors::select_opened_album(&self.state()).error {
            bail!("could not open album: {err}");
        }
        self.next_action(|action| {
            matches!(action, Action::Albums(AlbumsAction::FetchPhotos(_)))
                && matches!(action.phase(), Some(SignalPhase::Settled(_)))
        })
        .await?;
        if let Some(err) = &selectors::select_opened_album(&self.state()).error {
            bail!("could not load photos: {err}");
        }
        Ok(())
    }

    fn ensure_change_applied(&self, operation: &str) -> Result<()> {
        match &self.state().albums.opened.changes.error {
            Some(err) => bail!("{operation} failed: {err}"),
            None => Ok(()),
        }
    }

    fn after_change(&self, rebuild: bool) {
        if !selectors::select_needs_rebuild(&self.state()) {
            return;
        }
        if rebuild {
            self.orchestrator.build_application();
            println!("rebuild requested");
        } else {
            println!("site is out of date, run `photo_admin rebuild` to publish");
        }
    }

    async fn finish(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        self.orchestrator.shutdown();
        match timeout(self.limit, listener).await {
            Ok(Ok(())) => debug!("session: listener stopped"),
            Ok(Err(err)) => warn!("session: listener ended abnormally: {err}"),
            Err(_) => warn!("session: gave up waiting for running effects"),
        }
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
