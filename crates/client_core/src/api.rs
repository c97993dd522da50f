//! HTTP collaborators: the photo API and the static-site rebuild hook.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, Method, RequestBuilder, Response, StatusCode,
};
use serde::de::DeserializeOwned;
use shared::{
    domain::{AlbumId, AlbumWithPhotos, BookMeInfo, Photo, PhotoId},
    protocol::{
        AlbumListResponse, BookMeResponse, MeResponse, NewPhotoRequest, PhotoListResponse,
        PhotoResponse, UpdateBookMeRequest, UpdatePhotoRequest, UploadPhotoResponse,
    },
};
use tracing::debug;
use url::Url;

use crate::{actions::PhotoFile, config::Settings, error::ClientError, store::TokenSource};

const UPLOAD_FIELD: &str = "photo";

#[async_trait]
pub trait PhotoApi: Send + Sync {
    async fn get_me(&self) -> Result<Option<MeResponse>, ClientError>;
    async fn get_albums(&self) -> Result<Vec<AlbumWithPhotos>, ClientError>;
    async fn get_album_photos(&self, album_id: AlbumId) -> Result<Vec<Photo>, ClientError>;
    async fn upload_photo(&self, file: &PhotoFile) -> Result<UploadPhotoResponse, ClientError>;
    async fn create_photo(
        &self,
        album_id: AlbumId,
        request: &NewPhotoRequest,
    ) -> Result<Photo, ClientError>;
    async fn update_photo(
        &self,
        photo_id: PhotoId,
        request: &UpdatePhotoRequest,
    ) -> Result<Photo, ClientError>;
    async fn delete_photo(&self, photo_id: PhotoId) -> Result<(), ClientError>;
    async fn get_book_me(&self) -> Result<BookMeInfo, ClientError>;
    async fn update_book_me(&self, request: &UpdateBookMeRequest)
        -> Result<BookMeInfo, ClientError>;
}

/// Triggers regeneration of the public site.
#[async_trait]
pub trait BuildHook: Send + Sync {
    async fn trigger(&self) -> Result<(), ClientError>;
}

/// [`PhotoApi`] over reqwest. Every call carries the current bearer token;
/// without one the call is skipped.
pub struct HttpPhotoApi {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl HttpPhotoApi {
    pub fn new(http: Client, base_url: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            tokens,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        tokens: Arc<dyn TokenSource>,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .context("failed to build http client")?;
        Ok(Self::new(http, settings.api_base()?, tokens))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: impl FnOnce(RequestBuilder) -> RequestBuilder + Send,
    ) -> Result<Option<Vec<u8>>, ClientError> {
        let Some(token) = self.tokens.token() else {
            debug!(path, "api: no token, skipping request");
            return Ok(None);
        };
        let request = self
            .http
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(token);
        let response = check_status(body(request).send().await?).await?;
        Ok(Some(response.bytes().await?.to_vec()))
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: impl FnOnce(RequestBuilder) -> RequestBuilder + Send,
    ) -> Result<Option<T>, ClientError> {
        let Some(bytes) = self.send(method, path, body).await? else {
            return Ok(None);
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| ClientError::Decode {
                path: path.to_string(),
                source,
            })
    }

    async fn fetch_required<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: impl FnOnce(RequestBuilder) -> RequestBuilder + Send,
    ) -> Result<T, ClientError> {
        self.fetch(method, path, body)
            .await?
            .ok_or_else(|| empty_result(path))
    }
}

#[async_trait]
impl PhotoApi for HttpPhotoApi {
    async fn get_me(&self) -> Result<Option<MeResponse>, ClientError> {
        self.fetch(Method::GET, "/api/me", |request| request).await
    }

    async fn get_albums(&self) -> Result<Vec<AlbumWithPhotos>, ClientError> {
        let response: AlbumListResponse = self
            .fetch_required(Method::GET, "/api/albums", |request| request)
            .await?;
        Ok(response.list)
    }

    async fn get_album_photos(&self, album_id: AlbumId) -> Result<Vec<Photo>, ClientError> {
        let path = format!("/api/album/{album_id}/photos");
        let response: PhotoListResponse = self
            .fetch_required(Method::GET, &path, |request| request)
            .await?;
        Ok(response.list)
    }

    async fn upload_photo(&self, file: &PhotoFile) -> Result<UploadPhotoResponse, ClientError> {
        let mut part = Part::bytes(file.bytes.to_vec()).file_name(file.file_name.clone());
        if let Some(mime) = file.mime_type.as_deref() {
            part = part.mime_str(mime)?;
        }
        let form = Form::new().part(UPLOAD_FIELD, part);
        self.fetch_required(Method::POST, "/api/photo/upload", |request| {
            request.multipart(form)
        })
        .await
    }

    async fn create_photo(
        &self,
        album_id: AlbumId,
        request: &NewPhotoRequest,
    ) -> Result<Photo, ClientError> {
        let path = format!("/api/album/{album_id}/photo");
        let response: PhotoResponse = self
            .fetch_required(Method::POST, &path, |builder| builder.json(request))
            .await?;
        Ok(response.photo)
    }

    async fn update_photo(
        &self,
        photo_id: PhotoId,
        request: &UpdatePhotoRequest,
    ) -> Result<Photo, ClientError> {
        let path = format!("/api/photo/{photo_id}");
        let response: PhotoResponse = self
            .fetch_required(Method::PUT, &path, |builder| builder.json(request))
            .await?;
        Ok(response.photo)
    }

    async fn delete_photo(&self, photo_id: PhotoId) -> Result<(), ClientError> {
        let path = format!("/api/photo/{photo_id}");
        self.send(Method::DELETE, &path, |request| request)
            .await?
            .map(|_| ())
            .ok_or_else(|| empty_result(&path))
    }

    async fn get_book_me(&self) -> Result<BookMeInfo, ClientError> {
        let response: BookMeResponse = self
            .fetch_required(Method::GET, "/api/book_me/", |request| request)
            .await?;
        Ok(response.info)
    }

    async fn update_book_me(
        &self,
        request: &UpdateBookMeRequest,
    ) -> Result<BookMeInfo, ClientError> {
        let response: BookMeResponse = self
            .fetch_required(Method::PUT, "/api/book_me/", |builder| builder.json(request))
            .await?;
        Ok(response.info)
    }
}

/// `POST <url>` with no body; the response body is ignored.
pub struct HttpBuildHook {
    http: Client,
    url: Option<Url>,
}

impl HttpBuildHook {
    pub fn new(http: Client, url: Option<Url>) -> Self {
        Self { http, url }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .context("failed to build http client")?;
        Ok(Self::new(http, settings.build_hook()?))
    }
}

#[async_trait]
impl BuildHook for HttpBuildHook {
    async fn trigger(&self) -> Result<(), ClientError> {
        let Some(url) = self.url.clone() else {
            return Err(ClientError::Domain(
                "build hook url is not configured".to_string(),
            ));
        };
        check_status(self.http.post(url).send().await?).await?;
        Ok(())
    }
}

/// 401 → `Unauthorized`, 5xx → `Server`, any other non-2xx → `Transport`.
async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized);
    }
    if status.is_server_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Server {
            status: status.as_u16(),
            body,
        });
    }
    Err(ClientError::Transport {
        status: status.as_u16(),
        reason: status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string(),
    })
}

fn empty_result(path: &str) -> ClientError {
    ClientError::EmptyResult {
        path: path.to_string(),
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
