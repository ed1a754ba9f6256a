use std::{collections::HashSet, sync::Arc, time::Duration};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::multipart;
use shared::{
    domain::{sort_feed, Post, PostId, UserId},
    error::{ApiError, ApiException, ErrorCode},
    protocol::CaptionResponse,
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

pub mod config;
pub mod session;

pub use config::{load_settings, Settings};
pub use session::{
    AlwaysConfirm, AnonymousSession, ApiSession, DeleteConfirmer, NeverConfirm, SessionGate,
};

/// A user-selected image file staged for posting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Renderable stand-in for the selected image: a `data:` URL a UI can hand
/// straight to an image view without touching the filesystem again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePreview(String);

impl ImagePreview {
    fn from_upload(upload: &ImageUpload) -> Self {
        let mime = upload
            .mime_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        Self(format!(
            "data:{mime};base64,{}",
            STANDARD.encode(&upload.bytes)
        ))
    }

    pub fn as_data_url(&self) -> &str {
        &self.0
    }
}

/// The in-progress, not-yet-submitted post. Lives only on the client and is
/// destroyed on submit success or explicit reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftPost {
    pub selected_image: Option<ImageUpload>,
    pub preview: Option<ImagePreview>,
    /// Last AI output, kept for reference; user edits go to `custom_caption`.
    pub generated_caption: Option<String>,
    pub custom_caption: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    GenerateCaption,
    CreatePost,
    FetchFeed,
    LikePost,
    DeletePost,
}

impl ActionKind {
    /// The one generic notification text shown when this action fails.
    pub fn failure_notice(self) -> &'static str {
        match self {
            Self::GenerateCaption => "failed to generate caption",
            Self::CreatePost => "failed to create post",
            Self::FetchFeed => "failed to load posts",
            Self::LikePost => "failed to like post",
            Self::DeletePost => "failed to delete post",
        }
    }
}

#[derive(Debug, Clone)]
pub enum DashboardEvent {
    FeedRefreshed { posts: Vec<Post> },
    CaptionGenerated { caption: String },
    PostCreated { post: Post },
    PostDeleted { post_id: PostId },
    ActionFailed { action: ActionKind, detail: String },
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("select an image first")]
    MissingImage,
    #[error("caption must not be empty")]
    EmptyCaption,
    #[error("not signed in")]
    SignedOut,
    #[error("only the author can delete a post")]
    NotPostOwner,
    #[error("post {0} is not in the current feed")]
    UnknownPost(PostId),
    #[error("server rejected the request: {0}")]
    Api(#[from] ApiException),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Resolves a response into its body or the server's error report. Bodies
/// that fail to parse as an [`ApiError`] fall back to a status-derived code.
pub(crate) async fn check_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, WorkflowError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let (code, message) = match response.json::<ApiError>().await {
        Ok(body) => (body.code, body.message),
        Err(_) => (
            ErrorCode::from_status(status.as_u16()),
            format!("server returned {status}"),
        ),
    };
    Err(WorkflowError::Api(ApiException { code, message }))
}

#[derive(Debug, Default)]
struct DashboardState {
    draft: DraftPost,
    feed: Vec<Post>,
    feed_loading: bool,
    caption_inflight: bool,
    submit_inflight: bool,
    post_mutations_inflight: HashSet<PostId>,
}

/// The post-authoring and feed-synchronization controller. One value owns
/// the draft, the mirrored feed, and the single-flight guards; all feed
/// mutations resolve through a full refetch rather than local patching.
pub struct DashboardClient {
    http: reqwest::Client,
    server_url: String,
    session: Arc<dyn SessionGate>,
    confirmer: Arc<dyn DeleteConfirmer>,
    inner: Mutex<DashboardState>,
    events: broadcast::Sender<DashboardEvent>,
}

impl DashboardClient {
    pub fn new(
        server_url: impl Into<String>,
        session: Arc<dyn SessionGate>,
        confirmer: Arc<dyn DeleteConfirmer>,
    ) -> Result<Self, WorkflowError> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self::new_with_http(http, server_url, session, confirmer))
    }

    pub fn from_settings(
        settings: &Settings,
        session: Arc<dyn SessionGate>,
        confirmer: Arc<dyn DeleteConfirmer>,
    ) -> Result<Self, WorkflowError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()?;
        Ok(Self::new_with_http(
            http,
            settings.server_url.clone(),
            session,
            confirmer,
        ))
    }

    /// Credentialed endpoints identify the user by session cookie; pass the
    /// same `reqwest::Client` the session logged in with so both share a jar.
    pub fn new_with_http(
        http: reqwest::Client,
        server_url: impl Into<String>,
        session: Arc<dyn SessionGate>,
        confirmer: Arc<dyn DeleteConfirmer>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            http,
            server_url: server_url.into(),
            session,
            confirmer,
            inner: Mutex::new(DashboardState::default()),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DashboardEvent> {
        self.events.subscribe()
    }

    pub async fn draft(&self) -> DraftPost {
        self.inner.lock().await.draft.clone()
    }

    pub async fn feed(&self) -> Vec<Post> {
        self.inner.lock().await.feed.clone()
    }

    pub async fn is_feed_loading(&self) -> bool {
        self.inner.lock().await.feed_loading
    }

    pub async fn is_caption_pending(&self) -> bool {
        self.inner.lock().await.caption_inflight
    }

    pub async fn is_submit_pending(&self) -> bool {
        self.inner.lock().await.submit_inflight
    }

    /// Stages a newly selected file. `None` (no file picked) leaves the
    /// draft untouched. A caption only ever describes the image it was
    /// generated from, so both caption fields are cleared on every swap.
    pub async fn select_image(&self, file: Option<ImageUpload>) {
        let Some(upload) = file else {
            return;
        };
        let preview = ImagePreview::from_upload(&upload);
        let mut inner = self.inner.lock().await;
        inner.draft.selected_image = Some(upload);
        inner.draft.preview = Some(preview);
        inner.draft.generated_caption = None;
        inner.draft.custom_caption.clear();
    }

    pub async fn set_custom_caption(&self, caption: impl Into<String>) {
        self.inner.lock().await.draft.custom_caption = caption.into();
    }

    pub async fn clear_draft(&self) {
        self.inner.lock().await.draft = DraftPost::default();
    }

    /// Requests an AI caption for the selected image and initializes the
    /// editable caption from it. Returns `Ok(None)` when a caption request
    /// is already outstanding. On failure the draft is left untouched.
    pub async fn generate_caption(&self) -> Result<Option<String>, WorkflowError> {
        let image = {
            let mut inner = self.inner.lock().await;
            if inner.caption_inflight {
                debug!("caption request already in flight; skipping");
                return Ok(None);
            }
            let image = inner
                .draft
                .selected_image
                .clone()
                .ok_or(WorkflowError::MissingImage)?;
            inner.caption_inflight = true;
            image
        };

        let result = self.request_caption(&image).await;

        let caption = {
            let mut inner = self.inner.lock().await;
            inner.caption_inflight = false;
            match result {
                Ok(caption) => {
                    inner.draft.generated_caption = Some(caption.clone());
                    inner.draft.custom_caption = caption.clone();
                    caption
                }
                Err(err) => {
                    warn!("caption generation failed: {err}");
                    self.emit_failure(ActionKind::GenerateCaption, &err);
                    return Err(err);
                }
            }
        };

        let _ = self.events.send(DashboardEvent::CaptionGenerated {
            caption: caption.clone(),
        });
        Ok(Some(caption))
    }

    /// Publishes the draft. Returns `Ok(false)` when a submission is already
    /// in flight. On success the draft resets to empty and the feed
    /// refetches; on failure the draft is preserved for retry.
    pub async fn create_post(&self) -> Result<bool, WorkflowError> {
        let (image, caption) = {
            let mut inner = self.inner.lock().await;
            if inner.submit_inflight {
                debug!("post submission already in flight; skipping");
                return Ok(false);
            }
            let image = inner
                .draft
                .selected_image
                .clone()
                .ok_or(WorkflowError::MissingImage)?;
            if inner.draft.custom_caption.trim().is_empty() {
                return Err(WorkflowError::EmptyCaption);
            }
            let caption = inner.draft.custom_caption.clone();
            inner.submit_inflight = true;
            (image, caption)
        };

        let result = self.submit_post(&image, &caption).await;

        let created = {
            let mut inner = self.inner.lock().await;
            inner.submit_inflight = false;
            match result {
                Ok(post) => {
                    inner.draft = DraftPost::default();
                    post
                }
                Err(err) => {
                    warn!("post submission failed: {err}");
                    self.emit_failure(ActionKind::CreatePost, &err);
                    return Err(err);
                }
            }
        };

        let _ = self
            .events
            .send(DashboardEvent::PostCreated { post: created });
        let _ = self.fetch_posts().await;
        Ok(true)
    }

    /// Refetches the whole feed and replaces local state with the sorted
    /// result. Skips (returning the current feed) when a fetch is already
    /// running.
    pub async fn fetch_posts(&self) -> Result<Vec<Post>, WorkflowError> {
        {
            let mut inner = self.inner.lock().await;
            if inner.feed_loading {
                debug!("feed fetch already in flight; skipping");
                return Ok(inner.feed.clone());
            }
            inner.feed_loading = true;
        }

        let result = self
            .get_posts(&format!("{}/api/posts", self.server_url))
            .await;

        let posts = {
            let mut inner = self.inner.lock().await;
            inner.feed_loading = false;
            match result {
                Ok(mut posts) => {
                    sort_feed(&mut posts);
                    inner.feed = posts.clone();
                    posts
                }
                Err(err) => {
                    warn!("feed fetch failed: {err}");
                    self.emit_failure(ActionKind::FetchFeed, &err);
                    return Err(err);
                }
            }
        };

        let _ = self.events.send(DashboardEvent::FeedRefreshed {
            posts: posts.clone(),
        });
        Ok(posts)
    }

    /// Posts authored by one user, same shape and ordering as the shared
    /// feed. Does not touch the shared feed state.
    pub async fn fetch_user_posts(&self, user_id: &UserId) -> Result<Vec<Post>, WorkflowError> {
        let mut posts = self
            .get_posts(&format!("{}/api/posts/user/{user_id}", self.server_url))
            .await?;
        sort_feed(&mut posts);
        Ok(posts)
    }

    /// Asks the server to toggle the acting user's like on `post_id`. The
    /// server decides the resulting membership; the local feed changes only
    /// through the follow-up refetch, which runs whether or not the toggle
    /// succeeded. Returns `Ok(false)` when another mutation already holds
    /// this post's lock.
    pub async fn toggle_like(&self, post_id: &PostId) -> Result<bool, WorkflowError> {
        if !self.lock_post_mutation(post_id).await {
            return Ok(false);
        }

        let result: Result<(), WorkflowError> = async {
            let response = self
                .http
                .put(format!("{}/api/posts/{post_id}/like", self.server_url))
                .send()
                .await?;
            check_response(response).await?;
            Ok(())
        }
        .await;

        self.unlock_post_mutation(post_id).await;

        let outcome = match result {
            Ok(()) => Ok(true),
            Err(err) => {
                warn!(post_id = %post_id, "like toggle failed: {err}");
                self.emit_failure(ActionKind::LikePost, &err);
                Err(err)
            }
        };

        let _ = self.fetch_posts().await;
        outcome
    }

    /// Deletes an owned post after an explicit confirmation. A declined
    /// prompt is a no-op, not an error: no request, no event, no state
    /// change. The feed refetches once the request completes whether or not
    /// the server accepted the delete.
    pub async fn delete_post(&self, post_id: &PostId) -> Result<bool, WorkflowError> {
        let post = {
            let inner = self.inner.lock().await;
            inner.feed.iter().find(|p| &p.id == post_id).cloned()
        }
        .ok_or_else(|| WorkflowError::UnknownPost(post_id.clone()))?;

        let current = self
            .session
            .current_user()
            .await
            .ok_or(WorkflowError::SignedOut)?;
        if current.id != post.author.id {
            return Err(WorkflowError::NotPostOwner);
        }

        if !self.confirmer.confirm_delete(&post).await {
            debug!(post_id = %post_id, "delete declined at confirmation prompt");
            return Ok(false);
        }

        if !self.lock_post_mutation(post_id).await {
            return Ok(false);
        }

        let result: Result<(), WorkflowError> = async {
            let response = self
                .http
                .delete(format!("{}/api/posts/{post_id}", self.server_url))
                .send()
                .await?;
            check_response(response).await?;
            Ok(())
        }
        .await;

        self.unlock_post_mutation(post_id).await;

        let outcome = match result {
            Ok(()) => {
                let _ = self.events.send(DashboardEvent::PostDeleted {
                    post_id: post_id.clone(),
                });
                Ok(true)
            }
            Err(err) => {
                warn!(post_id = %post_id, "delete failed: {err}");
                self.emit_failure(ActionKind::DeletePost, &err);
                Err(err)
            }
        };

        let _ = self.fetch_posts().await;
        outcome
    }

    async fn request_caption(&self, image: &ImageUpload) -> Result<String, WorkflowError> {
        let form = multipart::Form::new().part("image", image_part(image)?);
        let response = self
            .http
            .post(format!("{}/api/caption", self.server_url))
            .multipart(form)
            .send()
            .await?;
        let body: CaptionResponse = check_response(response).await?.json().await?;
        Ok(body.caption)
    }

    async fn submit_post(
        &self,
        image: &ImageUpload,
        caption: &str,
    ) -> Result<Post, WorkflowError> {
        let form = multipart::Form::new()
            .part("image", image_part(image)?)
            .text("caption", caption.to_string());
        let response = self
            .http
            .post(format!("{}/api/posts", self.server_url))
            .multipart(form)
            .send()
            .await?;
        let post = check_response(response).await?.json().await?;
        Ok(post)
    }

    async fn get_posts(&self, url: &str) -> Result<Vec<Post>, WorkflowError> {
        let response = self.http.get(url).send().await?;
        let posts = check_response(response).await?.json().await?;
        Ok(posts)
    }

    // Like and delete on the same post share one lock so overlapping
    // mutations cannot leave the server and the resync disagreeing about
    // which request ran last.
    async fn lock_post_mutation(&self, post_id: &PostId) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.post_mutations_inflight.contains(post_id) {
            debug!(post_id = %post_id, "mutation already in flight for post; skipping");
            return false;
        }
        inner.post_mutations_inflight.insert(post_id.clone());
        true
    }

    async fn unlock_post_mutation(&self, post_id: &PostId) {
        self.inner
            .lock()
            .await
            .post_mutations_inflight
            .remove(post_id);
    }

    fn emit_failure(&self, action: ActionKind, err: &WorkflowError) {
        let _ = self.events.send(DashboardEvent::ActionFailed {
            action,
            detail: err.to_string(),
        });
    }
}

fn image_part(image: &ImageUpload) -> Result<multipart::Part, WorkflowError> {
    let part = multipart::Part::bytes(image.bytes.clone()).file_name(image.filename.clone());
    Ok(match &image.mime_type {
        Some(mime) => part.mime_str(mime)?,
        None => part,
    })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
