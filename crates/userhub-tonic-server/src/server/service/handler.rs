//! gRPC service implementation for the user directory and notification feed.
//!
//! This module defines [`DirectoryService`], the concrete implementation of
//! the [`UserService`] gRPC service defined in `userhub.proto`. It
//! is the only layer that knows about `tonic::Status`; everything below it
//! reports [`Error`] values which are converted here.
//!
//! ## Responsibilities
//!
//! - Validate every request before touching the store.
//! - Allocate ids and persist users through the [`DirectoryStore`].
//! - Run the notification feed on its own task, bound to the response channel
//!   and the call's cancellation token.
//! - Drain client upload streams into a single result.
//! - Refuse new calls once graceful shutdown has begun.

use crate::server::{
    config::ServerConfig,
    service::{
        deadline::{call_token, request_deadline},
        lifecycle::Lifecycle,
    },
    store::{DirectoryStore, InMemoryStore},
    streaming::{
        feed::{self, FeedInterrupted},
        sleep::TokioSleep,
        upload,
    },
    telemetry::{
        decrement_streams_inflight, increment_notifications_sent, increment_requests,
        increment_stream_errors, increment_streams_inflight, increment_users_created,
        record_stream_duration, record_upload_bytes,
    },
};
use core::pin::Pin;
use futures::TryStreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tonic::{Request, Response, Status, Streaming};
use userhub_tonic_core::{
    Error,
    proto::{
        CreateUserRequest, CreateUserResponse, GetUserRequest, GetUserResponse, Notification,
        StreamNotificationsRequest, UploadUserDataRequest, UploadUserDataResponse, User,
        UserStatus, user_service_server::UserService,
    },
};

/// Directory and notification service, generic over its storage backend.
///
/// Cloning is cheap: clones share the store and the lifecycle state, which is
/// how `main` keeps a handle for shutdown after registering the service.
pub struct DirectoryService<S = InMemoryStore> {
    config: ServerConfig,
    store: Arc<S>,
    lifecycle: Arc<Lifecycle>,
}

impl<S> Clone for DirectoryService<S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }
}

impl DirectoryService<InMemoryStore> {
    /// Creates a service backed by a fresh [`InMemoryStore`].
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, InMemoryStore::new())
    }
}

impl<S: DirectoryStore> DirectoryService<S> {
    pub fn with_store(config: ServerConfig, store: S) -> Self {
        Self {
            config,
            store: Arc::new(store),
            lifecycle: Arc::new(Lifecycle::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// Initiates a graceful shutdown.
    ///
    /// New calls are refused immediately; running calls get
    /// `config.shutdown_timeout` to finish before they are cancelled.
    pub async fn shutdown(&self) {
        self.lifecycle.shutdown(self.config.shutdown_timeout).await;
    }

    /// Maps a cancellation caused by shutdown onto `Unavailable`.
    fn classify(&self, err: Error) -> Status {
        match err {
            Error::RequestCancelled if self.lifecycle.is_shutting_down() => {
                Error::ServiceShutdown.into()
            }
            other => other.into(),
        }
    }
}

#[tonic::async_trait]
impl<S: DirectoryStore> UserService for DirectoryService<S> {
    type StreamNotificationsStream =
        Pin<Box<dyn Stream<Item = Result<Notification, Status>> + Send>>;

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(name = %req.get_ref().name)))]
    async fn create_user(
        &self,
        req: Request<CreateUserRequest>,
    ) -> Result<Response<CreateUserResponse>, Status> {
        let _guard = self.lifecycle.begin()?;
        increment_requests("CreateUser");

        let CreateUserRequest { name, email, age } = req.into_inner();

        if name.is_empty() {
            return Err(Error::invalid("name is required").into());
        }
        if email.is_empty() {
            return Err(Error::invalid("email is required").into());
        }

        let user = User {
            user_id: self.store.next_id(),
            name,
            email,
            age,
            status: UserStatus::Unspecified as i32,
        };
        self.store.put(user.clone());
        increment_users_created();

        #[cfg(feature = "tracing")]
        tracing::info!("User created successfully: {}", user.user_id);

        Ok(Response::new(CreateUserResponse { user: Some(user) }))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(user_id = %req.get_ref().user_id)))]
    async fn get_user(
        &self,
        req: Request<GetUserRequest>,
    ) -> Result<Response<GetUserResponse>, Status> {
        let _guard = self.lifecycle.begin()?;
        increment_requests("GetUser");

        let user_id = req.into_inner().user_id;
        if user_id.is_empty() {
            return Err(Error::invalid("user_id is required").into());
        }

        let user = self.store.get(&user_id)?;
        Ok(Response::new(GetUserResponse { user: Some(user) }))
    }

    /// Streams the notification feed for one user.
    ///
    /// The feed runs on a spawned task that owns the call guard. Dropping the
    /// response stream (client disconnect), the client deadline, and service
    /// shutdown all cancel the feed through the call token.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(user_id = %req.get_ref().user_id)))]
    async fn stream_notifications(
        &self,
        req: Request<StreamNotificationsRequest>,
    ) -> Result<Response<Self::StreamNotificationsStream>, Status> {
        let start = std::time::Instant::now();
        let guard = self.lifecycle.begin()?;
        increment_requests("StreamNotifications");

        let deadline = request_deadline(req.metadata());
        let subject = req.into_inner().user_id;
        if subject.is_empty() {
            increment_stream_errors();
            return Err(Error::invalid("user_id is required").into());
        }

        increment_streams_inflight();

        let (mut resp_tx, resp_rx) =
            mpsc::channel::<Result<Notification, Status>>(self.config.stream_buffer_size);
        let (token, token_guard) = call_token(self.lifecycle.child_token(), deadline);
        let feed_config = self.config.feed.clone();
        let service = self.clone();

        let fut = async move {
            let _guard = guard;
            let _token_guard = token_guard;

            let probe = resp_tx.clone();
            let outcome = {
                let mut feed = core::pin::pin!(feed::generate::<_, TokioSleep>(
                    &subject,
                    &mut resp_tx,
                    &token,
                    &feed_config,
                ));
                tokio::select! {
                    outcome = &mut feed => outcome,
                    () = probe.closed() => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("Client disconnected from feed for {subject}");
                        token.cancel();
                        feed.await
                    }
                }
            };
            drop(probe);

            match outcome {
                Ok(_emitted) => {
                    #[cfg(feature = "tracing")]
                    tracing::info!("Finished streaming {_emitted} notifications for {subject}");
                }
                Err(FeedInterrupted { emitted: _emitted, source }) => {
                    increment_stream_errors();
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Feed for {subject} stopped after {_emitted}: {source}");

                    // Best effort: the client may already be gone.
                    let status = service.classify(source);
                    if let Err(_e) = resp_tx.send(Err(status)).await {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("Failed to forward feed error: {_e}");
                    }
                }
            }

            decrement_streams_inflight();
            record_stream_duration(start.elapsed().as_millis() as f64);
        };
        #[cfg(feature = "tracing")]
        let fut = {
            use tracing::Instrument;
            let span = tracing::info_span!("streaming");
            fut.instrument(span)
        };

        tokio::spawn(fut);

        let stream = ReceiverStream::new(resp_rx)
            .inspect_ok(|_| increment_notifications_sent(1))
            .inspect_err(|_e| {
                #[cfg(feature = "tracing")]
                tracing::debug!("Feed ended with status: {_e}");
            });

        Ok(Response::new(Box::pin(stream)))
    }

    /// Aggregates a client upload stream into a single result.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn upload_user_data(
        &self,
        req: Request<Streaming<UploadUserDataRequest>>,
    ) -> Result<Response<UploadUserDataResponse>, Status> {
        let _guard = self.lifecycle.begin()?;
        increment_requests("UploadUserData");

        let deadline = request_deadline(req.metadata());
        let (token, _token_guard) = call_token(self.lifecycle.child_token(), deadline);

        let result = upload::aggregate(req.into_inner(), self.config.upload, &token)
            .await
            .map_err(|e| {
                increment_stream_errors();
                self.classify(e)
            })?;

        record_upload_bytes(result.bytes_received as f64);

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Upload {} finished: {} bytes in {} chunks",
            result.upload_id,
            result.bytes_received,
            result.chunk_count
        );

        Ok(Response::new(result.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use tokio_stream::StreamExt;
    use tonic::Code;

    fn fast_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.feed.interval = Duration::from_millis(1);
        config
    }

    fn create(name: &str, email: &str, age: u32) -> Request<CreateUserRequest> {
        Request::new(CreateUserRequest {
            name: name.to_string(),
            email: email.to_string(),
            age,
        })
    }

    fn get(user_id: &str) -> Request<GetUserRequest> {
        Request::new(GetUserRequest {
            user_id: user_id.to_string(),
        })
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let service = DirectoryService::new(fast_config());

        let created = service
            .create_user(create("Ada", "ada@example.com", 36))
            .await
            .unwrap()
            .into_inner()
            .user
            .unwrap();

        assert_eq!(created.user_id, "user_1");
        assert_eq!(created.status, UserStatus::Unspecified as i32);

        let fetched = service
            .get_user(get(&created.user_id))
            .await
            .unwrap()
            .into_inner()
            .user
            .unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let service = DirectoryService::new(fast_config());
        service
            .create_user(create("Ada", "ada@example.com", 36))
            .await
            .unwrap();

        let status = service.get_user(get("non-existing-user-id")).await.unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn invalid_arguments_never_touch_the_store() {
        let service = DirectoryService::new(fast_config());

        let cases = [create("", "a@example.com", 1), create("Ada", "", 1)];
        for req in cases {
            let status = service.create_user(req).await.unwrap_err();
            assert_eq!(status.code(), Code::InvalidArgument);
        }
        let status = service.get_user(get("")).await.unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);

        assert!(service.store().is_empty());
        assert_eq!(service.lifecycle().inflight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_creates_get_distinct_ids() {
        let service = DirectoryService::new(fast_config());

        let tasks: Vec<_> = (0..100)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .create_user(create(&format!("u{i}"), "u@example.com", i))
                        .await
                        .unwrap()
                        .into_inner()
                        .user
                        .unwrap()
                        .user_id
                })
            })
            .collect();

        let ids = futures::future::try_join_all(tasks).await.unwrap();
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 100);
        assert_eq!(service.store().len(), 100);
    }

    #[tokio::test]
    async fn stream_delivers_ten_notifications() {
        let service = DirectoryService::new(fast_config());

        let stream = service
            .stream_notifications(Request::new(StreamNotificationsRequest {
                user_id: "user_1".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();

        let items: Vec<_> = stream.collect().await;
        let ids: Vec<String> = items
            .into_iter()
            .map(|item| item.unwrap().notification_id)
            .collect();
        let expected: Vec<String> = (1..=10).map(|i| format!("notif_{i}")).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn stream_rejects_empty_subject() {
        let service = DirectoryService::new(fast_config());

        let result = service
            .stream_notifications(Request::new(StreamNotificationsRequest {
                user_id: String::new(),
            }))
            .await;

        match result {
            Err(status) => assert_eq!(status.code(), Code::InvalidArgument),
            Ok(_) => panic!("expected InvalidArgument"),
        }
    }

    #[tokio::test]
    async fn dropping_the_stream_stops_the_feed() {
        let mut config = fast_config();
        config.feed.interval = Duration::from_secs(3600);
        let service = DirectoryService::new(config);

        let mut stream = service
            .stream_notifications(Request::new(StreamNotificationsRequest {
                user_id: "user_1".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.notification_id, "notif_1");
        drop(stream);

        tokio::time::timeout(Duration::from_secs(5), async {
            while service.lifecycle().inflight() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("feed task did not stop after the client went away");
    }

    #[tokio::test]
    async fn shutdown_cancels_running_feeds() {
        let mut config = fast_config();
        config.feed.interval = Duration::from_secs(3600);
        config.shutdown_timeout = Duration::from_millis(50);
        let service = DirectoryService::new(config);

        let mut stream = service
            .stream_notifications(Request::new(StreamNotificationsRequest {
                user_id: "user_1".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(stream.next().await.unwrap().is_ok());

        service.shutdown().await;

        let status = stream.next().await.unwrap().unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
        assert!(stream.next().await.is_none());

        let status = service.get_user(get("user_1")).await.unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
    }
}
