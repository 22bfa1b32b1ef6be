//! Transport wiring: builds the tonic router around a [`DirectoryService`]
//! and runs it on any stream of incoming connections.

use crate::server::{service::handler::DirectoryService, store::DirectoryStore};
use futures::Stream;
use tokio::io::{AsyncRead, AsyncWrite};
use tonic::{
    codec::CompressionEncoding,
    transport::{Server, server::Connected},
};
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use userhub_tonic_core::proto::{FILE_DESCRIPTOR_SET, user_service_server::UserServiceServer};

/// Wraps the service with compression support in both directions.
pub fn build_user_service<S: DirectoryStore>(
    service: DirectoryService<S>,
) -> UserServiceServer<DirectoryService<S>> {
    UserServiceServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

/// Serves `service` (plus health, reflection and gRPC-Web) on `incoming`
/// until `signal` resolves.
///
/// When `signal` fires, the health status flips to `NOT_SERVING` and the
/// service drains and cancels its in-flight calls before the transport
/// closes.
pub async fn serve_with_incoming<S, I, IO, IE, F>(
    service: DirectoryService<S>,
    incoming: I,
    signal: F,
) -> anyhow::Result<()>
where
    S: DirectoryStore,
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
    F: Future<Output = ()>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<UserServiceServer<DirectoryService<S>>>()
        .await;

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let shutdown = {
        let service = service.clone();
        async move {
            signal.await;

            #[cfg(feature = "tracing")]
            tracing::info!("Shutdown signal received, terminating gracefully...");

            // 1. Publish the status
            health_reporter
                .set_not_serving::<UserServiceServer<DirectoryService<S>>>()
                .await;

            // 2. Drain, then cancel, in-flight calls
            service.shutdown().await;
        }
    };

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new()),
        )
        .add_service(health_service)
        .add_service(reflection)
        .add_service(build_user_service(service))
        .serve_with_incoming_shutdown(incoming, shutdown)
        .await?;

    #[cfg(feature = "tracing")]
    tracing::info!("Service shut down successfully");
    Ok(())
}
