//! Walks through every call shape of the `userhub` service against a running
//! server: two unary calls, an expected NotFound, a server stream and a
//! client stream.

use bytes::Bytes;
use std::time::Duration;
use tokio_stream::StreamExt;
use tonic::{Code, Request, transport::Channel};
use userhub_tonic_core::proto::{
    CreateUserRequest, GetUserRequest, StreamNotificationsRequest, UploadChunk, UploadMetadata,
    UploadUserDataRequest, upload_user_data_request::Data, user_service_client::UserServiceClient,
};

const CHUNK_SIZE: usize = 1000;
const CHUNKS: usize = 5;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let _ = dotenvy::dotenv();
    let addr =
        std::env::var("USERHUB_ADDR").unwrap_or_else(|_| String::from("http://127.0.0.1:50051"));

    let channel = Channel::from_shared(addr)?.connect().await?;
    let mut client = UserServiceClient::new(channel);
    println!("Connected to gRPC server");

    let mut req = Request::new(CreateUserRequest {
        name: "Ruffy G".to_string(),
        email: "ruffy@example.com".to_string(),
        age: 30,
    });
    req.set_timeout(Duration::from_secs(5));
    let user = client
        .create_user(req)
        .await?
        .into_inner()
        .user
        .ok_or("server returned no user")?;
    println!("User created: {user:?}");

    let mut req = Request::new(GetUserRequest {
        user_id: user.user_id.clone(),
    });
    req.set_timeout(Duration::from_secs(5));
    let fetched = client.get_user(req).await?.into_inner().user;
    println!("User retrieved: {fetched:?}");

    match client
        .get_user(GetUserRequest {
            user_id: "non-existing-user-id".to_string(),
        })
        .await
    {
        Err(status) if status.code() == Code::NotFound => {
            println!("Expected error for non-existing user: {}", status.message());
        }
        Err(status) => return Err(status.into()),
        Ok(resp) => println!("Unexpectedly found user: {:?}", resp.into_inner().user),
    }

    println!("\n=== Server-side streaming ===");
    let mut req = Request::new(StreamNotificationsRequest {
        user_id: user.user_id.clone(),
    });
    req.set_timeout(Duration::from_secs(15));
    let mut stream = client.stream_notifications(req).await?.into_inner();
    while let Some(notification) = stream.next().await {
        let notification = notification?;
        println!(
            "Received: [{}] {} - {}",
            notification.notification_id, notification.title, notification.message
        );
    }
    println!("Stream closed by server");

    println!("\n=== Client-side streaming ===");
    let mut fragments = vec![UploadUserDataRequest {
        data: Some(Data::Metadata(UploadMetadata {
            user_id: user.user_id.clone(),
            filename: "profile.bin".to_string(),
            total_size: (CHUNK_SIZE * CHUNKS) as i64,
        })),
    }];
    fragments.extend((1..=CHUNKS).map(|n| UploadUserDataRequest {
        data: Some(Data::Chunk(UploadChunk {
            data: Bytes::from(vec![b'x'; CHUNK_SIZE]),
            chunk_number: n as i32,
        })),
    }));

    let result = client
        .upload_user_data(tokio_stream::iter(fragments))
        .await?
        .into_inner();
    println!(
        "Upload {}: {} bytes in {} chunks (success: {})",
        result.upload_id, result.bytes_received, result.chunk_count, result.success
    );

    Ok(())
}
