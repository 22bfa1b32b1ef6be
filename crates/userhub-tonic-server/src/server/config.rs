use crate::server::streaming::{feed::FeedConfig, upload::UploadPolicy};
use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use userhub_tonic_core::types::{DEFAULT_NOTIFICATION_COUNT, DEFAULT_NOTIFICATION_INTERVAL};

/// Runtime configuration for the `userhub-tonic-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "userhub-tonic-server",
    version,
    about = "A gRPC directory and notification service"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix
    /// socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/userhub.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be
    /// a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Number of notifications delivered by each `StreamNotifications` call.
    ///
    /// Environment variable: `NOTIFICATION_COUNT`
    #[arg(long, env = "NOTIFICATION_COUNT", default_value_t = DEFAULT_NOTIFICATION_COUNT)]
    pub notification_count: usize,

    /// Pause between two notifications, in milliseconds.
    ///
    /// Environment variable: `NOTIFICATION_INTERVAL_MS`
    #[arg(
        long,
        env = "NOTIFICATION_INTERVAL_MS",
        default_value_t = DEFAULT_NOTIFICATION_INTERVAL.as_millis() as u64
    )]
    pub notification_interval_ms: u64,

    /// Capacity of the channel between the feed task and the gRPC response
    /// stream.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Seconds to wait for in-flight streams to drain on shutdown before
    /// cancelling them.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,

    /// Reject uploads whose first fragment is not metadata, that repeat the
    /// metadata fragment, or that end without any metadata.
    ///
    /// Environment variable: `REQUIRE_UPLOAD_METADATA`
    #[arg(long, env = "REQUIRE_UPLOAD_METADATA", default_value_t = false)]
    pub require_upload_metadata: bool,

    /// Reject uploads whose chunk numbers are not consecutive.
    ///
    /// Environment variable: `STRICT_CHUNK_ORDER`
    #[arg(long, env = "STRICT_CHUNK_ORDER", default_value_t = false)]
    pub strict_chunk_order: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub feed: FeedConfig,
    pub upload: UploadPolicy,
    pub stream_buffer_size: usize,
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: String::from("0.0.0.0:50051"),
            uds: false,
            feed: FeedConfig::default(),
            upload: UploadPolicy::default(),
            stream_buffer_size: 8,
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.notification_count == 0 {
            bail!("NOTIFICATION_COUNT must be greater than 0");
        }

        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if args.server_addr.is_empty() {
            bail!("SERVER_ADDR must not be empty");
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            feed: FeedConfig {
                count: args.notification_count,
                interval: Duration::from_millis(args.notification_interval_ms),
            },
            upload: UploadPolicy {
                require_metadata: args.require_upload_metadata,
                strict_chunk_order: args.strict_chunk_order,
            },
            stream_buffer_size: args.stream_buffer_size,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let mut argv = vec!["userhub-tonic-server"];
        argv.extend_from_slice(args);
        ServerConfig::try_from(CliArgs::try_parse_from(argv)?)
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.feed.count, 10);
        assert_eq!(config.feed.interval, Duration::from_secs(1));
        assert!(!config.upload.require_metadata);
        assert!(!config.upload.strict_chunk_order);
        assert!(!config.uds);
    }

    #[test]
    fn upload_policy_flags_are_wired_through() {
        let config = parse(&["--require-upload-metadata", "--strict-chunk-order"]).unwrap();
        assert!(config.upload.require_metadata);
        assert!(config.upload.strict_chunk_order);
    }

    #[test]
    fn rejects_zero_notification_count() {
        let err = parse(&["--notification-count", "0"]).unwrap_err();
        assert!(err.to_string().contains("NOTIFICATION_COUNT"));
    }

    #[test]
    fn rejects_zero_stream_buffer() {
        assert!(parse(&["--stream-buffer-size", "0"]).is_err());
    }
}
