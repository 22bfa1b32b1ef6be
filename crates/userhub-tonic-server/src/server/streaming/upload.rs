//! Client-streaming upload aggregation for `UploadUserData`.
//!
//! A session moves `AwaitingMetadata -> ReceivingChunks` on the metadata
//! fragment and stays in `ReceivingChunks` for every chunk. End of input
//! finalizes it into an [`UploadResult`]; any error aborts it and the partial
//! counts are dropped with the session.
//!
//! By default the session is as permissive as the wire protocol: chunks may
//! arrive before metadata, metadata may be repeated, and chunk numbers are
//! not checked. [`UploadPolicy`] tightens both rules.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tonic::Status;
use userhub_tonic_core::{
    Error, Result,
    proto::{UploadUserDataRequest, UploadUserDataResponse, upload_user_data_request::Data},
    types::upload_id,
};

/// One unit of an upload stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Metadata {
        user_id: String,
        filename: String,
        /// Advisory; never compared with the bytes received.
        total_size: i64,
    },
    Chunk {
        data: Bytes,
        chunk_number: i32,
    },
}

impl TryFrom<UploadUserDataRequest> for Fragment {
    type Error = Error;

    fn try_from(req: UploadUserDataRequest) -> Result<Self> {
        match req.data {
            Some(Data::Metadata(meta)) => Ok(Self::Metadata {
                user_id: meta.user_id,
                filename: meta.filename,
                total_size: meta.total_size,
            }),
            Some(Data::Chunk(chunk)) => Ok(Self::Chunk {
                data: chunk.data,
                chunk_number: chunk.chunk_number,
            }),
            None => Err(Error::invalid("unrecognized fragment kind")),
        }
    }
}

/// Ordering rules enforced on an upload stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadPolicy {
    /// Metadata must come first, exactly once.
    pub require_metadata: bool,
    /// Each chunk number must be one greater than the previous one.
    pub strict_chunk_order: bool,
}

/// Outcome of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub upload_id: String,
    pub bytes_received: u64,
    pub chunk_count: u64,
    pub success: bool,
}

impl From<UploadResult> for UploadUserDataResponse {
    fn from(result: UploadResult) -> Self {
        Self {
            upload_id: result.upload_id,
            bytes_received: result.bytes_received as i64,
            success: result.success,
            chunk_count: result.chunk_count as i64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingMetadata,
    ReceivingChunks,
}

/// What the metadata fragment announced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declared {
    pub user_id: String,
    pub filename: String,
    pub total_size: i64,
}

/// Accumulates one upload stream.
#[derive(Debug)]
pub struct UploadSession {
    policy: UploadPolicy,
    declared: Option<Declared>,
    bytes_received: u64,
    chunk_count: u64,
    last_chunk_number: Option<i32>,
}

impl UploadSession {
    pub const fn new(policy: UploadPolicy) -> Self {
        Self {
            policy,
            declared: None,
            bytes_received: 0,
            chunk_count: 0,
            last_chunk_number: None,
        }
    }

    pub const fn state(&self) -> SessionState {
        if self.declared.is_some() {
            SessionState::ReceivingChunks
        } else {
            SessionState::AwaitingMetadata
        }
    }

    pub const fn declared(&self) -> Option<&Declared> {
        self.declared.as_ref()
    }

    pub const fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub const fn chunk_count(&self) -> u64 {
        self.chunk_count
    }

    /// Applies one fragment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] when the fragment violates the
    /// session's [`UploadPolicy`]. The session must not be finished after an
    /// error.
    pub fn accept(&mut self, fragment: Fragment) -> Result<()> {
        match fragment {
            Fragment::Metadata {
                user_id,
                filename,
                total_size,
            } => {
                if self.policy.require_metadata && self.declared.is_some() {
                    return Err(Error::invalid("metadata fragment sent more than once"));
                }

                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "Receiving upload for user {user_id}, file: {filename}, size: {total_size} bytes"
                );

                self.declared = Some(Declared {
                    user_id,
                    filename,
                    total_size,
                });
            }
            Fragment::Chunk { data, chunk_number } => {
                if self.policy.require_metadata && self.declared.is_none() {
                    return Err(Error::invalid("chunk received before metadata"));
                }

                if self.policy.strict_chunk_order {
                    if let Some(prev) = self.last_chunk_number {
                        let expected = prev.checked_add(1);
                        if expected != Some(chunk_number) {
                            return Err(Error::invalid(format!(
                                "chunk {chunk_number} out of order, expected {}",
                                i64::from(prev) + 1
                            )));
                        }
                    }
                }

                self.last_chunk_number = Some(chunk_number);
                self.bytes_received += data.len() as u64;
                self.chunk_count += 1;

                #[cfg(feature = "tracing")]
                tracing::trace!(
                    "Received chunk #{chunk_number}: {} bytes (total: {})",
                    data.len(),
                    self.bytes_received
                );
            }
        }

        Ok(())
    }

    /// Finalizes the session, stamping the upload id with the current time.
    ///
    /// # Errors
    ///
    /// See [`UploadSession::finish_at`].
    pub fn finish(self) -> Result<UploadResult> {
        self.finish_at(SystemTime::now())
    }

    /// Finalizes the session as if it completed at `completed_at`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if metadata is required and was
    /// never sent.
    pub fn finish_at(self, completed_at: SystemTime) -> Result<UploadResult> {
        if self.policy.require_metadata && self.declared.is_none() {
            return Err(Error::invalid("upload ended before metadata was sent"));
        }

        let user_id = self
            .declared
            .as_ref()
            .map(|d| d.user_id.as_str())
            .unwrap_or_default();
        let unix_secs = completed_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        #[cfg(feature = "tracing")]
        {
            if let Some(declared) = &self.declared {
                tracing::debug!(
                    "Upload of {} for {} finished: {} of {} declared bytes in {} chunks",
                    declared.filename,
                    declared.user_id,
                    self.bytes_received,
                    declared.total_size,
                    self.chunk_count
                );
            }
        }

        Ok(UploadResult {
            upload_id: upload_id(user_id, unix_secs),
            bytes_received: self.bytes_received,
            chunk_count: self.chunk_count,
            success: true,
        })
    }
}

/// Drains `source` into a fresh [`UploadSession`] and finalizes it.
///
/// Fragments are applied strictly in arrival order. Waiting for the next
/// fragment is raced against `cancel`.
///
/// # Errors
///
/// - [`Error::InvalidRequest`] for an unrecognized fragment or a policy
///   violation.
/// - [`Error::Transport`] if the source yields an error.
/// - [`Error::RequestCancelled`] if `cancel` fires first.
///
/// No partial result is produced on any error.
pub async fn aggregate<S>(
    mut source: S,
    policy: UploadPolicy,
    cancel: &CancellationToken,
) -> Result<UploadResult>
where
    S: Stream<Item = core::result::Result<UploadUserDataRequest, Status>> + Unpin,
{
    let mut session = UploadSession::new(policy);

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::RequestCancelled),
            next = source.next() => next,
        };

        match next {
            Some(Ok(req)) => session.accept(Fragment::try_from(req)?)?,
            Some(Err(status)) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Error receiving data: {status}");
                return Err(Error::Transport {
                    context: status.message().to_string(),
                });
            }
            None => return session.finish(),
        }
    }
}
