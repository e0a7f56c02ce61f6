//! Upload phase for captured photos and signatures.

use tokio_util::sync::CancellationToken;

use crate::models::{BinaryItem, BinaryKind, BinaryStatus, HttpMethod, OperationKind};
use crate::Result;

use super::connectivity::Connectivity;
use super::dispatch::{classify, Dispatcher, Outcome, RemoteRequest, RequestBody};
use super::engine::SyncEngine;
use super::events::SyncEvent;
use super::result::{SyncError, SyncErrorKind, SyncResult};

/// Upload endpoint for a capture, under its parent record.
#[must_use]
pub fn upload_url(item: &BinaryItem) -> String {
    format!(
        "{}/{}/{}",
        item.parent.entity.path(),
        urlencoding::encode(&item.parent.id),
        item.kind.upload_segment()
    )
}

impl<D, C> SyncEngine<D, C>
where
    D: Dispatcher,
    C: Connectivity,
{
    /// Upload pending and previously failed captures.
    ///
    /// Shares the single-flight guard with `sync()`, so it never overlaps a
    /// drain cycle. Captures over the retry limit are reported, not sent.
    pub async fn upload_media(&self) -> SyncResult {
        let Some((_guard, token)) = self.begin_cycle() else {
            tracing::debug!("Sync already in progress");
            return SyncResult::default();
        };

        if !self.connectivity.is_online() {
            let error = SyncError::offline();
            self.emit(SyncEvent::SyncError {
                error: error.clone(),
            });
            return SyncResult {
                errors: vec![error],
                ..SyncResult::default()
            };
        }

        match self.drain_media(&token).await {
            Ok(result) => result,
            Err(error) => self.storage_failure(&error),
        }
    }

    async fn drain_media(&self, token: &CancellationToken) -> Result<SyncResult> {
        let mut result = SyncResult::default();

        'kinds: for kind in BinaryKind::ALL {
            let mut items = self
                .store
                .list_binaries_by_status(kind, BinaryStatus::Pending)
                .await?;
            items.extend(
                self.store
                    .list_binaries_by_status(kind, BinaryStatus::Failed)
                    .await?,
            );
            items.sort_by_key(|item| item.captured_at);

            for item in items {
                if token.is_cancelled() {
                    result.aborted = true;
                    break 'kinds;
                }
                if !self.connectivity.is_online() {
                    result.errors.push(SyncError::offline());
                    result.aborted = true;
                    break 'kinds;
                }

                if item.retry_count >= self.max_retries {
                    let error = SyncError::for_capture(
                        &item,
                        SyncErrorKind::MaxRetriesExceeded,
                        format!(
                            "{kind} upload gave up after {} attempts",
                            item.retry_count
                        ),
                        false,
                    );
                    self.emit(SyncEvent::MediaFailed {
                        kind,
                        error: error.clone(),
                    });
                    result.fail(error);
                    continue;
                }

                if item.retry_count > 0 && !self.wait_backoff(item.retry_count, token).await {
                    result.aborted = true;
                    break 'kinds;
                }

                self.upload_one(&item, &mut result).await?;
            }
        }

        tracing::info!(
            "Media upload finished: {} uploaded, {} failed",
            result.success,
            result.failed
        );
        Ok(result)
    }

    async fn upload_one(&self, item: &BinaryItem, result: &mut SyncResult) -> Result<()> {
        let kind = item.kind;
        self.store
            .transition_binary(kind, &item.id, BinaryStatus::Uploading, None)
            .await?;

        let request = RemoteRequest {
            method: HttpMethod::Post,
            url: upload_url(item),
            body: RequestBody::Binary {
                bytes: item.data.clone(),
                content_type: item.mime_type.clone(),
            },
        };

        let failure = match self.dispatcher.send(request).await {
            Ok(response) => match classify(OperationKind::Create, &response) {
                Outcome::Success => None,
                Outcome::Failure {
                    kind: error_kind,
                    message,
                    retryable,
                } => Some(SyncError::for_capture(item, error_kind, message, retryable)),
                Outcome::NotFoundOnDelete | Outcome::Conflict(_) => Some(SyncError::for_capture(
                    item,
                    SyncErrorKind::TerminalClientError,
                    format!("HTTP {}", response.status),
                    false,
                )),
            },
            Err(error) => Some(SyncError::for_capture(
                item,
                SyncErrorKind::NetworkTransient,
                error.to_string(),
                true,
            )),
        };

        match failure {
            None => {
                self.store
                    .transition_binary(kind, &item.id, BinaryStatus::Uploaded, None)
                    .await?;
                tracing::debug!("Uploaded {kind} {}", item.id);
                self.emit(SyncEvent::MediaUploaded {
                    item_id: item.id.to_string(),
                    kind,
                });
                result.success += 1;
            }
            Some(error) => {
                self.store
                    .transition_binary(
                        kind,
                        &item.id,
                        BinaryStatus::Failed,
                        Some(error.message.clone()),
                    )
                    .await?;
                tracing::warn!("Upload of {kind} {} failed: {}", item.id, error.message);
                self.emit(SyncEvent::MediaFailed {
                    kind,
                    error: error.clone(),
                });
                result.fail(error);
            }
        }
        Ok(())
    }
}
