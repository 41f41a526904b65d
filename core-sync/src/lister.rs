//! # Collection Lister
//!
//! Drains a paginated listing into one complete item set. A listing either
//! returns every item or fails; partial listings would make the differ
//! schedule deletes for items it simply never saw.

use crate::error::{Result, SyncError};
use crate::retry::RetryPolicy;
use bridge_traits::{BridgeError, MediaItem, RemoteCollectionClient};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Default)]
pub struct CollectionLister {
    retry: RetryPolicy,
}

impl CollectionLister {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// List every item in `client`'s collection.
    ///
    /// Rate-limited and transient page failures are retried under the
    /// lister's policy. Auth failures, permanent failures and exhausted
    /// retries fail the whole call.
    #[instrument(skip(self, client, cancel), fields(account = %client.label()))]
    pub async fn list_all(
        &self,
        client: &dyn RemoteCollectionClient,
        cancel: &CancellationToken,
    ) -> Result<Vec<MediaItem>> {
        let account = client.label();
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        let mut seen_tokens: HashSet<String> = HashSet::new();
        let mut pages = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let token = page_token.clone();
            let outcome = self
                .retry
                .run("list_page", cancel, move || {
                    client.list_page(token.clone())
                })
                .await;
            let page = outcome
                .result
                .map_err(|e| SyncError::from_listing(account, e))?;

            pages += 1;
            debug!(
                page = pages,
                items = page.items.len(),
                attempts = outcome.attempts,
                "Fetched page"
            );
            items.extend(page.items);

            match page.next_page_token {
                None => break,
                // A token seen before means the remote is cycling.
                Some(next) if !seen_tokens.insert(next.clone()) => {
                    return Err(SyncError::from_listing(
                        account,
                        BridgeError::Permanent(format!(
                            "page token did not advance after page {}",
                            pages
                        )),
                    ));
                }
                Some(next) => page_token = Some(next),
            }
        }

        info!(items = items.len(), pages, "Listing complete");
        Ok(items)
    }
}
