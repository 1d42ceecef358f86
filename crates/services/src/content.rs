//! # Content Service
//!
//! Owner-checked removal of a content item and its stored media.

use std::sync::Arc;

use domains::{Condition, ContentItem, DocumentStore, DomainError, ItemKey, ObjectStore, Result, StoreError};
use tracing::{error, info, instrument};

use crate::tables::{from_document, CONTENT, OWNER_EMAIL};

pub struct ContentService {
    store: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
}

impl ContentService {
    pub fn new(store: Arc<dyn DocumentStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { store, objects }
    }

    /// Deletes `content_id` if `acting_user` owns it, then its media object.
    ///
    /// The record delete is guarded on the owner read a moment earlier. A
    /// media delete that fails after the record is gone is logged and not
    /// retried; the blob is orphaned.
    #[instrument(skip(self))]
    pub async fn delete_content(&self, content_id: &str, acting_user: &str) -> Result<()> {
        // 1. Ownership
        let key = ItemKey::new(content_id);
        let doc = self
            .store
            .get(CONTENT, &key)
            .await
            .map_err(|e| DomainError::dependency("read content", e))?
            .ok_or_else(|| DomainError::not_found("content", content_id))?;
        let item: ContentItem = from_document(CONTENT, doc)?;
        if item.owner_email.as_deref() != Some(acting_user) {
            return Err(DomainError::Forbidden(
                "You are not authorized to delete this meme".into(),
            ));
        }

        // 2. Record
        match self
            .store
            .delete(CONTENT, &key, Some(Condition::equals(OWNER_EMAIL, acting_user)))
            .await
        {
            Ok(()) => {}
            Err(StoreError::ConditionFailed) => {
                return Err(DomainError::not_found("content", content_id));
            }
            Err(e) => return Err(DomainError::dependency("delete content", e)),
        }
        info!("content deleted");

        // 3. Media
        if let Some(media_key) = item.media_key.as_deref() {
            if let Err(e) = self.objects.delete_object(media_key).await {
                error!(media_key, error = %e, "media delete failed, object orphaned");
            }
        }
        Ok(())
    }
}
