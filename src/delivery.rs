//! Deliver-and-restore transaction
//!
//! Puts transcribed text into the focused application: save the clipboard,
//! set the text, simulate a paste, restore the clipboard. A failed paste
//! (typically a missing automation permission) is non-fatal: the text is
//! left on the clipboard for manual pasting and the original clipboard is
//! NOT restored over it.

use crate::config::{ConfigSnapshot, FocusFollowMode};
use crate::error::DeliveryError;
use crate::focus::FocusCandidate;
use crate::platform::{AppActivator, Clipboard, PasteInjector};
use std::sync::Arc;

/// How a delivery ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Pasted and original clipboard restored
    Pasted,
    /// Paste failed; text left on the clipboard, restore skipped
    LeftOnClipboard(String),
}

/// The clipboard/paste/activate capabilities bundled for one transaction
pub struct Delivery {
    clipboard: Arc<dyn Clipboard>,
    paster: Arc<dyn PasteInjector>,
    activator: Arc<dyn AppActivator>,
}

impl Delivery {
    pub fn new(
        clipboard: Arc<dyn Clipboard>,
        paster: Arc<dyn PasteInjector>,
        activator: Arc<dyn AppActivator>,
    ) -> Self {
        Self {
            clipboard,
            paster,
            activator,
        }
    }

    /// Run the full transaction with a focus candidate snapshot taken at
    /// dispatch time (the candidate is not live-tracked once delivery has
    /// begun).
    pub async fn deliver(
        &self,
        text: &str,
        focus: Option<FocusCandidate>,
        config: &ConfigSnapshot,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        // In track-only mode the candidate was deliberately not raised
        // while the user dictated; raise it now, just before pasting.
        if config.focus_follow_enabled && config.focus_follow_mode == FocusFollowMode::Track {
            if let Some(candidate) = &focus {
                if let Err(e) = self.activator.activate(&candidate.app).await {
                    tracing::warn!(
                        "Could not activate {}, pasting to frontmost: {}",
                        candidate.app.identifier,
                        e
                    );
                }
            }
        }

        let original = self.clipboard.read().await?;

        self.clipboard.write(text).await?;

        // Clipboard writes are not instantly visible to the paste target
        tokio::time::sleep(config.clipboard_sync_delay).await;

        let target = focus.as_ref().map(|c| &c.app);
        match self.paster.paste(target).await {
            Ok(()) => {
                tokio::time::sleep(config.paste_delay).await;
                if let Some(original) = original {
                    if let Err(e) = self.clipboard.write(&original).await {
                        tracing::warn!("Clipboard restore failed: {}", e);
                    } else {
                        tracing::debug!("Clipboard restored ({} bytes)", original.len());
                    }
                }
                Ok(DeliveryOutcome::Pasted)
            }
            Err(e) => {
                // The user has not pasted yet; restoring now would destroy
                // the text. Leave it in place.
                tracing::warn!("Paste failed, text left on clipboard: {}", e);
                Ok(DeliveryOutcome::LeftOnClipboard(e.to_string()))
            }
        }
    }
}
