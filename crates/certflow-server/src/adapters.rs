//! Row handlers that perform the create and send side effects.

use std::sync::Arc;

use certflow_core::{ColumnIndex, MessageVars, RowRecord, SubstitutionTable, columns};
use certflow_providers::{
    Attachment, BoxFuture, DeliveryApi, DocumentApi, Mailbox, OutgoingMessage, PDF_MIME_TYPE,
    ProviderError, ProviderResult, Service,
};
use tracing::{debug, warn};

use crate::batch::{RowAction, RowHandler};
use crate::config::MailConfig;

/// Filename of the PDF attached to delivery messages.
pub const ATTACHMENT_NAME: &str = "certificate.pdf";

/// Copies the template deck for a row and fills in its placeholders.
pub struct CreateCertificate {
    documents: Arc<dyn DocumentApi>,
    template_id: String,
    destination_id: String,
    substitutions: SubstitutionTable,
}

impl CreateCertificate {
    pub fn new(
        documents: Arc<dyn DocumentApi>,
        template_id: impl Into<String>,
        destination_id: impl Into<String>,
        substitutions: SubstitutionTable,
    ) -> Self {
        Self {
            documents,
            template_id: template_id.into(),
            destination_id: destination_id.into(),
            substitutions,
        }
    }

    async fn create(&self, row: RowRecord<'_>, index: &ColumnIndex) -> ProviderResult<RowAction> {
        let name = row.field(index, columns::NAME);
        let copy_id = self
            .documents
            .duplicate(&self.template_id, &self.destination_id, name)
            .await?;
        debug!(row = row.position, %copy_id, "template duplicated");
        // Leave no half-filled deck behind; the row stays eligible.
        let copy = PartialCopy::new(self.documents.clone(), copy_id);

        let replacements = self.substitutions.resolve(&row, index);
        let substituted = self
            .documents
            .substitute_text(copy.id(), &replacements)
            .await;
        if let Err(e) = substituted {
            copy.discard().await;
            return Err(e);
        }
        Ok(RowAction::Done(copy.keep()))
    }
}

/// A duplicated deck that is deleted unless [`keep`](Self::keep) is called.
///
/// Dropping it armed, as happens when the run deadline cancels the create
/// future mid-way, deletes the copy on a spawned task.
struct PartialCopy {
    documents: Arc<dyn DocumentApi>,
    copy_id: String,
    armed: bool,
}

impl PartialCopy {
    fn new(documents: Arc<dyn DocumentApi>, copy_id: String) -> Self {
        Self {
            documents,
            copy_id,
            armed: true,
        }
    }

    fn id(&self) -> &str {
        &self.copy_id
    }

    fn keep(mut self) -> String {
        self.armed = false;
        std::mem::take(&mut self.copy_id)
    }

    async fn discard(mut self) {
        self.armed = false;
        remove_copy(self.documents.as_ref(), &self.copy_id).await;
    }
}

impl Drop for PartialCopy {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let documents = self.documents.clone();
        let copy_id = std::mem::take(&mut self.copy_id);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(%copy_id, "create interrupted, removing partial copy");
                runtime.spawn(async move { remove_copy(documents.as_ref(), &copy_id).await });
            }
            Err(_) => warn!(%copy_id, "create interrupted outside a runtime, partial copy kept"),
        }
    }
}

async fn remove_copy(documents: &dyn DocumentApi, copy_id: &str) {
    if let Err(e) = documents.delete(copy_id).await {
        warn!(%copy_id, "failed to remove partial copy: {}", e);
    }
}

impl RowHandler for CreateCertificate {
    fn name(&self) -> &str {
        "create"
    }

    fn process<'a>(
        &'a self,
        row: RowRecord<'a>,
        columns: &'a ColumnIndex,
    ) -> BoxFuture<'a, ProviderResult<RowAction>> {
        Box::pin(self.create(row, columns))
    }
}

/// Exports a row's deck as PDF and mails it to the recipient.
pub struct DeliverCertificate {
    documents: Arc<dyn DocumentApi>,
    delivery: Arc<dyn DeliveryApi>,
    event_name: String,
    mail: MailConfig,
}

impl DeliverCertificate {
    pub fn new(
        documents: Arc<dyn DocumentApi>,
        delivery: Arc<dyn DeliveryApi>,
        event_name: impl Into<String>,
        mail: MailConfig,
    ) -> Self {
        Self {
            documents,
            delivery,
            event_name: event_name.into(),
            mail,
        }
    }

    fn sender(&self) -> Option<Mailbox> {
        self.mail
            .sender_address
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .map(|a| Mailbox::new(a).with_display_name(&self.mail.sender_name))
    }

    async fn deliver(&self, row: RowRecord<'_>, index: &ColumnIndex) -> ProviderResult<RowAction> {
        let slide_id = row.field(index, columns::SLIDE_ID).trim();
        if slide_id.is_empty() {
            return Ok(RowAction::Skip("no certificate has been created".into()));
        }
        let email = row.field(index, columns::EMAIL).trim();
        if email.is_empty() {
            return Ok(RowAction::Skip("no recipient email".into()));
        }
        let to = Mailbox::new(email);
        if !to.has_valid_address() {
            return Ok(RowAction::Skip(format!("invalid recipient email {:?}", email)));
        }

        let pdf = self.documents.export_as(slide_id, PDF_MIME_TYPE).await?;
        let name = row.field(index, columns::NAME);
        let rendered = self.mail.template.render(&MessageVars {
            event: self.event_name.clone(),
            name: name.to_string(),
            date: row.field(index, columns::DATE).to_string(),
            sender: self.mail.sender_name.clone(),
        });

        let message = OutgoingMessage {
            from: self.sender(),
            to,
            subject: rendered.subject,
            body: rendered.body,
            attachments: vec![Attachment {
                filename: ATTACHMENT_NAME.to_string(),
                mime_type: PDF_MIME_TYPE.to_string(),
                content: pdf,
            }],
        };
        let message_id = self.delivery.send(&message).await?;
        debug!(row = row.position, %message_id, "certificate sent");
        Ok(RowAction::Done(message_id))
    }
}

impl RowHandler for DeliverCertificate {
    fn name(&self) -> &str {
        "send"
    }

    fn process<'a>(
        &'a self,
        row: RowRecord<'a>,
        columns: &'a ColumnIndex,
    ) -> BoxFuture<'a, ProviderResult<RowAction>> {
        Box::pin(self.deliver(row, columns))
    }

    /// A send that timed out or failed server-side may still have gone out,
    /// so only refusals are resent. Export failures retry as usual.
    fn is_safe_to_retry(&self, err: &ProviderError) -> bool {
        match err.service() {
            Some(Service::Drive) => err.is_retryable(),
            _ => err.is_refusal(),
        }
    }
}
