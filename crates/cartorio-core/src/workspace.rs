//! Per-document coordination
//!
//! A [`DocumentWorkspace`] is what one open document owns: the pipeline
//! tracker, the analysis stream and the queue that saves edited fields.
//! Disposing it releases all three.

use crate::config::CartorioConfig;
use crate::error::{CartorioError, Result};
use cartorio_persist::{SaveQueue, Saver};
use cartorio_pipeline::{PipelineTrigger, ProcessingMachine, PushChannel};
use cartorio_stream::{AnalysisRequest, GenerativeBackend, StreamAggregator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Document identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Fresh random id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID
    #[inline]
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for DocumentId {
    type Err = CartorioError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|source| CartorioError::InvalidDocumentId {
                value: s.to_string(),
                source,
            })
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Field values extracted from a document and edited by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    /// Owning document
    pub document_id: DocumentId,
    /// Field name to value
    pub values: BTreeMap<String, String>,
}

/// Collaborators shared by every workspace
#[derive(Clone)]
pub struct WorkspaceDeps {
    /// Status push channel
    pub channel: Arc<dyn PushChannel>,
    /// Pipeline trigger
    pub trigger: Arc<dyn PipelineTrigger>,
    /// Generative backend
    pub backend: Arc<dyn GenerativeBackend>,
    /// Durable store for extracted fields
    pub saver: Arc<dyn Saver<ExtractedFields>>,
}

impl fmt::Debug for WorkspaceDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceDeps").finish_non_exhaustive()
    }
}

/// Coordination units owned by one open document
pub struct DocumentWorkspace {
    id: DocumentId,
    pipeline: ProcessingMachine,
    analysis: StreamAggregator,
    fields: SaveQueue<ExtractedFields>,
    disposed: AtomicBool,
}

impl DocumentWorkspace {
    /// Open workspace for document `id`
    pub fn open(id: &str, deps: &WorkspaceDeps, config: &CartorioConfig) -> Result<Self> {
        let id: DocumentId = id.parse()?;
        let fields = SaveQueue::builder(Arc::clone(&deps.saver))
            .config(config.persistence.clone())
            .on_error(move |err| tracing::warn!(document = %id, error = %err, "field save failed"))
            .build();

        tracing::debug!(document = %id, "workspace opened");
        Ok(Self {
            id,
            pipeline: ProcessingMachine::new(
                Arc::clone(&deps.channel),
                Arc::clone(&deps.trigger),
                config.pipeline.clone(),
            ),
            analysis: StreamAggregator::from_arc(Arc::clone(&deps.backend)),
            fields,
            disposed: AtomicBool::new(false),
        })
    }

    /// Document id
    #[inline]
    #[must_use]
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Start remote processing of this document
    pub async fn process(&self) {
        self.pipeline.start(&self.id.to_string()).await;
    }

    /// Start (or restart) streamed analysis
    pub fn analyze(&self, request: AnalysisRequest) {
        self.analysis.start(request);
    }

    /// Record edited field values; saved after the debounce window
    pub fn edit_fields(&self, values: BTreeMap<String, String>) {
        self.fields.trigger_save(ExtractedFields {
            document_id: self.id,
            values,
        });
    }

    /// Save field values now
    pub fn save_fields_now(&self, values: BTreeMap<String, String>) {
        self.fields.force_save(ExtractedFields {
            document_id: self.id,
            values,
        });
    }

    /// Pipeline tracker
    #[inline]
    #[must_use]
    pub fn pipeline(&self) -> &ProcessingMachine {
        &self.pipeline
    }

    /// Analysis stream
    #[inline]
    #[must_use]
    pub fn analysis(&self) -> &StreamAggregator {
        &self.analysis
    }

    /// Field save queue
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &SaveQueue<ExtractedFields> {
        &self.fields
    }

    /// Cancel timers, unsubscribe and detach the stream
    ///
    /// A field save already in flight still completes.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.fields.dispose();
        self.pipeline.dispose();
        self.analysis.dispose();
        tracing::debug!(document = %self.id, "workspace disposed");
    }

    /// Whether [`dispose`](Self::dispose) ran
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl Drop for DocumentWorkspace {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for DocumentWorkspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentWorkspace")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
