//! Sends queries to the backend and turns replies into transcript entries.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::{Backend, QueryRequest};
use crate::classifier::{Classification, ReplyClassifier};
use crate::download::FileSink;
use crate::message::Message;
use crate::state::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptyInput,
    InFlight,
}

/// How a completed turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    PlainText,
    Table,
    Chart,
    FileDownload,
    ServerError,
    UnsupportedChart,
    NetworkError,
    DownloadFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Nothing was appended.
    Skipped(SkipReason),
    /// One user message and one assistant message were appended.
    Completed(TurnOutcome),
}

pub struct Dispatcher {
    backend: Arc<dyn Backend>,
    sink: Arc<dyn FileSink>,
    classifier: ReplyClassifier,
}

impl Dispatcher {
    pub fn new(
        backend: Arc<dyn Backend>,
        sink: Arc<dyn FileSink>,
        classifier: ReplyClassifier,
    ) -> Self {
        Self {
            backend,
            sink,
            classifier,
        }
    }

    pub fn sink(&self) -> &dyn FileSink {
        self.sink.as_ref()
    }

    /// Run one conversational turn.
    ///
    /// Blank input and submissions while another query is in flight are
    /// ignored. Otherwise the user message is appended before the request
    /// goes out, and exactly one assistant message follows once the reply
    /// (or failure) has been handled. No retries.
    pub async fn submit_query(&self, state: &SessionState, text: &str) -> Submission {
        if text.trim().is_empty() {
            debug!("ignoring blank query");
            return Submission::Skipped(SkipReason::EmptyInput);
        }
        let Some(_flight) = state.begin_flight() else {
            debug!("ignoring query while another is in flight");
            return Submission::Skipped(SkipReason::InFlight);
        };

        // Captured before the new message lands so it is not sent twice.
        let history = state.store().history_for_backend();
        state.store().append(Message::user(text));
        state.clear_pending_input();

        let request = QueryRequest {
            message: text.to_string(),
            history,
        };
        info!(history_len = request.history.len(), "submitting query");

        let reply = self
            .backend
            .submit(&request)
            .await
            .and_then(|raw| self.classifier.classify(raw));

        let (message, outcome) = match reply {
            Ok(classification) => self.settle(classification).await,
            Err(err) => {
                warn!(error = %err, "query failed");
                (
                    Message::network_error(err.diagnostic()),
                    TurnOutcome::NetworkError,
                )
            }
        };
        state.store().append(message);
        debug!(?outcome, "turn complete");

        Submission::Completed(outcome)
    }

    async fn settle(&self, classification: Classification) -> (Message, TurnOutcome) {
        debug!(variant = classification.variant_name(), "classified reply");
        let outcome = match &classification {
            Classification::FileTransfer { filename, bytes } => {
                return match self.sink.save(filename, bytes).await {
                    Ok(_) => (Message::download_ack(filename.as_str()), TurnOutcome::FileDownload),
                    Err(err) => {
                        warn!(error = %err, filename = %filename, "could not save download");
                        (Message::download_failed(filename), TurnOutcome::DownloadFailed)
                    }
                };
            }
            Classification::ServerError { detail } => {
                warn!(detail = ?detail, "backend reported an error");
                TurnOutcome::ServerError
            }
            Classification::Table { .. } => TurnOutcome::Table,
            Classification::Chart { .. } => TurnOutcome::Chart,
            Classification::UnsupportedChart { requested } => {
                warn!(requested = %requested, "unsupported chart type");
                TurnOutcome::UnsupportedChart
            }
            Classification::PlainText { .. } => TurnOutcome::PlainText,
        };
        (classification.into_message(), outcome)
    }
}
