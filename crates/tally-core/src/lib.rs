pub mod backend;
pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod download;
pub mod error;
pub mod message;
pub mod session;
pub mod state;
pub mod store;

// Re-export main types for convenience
pub use backend::{Backend, HttpBackend, QueryRequest};
pub use classifier::{Classification, RawReply, ReplyClassifier};
pub use config::Config;
pub use dispatcher::{Dispatcher, SkipReason, Submission, TurnOutcome};
pub use download::{DownloadDir, FileSink};
pub use error::{BackendError, DownloadError};
pub use message::{ChartKind, ChartSpec, Message, NoticeKind, Origin, Payload, Table};
pub use session::{Chord, Session, ShortcutAction};
pub use state::{SessionSnapshot, SessionWatcher};
pub use store::{Conversation, ConversationStore};
