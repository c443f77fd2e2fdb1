// Memo editor library exports

pub mod autosave;
pub mod buffer;
pub mod command_processor;
pub mod config;
pub mod content_cache;
pub mod draft;
pub mod error;
pub mod file_store;
pub mod session;
pub mod status_manager;
pub mod store;

pub use autosave::{AutoSaveScheduler, AutoSaveStatus, AutoSaveTarget};
pub use buffer::EditorBuffer;
pub use command_processor::{CommandProcessor, LineCommand, TextEdit};
pub use config::Config;
pub use content_cache::ContentCache;
pub use draft::{Draft, Note, NoteId, Visibility};
pub use error::{SaveError, UploadError};
pub use file_store::FileStore;
pub use session::{EditorSession, KeyOutcome, SaveOutcome, SessionOptions};
pub use store::{BlobStore, NoteStore, Services, TagStore};
