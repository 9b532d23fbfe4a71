pub mod debounce;
pub mod persist;
pub mod preview;
pub mod session;

pub use debounce::Debouncer;
pub use persist::{FsStore, KifuStore, PersistEvent, PersistModel, SaveTarget};
pub use preview::{BranchOption, Preview, PreviewFrame, PreviewModel, PreviewState};
pub use session::KifuSession;
