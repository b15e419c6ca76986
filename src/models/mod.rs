pub mod session;

pub use session::{AnalysisContext, ChatRejection, PendingInput, Session};
