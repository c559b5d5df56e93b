pub mod session;

pub use session::{decode_identity_token, Session, SessionError, SessionManager};
