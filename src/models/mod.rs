pub mod envelope;
pub mod session;

pub use envelope::{Envelope, EnvelopeStatus};
pub use session::{Credentials, LoginResponse, Principal, Session, Token};
