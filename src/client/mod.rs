pub mod api;
pub mod transport;

pub use api::ApiClient;
pub use transport::{ApiRequest, HostSelector, Transport, ALTERNATE_HOST_FLAG};
