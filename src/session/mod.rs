pub mod cooldown;
pub mod coordinator;
pub mod login;
pub mod reauth;
pub mod redirect;

pub use cooldown::RedirectCooldown;
pub use coordinator::{CoordinatorState, Recovery, RefreshCoordinator};
pub use login::{login, logout, restore, RestoreOutcome};
pub use reauth::{create_reauthenticator, NoReauth, Reauthenticator, RefreshEndpointReauth};
pub use redirect::{LoginRedirector, RedirectOutcome};
