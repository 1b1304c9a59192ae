#[allow(clippy::module_inception)]
pub mod guard;
pub mod router;

pub use guard::{AuthGuard, Guard, GuardDecision, Navigation, NavigationKind};
pub use router::{RoutePolicy, ViewRouter};
