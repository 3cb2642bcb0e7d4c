mod health_check;
mod subscriptions;
mod sync;

pub use health_check::*;
pub use subscriptions::*;
pub use sync::*;
