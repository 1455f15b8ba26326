mod backoff;
mod error;
mod keys;
mod traits;
mod types;

pub use backoff::BackoffPolicy;
pub use error::{LockError, Result};
pub use keys::resource_key;
pub use traits::LeaseStore;
pub use types::{AcquireOutcome, HolderId, LockLease, ReleaseOutcome, RenewOutcome};
