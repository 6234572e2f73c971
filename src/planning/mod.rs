//! Planning services around the approval workflow: PPMP and row editing,
//! reference data, the notification inbox and the list cache.

pub mod cache;
pub mod inbox;
pub mod organization;
pub mod ppmps;

pub use cache::ListCache;
pub use inbox::Inbox;
pub use organization::Organization;
pub use ppmps::{PpmpService, UploadFile};
