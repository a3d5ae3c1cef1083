//! Data types shared between the session manager and its collaborators.
//!
//! - `token`: the credential pair and the login/registration request bodies
//! - `notice`: transient user-visible notifications
//! - `snapshot`: read-only session status for display

pub mod notice;
pub mod snapshot;
pub mod token;

pub use notice::{Notice, NoticeLevel};
pub use snapshot::SessionSnapshot;
pub use token::{Credentials, Registration, TokenPair};
