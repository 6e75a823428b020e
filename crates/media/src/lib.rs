//! Media host and object store clients.
//!
//! [`host::MediaHost`] is the seam every storage backend implements.
//! [`cloudinary`] talks to the media host that serves rendered tours,
//! [`object_store`] to a plain PUT/GET bucket, and [`probe`] finds a video
//! among candidate delivery URLs when no canonical URL is known.

pub mod cloudinary;
pub mod host;
pub mod object_store;
pub mod probe;
