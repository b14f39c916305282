//! Project setup and request handling on top of [`ObsClient`](crate::obs::ObsClient).

mod meta;
mod request;

pub use meta::{ProjectMetaBuilder, Roles};
pub use request::{Request, Review, parse_reviews};
