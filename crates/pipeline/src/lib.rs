//! Audiobook acquisition pipeline.
//!
//! # Entry Points
//!
//! - [`Pipeline::handle`] takes a JSON request body and always answers with an
//!   [`AcquisitionResponse`].
//! - [`Pipeline::run`] takes an already validated [`AcquisitionRequest`] and
//!   returns a [`Report`] with everything the run produced.
//!
//! Publishing is at-least-once and not atomic: artifacts uploaded before a
//! failure stay where they are.

pub mod error;
mod publish;
mod request;
mod response;
mod run;
mod stage;
mod workdir;

pub use crate::publish::{ArtifactKind, PendingArtifact, PublishedArtifact, Publisher, SHARED_BINARY_KEY};
pub use crate::request::AcquisitionRequest;
pub use crate::response::{AcquisitionResponse, SUCCESS_MESSAGE, Status};
pub use crate::run::{Acquisition, Pipeline, Report};
pub use crate::stage::Stage;
pub use crate::workdir::WorkDir;
