//! # Staging
//!
//! A staging attempt turns uploaded bits into a droplet on a remote worker:
//!
//! 1. the [`Stager`] validates the target and asks [`StagingTasks`] to start
//! 2. a worker is selected and the request is published with a fresh
//!    correlation id, a bus reply subject and the HTTP callback
//! 3. the first of bus reply, HTTP callback or deadline completes the attempt
//! 4. the result is written into the target's row exactly once and the
//!    [`Stager`] starts the runtime for apps that staged successfully

pub mod message;
pub mod stageable;
pub mod stager;
pub mod task;
pub mod tracker;

pub use message::{
    BuildpackSpec, CallbackInfo, ErrorInfo, StagingOutcome, StagingReply, StagingRequest,
    StagingResult, StagingSuccess,
};
pub use stageable::{resolve_target, AppTarget, ApplyOutcome, PackageTarget, Stageable};
pub use stager::Stager;
pub use task::{CompletionHandler, CompletionSource, StagingHandle, StagingTasks};
pub use tracker::{Claim, StagingTracker};
