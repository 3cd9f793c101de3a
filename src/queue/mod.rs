pub mod broker;
pub mod job;

pub use broker::JobBroker;
pub use job::{HttpReply, Job, JobCallback, JobOutcome, JobRequest, Method, OwnedReply};
