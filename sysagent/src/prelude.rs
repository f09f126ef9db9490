//! The purpose of this module is to alleviate the need to import many of the
//! `sysagent` types.
//!
//! ```
//! # #![allow(unused_imports)]
//! use sysagent::prelude::*;
//! ```
pub use crate::job::{EngineData, Job, JobId, JobStatus, RetryState};
pub use crate::scheduler::local::{Dispatcher, LocalScheduler};
pub use crate::scheduler::{ScheduleError, Scheduler};
pub use crate::store::memory::InMemoryStore;
pub use crate::store::{JobStore, StoreError};
pub use crate::task::registry::TaskRegistry;
pub use crate::task::{Task, TaskOutcome};
pub use crate::{AgentError, SystemAgent};
