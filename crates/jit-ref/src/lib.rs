//! Reference outbound-client mocks (`mocks`) and runnable scenarios
//! (`scenarios`) matching §8's scenario table. Used by this crate's own
//! tests and by the `demo` binary; never a production adapter.

pub mod mocks;
pub mod scenarios;
