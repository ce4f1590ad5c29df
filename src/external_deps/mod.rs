//! Integrations that rely on third-party services.
//!
//! Groups the filter-list download used by the ad-blocker heuristic and the
//! single exchange with the identity matching service.

pub mod filter_lists;
pub mod matcher;

pub use filter_lists::{FilterListSource, HttpFilterListSource, StaticFilterLists};
pub use matcher::{MatchTransport, ReqwestMatchTransport, ResultSubmitter};
