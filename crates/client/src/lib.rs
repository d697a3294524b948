//! Client code for gramsevak.
//!
//! This crate provides the network capability, manifest URL resolution and the
//! request interception cache that sits between the application and the
//! network.

pub mod fetch;
pub mod intercept;

pub use fetch::{FetchClient, FetchConfig, Network};
pub use intercept::{
    ActivateReport, CacheSettings, InstallReport, InterceptCache, OFFLINE_ANSWER, Outcome, Phase, ResponseSource,
    offline_response,
};
