//! Fixture data providers.
//!
//! Defines the `FixtureSource` trait consumed by the sync engine and the
//! football-data.org implementation used in production.

pub mod football_data;

use async_trait::async_trait;

use crate::types::{Result, RoundId, UpstreamFixture};

/// Abstraction over the external fixture feed.
///
/// Implementors report failures (non-success responses, unparseable
/// payloads, missing credentials) as `LmsError::UpstreamUnavailable`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FixtureSource: Send + Sync {
    /// Every fixture of the competition's season.
    async fn list_fixtures(&self) -> Result<Vec<UpstreamFixture>>;

    /// The matchday the provider considers current.
    async fn current_matchday(&self) -> Result<RoundId>;
}
