//! Correlation identifier for requests and the render jobs they create.
//!
//! The identifier lives in Tokio task-local storage, so anything running
//! inside [`TraceId::scope`] can read it through [`TraceId::current`] without
//! it being passed along. Task locals do not follow `tokio::spawn`; the job
//! registry records the submitter's id and workers re-enter it with
//! [`TraceId::scope_optional`].

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use uuid::Uuid;

tokio::task_local! {
    static CURRENT: TraceId;
}

/// Header used to receive and echo the identifier.
pub const TRACE_ID_HEADER: &str = "trace-id";

/// UUID correlating one request with its logs, errors and render job.
///
/// # Examples
/// ```
/// use choropleth::domain::TraceId;
///
/// async fn handler() -> Option<String> {
///     TraceId::current().map(|id| id.to_string())
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(Uuid);

impl TraceId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Identifier in scope for the running task, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        CURRENT.try_with(|id| *id).ok()
    }

    /// Run `fut` with `trace_id` in scope.
    ///
    /// # Examples
    /// ```
    /// use choropleth::domain::TraceId;
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let id = TraceId::generate();
    /// assert_eq!(TraceId::scope(id, async { TraceId::current() }).await, Some(id));
    /// # });
    /// ```
    pub async fn scope<Fut: Future>(trace_id: Self, fut: Fut) -> Fut::Output {
        CURRENT.scope(trace_id, fut).await
    }

    /// Like [`TraceId::scope`], but runs `fut` unscoped for jobs submitted
    /// outside any request.
    pub async fn scope_optional<Fut: Future>(trace_id: Option<Self>, fut: Fut) -> Fut::Output {
        if let Some(id) = trace_id {
            CURRENT.scope(id, fut).await
        } else {
            fut.await
        }
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl FromStr for TraceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::try_parse(s).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[tokio::test]
    async fn scope_is_visible_to_nested_calls() {
        let id = TraceId::generate();
        let seen = TraceId::scope(id, async { async { TraceId::current() }.await }).await;
        assert_eq!(seen, Some(id));
    }

    #[rstest]
    #[tokio::test]
    async fn nothing_in_scope_by_default() {
        assert_eq!(TraceId::current(), None);
    }

    #[rstest]
    #[case(None)]
    #[case(Some(TraceId::generate()))]
    #[tokio::test]
    async fn optional_scope_matches_input(#[case] id: Option<TraceId>) {
        let seen = TraceId::scope_optional(id, async { TraceId::current() }).await;
        assert_eq!(seen, id);
    }

    #[rstest]
    #[tokio::test]
    async fn scope_does_not_follow_spawn() {
        let seen = TraceId::scope(TraceId::generate(), async {
            tokio::spawn(async { TraceId::current() }).await
        })
        .await
        .expect("task joins");
        assert_eq!(seen, None);
    }

    #[rstest]
    #[case("6f1c2b8e-3d4a-4e5f-9a0b-1c2d3e4f5a6b")]
    #[case("00000000-0000-0000-0000-000000000000")]
    fn round_trips_hyphenated_text(#[case] text: &str) {
        let id: TraceId = text.parse().expect("valid uuid");
        assert_eq!(id.to_string(), text);
    }

    #[rstest]
    #[case("")]
    #[case("6f1c2b8e")]
    fn rejects_non_uuid_text(#[case] text: &str) {
        assert!(text.parse::<TraceId>().is_err());
    }
}
