pub mod event;
pub mod live_query;
pub mod query_manager;

pub use event::{QueryEventCallback, QueryEventInfo, QueryEventKind, QueryEventListener};
pub use live_query::{LiveQuery, QueryState};
pub use query_manager::QueryManager;

use std::fmt::{self, Display};
use uuid::Uuid;

/// Identifier of an active live query, unique for the lifetime of the
/// engine. Allocated when the query is created and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryId(Uuid);

impl QueryId {
    pub(crate) fn new() -> Self {
        QueryId(Uuid::new_v4())
    }
}

impl Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
