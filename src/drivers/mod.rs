mod in_memory_test;
mod tokio_postgres;

pub use self::in_memory_test::{
    InMemoryResponse, InMemoryTestDriver, InMemoryTestResponseBuilder, RecordedQuery,
    IN_MEMORY_INVARIANT_NAME,
};
pub use self::tokio_postgres::{TokioPostgresDriver, POSTGRES_INVARIANT_NAME};
