//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod aes_role_key_cipher;
mod assignment_table_schema;
mod in_memory_assignment_repository;
mod in_memory_role_cache;
mod postgres_assignment_repository;
mod redis_role_cache;
mod tracing_role_event_publisher;

pub use aes_role_key_cipher::AesRoleKeyCipher;
pub use assignment_table_schema::AssignmentTableSchema;
pub use in_memory_assignment_repository::InMemoryAssignmentRepository;
pub use in_memory_role_cache::InMemoryRoleCache;
pub use postgres_assignment_repository::PostgresAssignmentRepository;
pub use redis_role_cache::RedisRoleCache;
pub use tracing_role_event_publisher::TracingRoleEventPublisher;
