//! redb table definitions for the ScaleGrid state store.
//!
//! Values are JSON-serialized domain types. Sample keys embed a zero-padded
//! timestamp so a lexicographic range scan is also a time range scan.

use redb::TableDefinition;

/// Registered `ServiceConfig`s keyed by service name.
pub const SERVICES: TableDefinition<&str, &[u8]> = TableDefinition::new("services");

/// Metric samples keyed by `{service}:{timestamp:020}`.
pub const SAMPLES: TableDefinition<&str, &[u8]> = TableDefinition::new("samples");

/// Last reported instance count keyed by service name.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");

/// Action log keyed by a monotonically increasing sequence number.
pub const ACTIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("actions");
