//! redb table definitions for the vigil state store.
//!
//! Both tables use `&str` keys and `&[u8]` values (JSON-serialized types).

use redb::TableDefinition;

/// Per-target health records keyed by target name.
pub const HEALTH: TableDefinition<&str, &[u8]> = TableDefinition::new("health");

/// Process-wide values (suppression windows) keyed by a fixed name.
pub const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// Key of the `SuppressionState` entry in [`META`].
pub const SUPPRESSION_KEY: &str = "suppression";
