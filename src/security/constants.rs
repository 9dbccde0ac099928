//! Constants for deterministic identity generation.

use uuid::Uuid;

/// Namespace under which seeded (v5) fingerprints are derived. Changing this
/// value would change every deterministic identity, so it is fixed for the
/// lifetime of the project.
pub fn troupe_namespace() -> Uuid {
    Uuid::parse_str("9d1f6c2e-4b0a-4c7d-8e3f-5a6b7c8d9e0f").expect("namespace literal is valid")
}
