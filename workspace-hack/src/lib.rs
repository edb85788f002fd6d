// This is a stub lib.rs.
// The contents of this crate live entirely in Cargo.toml and are managed by
// `cargo hakari`.
