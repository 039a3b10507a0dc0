//! Marker types shared between entities.

/// Marker type describing an entity creation.
#[derive(Clone, Copy, Debug)]
pub struct Creation;
