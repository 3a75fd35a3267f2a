//! # Placement Hints
//!
//! Where an acquired instance ends up in the world is not the pool's business.
//! The registry only forwards whatever hints the caller gave to an optional
//! [`PlacementApplier`], and only when an instance was actually handed out.

/// Opaque reference to the parent an instance should be attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ParentRef(pub u64);

/// Placement requested together with an acquire.
///
/// Every field is optional; `None` means "leave it as the factory made it".
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlacementHints {
    /// World position (xyz).
    pub position: Option<[f32; 3]>,
    /// Orientation quaternion (xyzw).
    pub orientation: Option<[f32; 4]>,
    /// Parent scope to attach under.
    pub parent: Option<ParentRef>,
}

impl PlacementHints {
    /// No placement at all.
    pub const NONE: Self = Self {
        position: None,
        orientation: None,
        parent: None,
    };

    /// Hints with only a position.
    #[must_use]
    pub const fn at(position: [f32; 3]) -> Self {
        Self {
            position: Some(position),
            orientation: None,
            parent: None,
        }
    }

    /// Sets the orientation.
    #[must_use]
    pub const fn with_orientation(mut self, orientation: [f32; 4]) -> Self {
        self.orientation = Some(orientation);
        self
    }

    /// Sets the parent.
    #[must_use]
    pub const fn with_parent(mut self, parent: ParentRef) -> Self {
        self.parent = Some(parent);
        self
    }

    /// True if no hint is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.position.is_none() && self.orientation.is_none() && self.parent.is_none()
    }
}

/// Host hook that moves/parents a freshly acquired instance.
pub trait PlacementApplier<H> {
    /// Applies `hints` to `handle`.
    fn apply_placement(&mut self, handle: H, hints: &PlacementHints);
}
