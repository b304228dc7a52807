//! Per-atom data populated across the structure-analysis, clustering and meshing stages.

use crate::cluster::ClusterIdx;
use nalgebra::{Matrix3, Vector3};

/// Maximum number of neighbors tracked per atom for CNA bookkeeping.
pub const MAX_ATOM_NEIGHBORS: usize = 14;

/// Per-atom crystal classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum StructureType {
    /// Disordered / unrecognized local environment.
    Other,
    /// Face-centered cubic.
    Fcc,
    /// Hexagonal close-packed.
    Hcp,
    /// Body-centered cubic.
    Bcc,
    /// Cubic diamond.
    CubicDiamond,
    /// Hexagonal diamond (lonsdaleite).
    HexDiamond,
}

impl StructureType {
    /// Whether this type is a recognized crystalline structure (anything but `Other`).
    pub fn is_crystalline(self) -> bool {
        self != StructureType::Other
    }
}

impl std::fmt::Display for StructureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StructureType::Other => "OTHER",
            StructureType::Fcc => "FCC",
            StructureType::Hcp => "HCP",
            StructureType::Bcc => "BCC",
            StructureType::CubicDiamond => "CUBIC_DIAMOND",
            StructureType::HexDiamond => "HEX_DIAMOND",
        };
        f.write_str(s)
    }
}

/// Per-atom status bits set across the pipeline's stages.
///
/// A plain `u16` bitset rather than a derive-macro crate: the flag set is small and fixed,
/// so a handful of associated constants plus `contains`/`insert`/`remove` cover it without
/// pulling in a dependency the rest of the stack doesn't use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AtomFlags(u16);

impl AtomFlags {
    /// Classified OTHER; eligible to become an interface-mesh vertex.
    pub const DISORDERED: Self = Self(1 << 0);
    /// Not fully surrounded by bulk-like neighbors (surface/open boundary).
    pub const NON_BULK: Self = Self(1 << 1);
    /// Marked as lying on an intrinsic stacking fault.
    pub const ISF: Self = Self(1 << 2);
    /// Marked as lying on a twin boundary.
    pub const TB: Self = Self(1 << 3);
    /// Produced by `duplicate_shared_mesh_nodes` splitting a shared vertex.
    pub const SHARED_NODE: Self = Self(1 << 4);
    /// Generic visited marker used by graph walks (cleared per-walk).
    pub const VISITED: Self = Self(1 << 5);
    /// Borders a disclination that a cluster-graph walk could not resolve.
    pub const DISCLINATION_BORDER: Self = Self(1 << 6);
    /// Flagged by optional core-atom identification (§4.E.8).
    pub const CORE_ATOM: Self = Self(1 << 7);

    /// The empty flag set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Whether every bit set in `other` is also set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no bit is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Set the bits in `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear the bits in `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for AtomFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for AtomFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A single atom, immutable position plus mutable fields filled in by successive stages.
#[derive(Debug, Clone)]
pub struct Atom {
    /// Simulation-frame position. Immutable once the frame is loaded.
    pub position: Vector3<f64>,
    /// Opaque per-atom tag carried through from the input frame, if any.
    pub tag: Option<i64>,
    /// Crystal classification (§4.B).
    pub structure_type: StructureType,
    /// Local lattice orientation: maps canonical lattice vectors to simulation-frame vectors.
    /// Only meaningful for crystalline atoms.
    pub orientation: Matrix3<f64>,
    /// Status bits.
    pub flags: AtomFlags,
    /// Cluster this atom belongs to, once §4.C has run. `None` before clustering or for
    /// non-crystalline atoms.
    pub cluster: Option<ClusterIdx>,
}

impl Atom {
    /// Construct an atom at `position` with no classification yet.
    pub fn new(position: Vector3<f64>, tag: Option<i64>) -> Self {
        Self {
            position,
            tag,
            structure_type: StructureType::Other,
            orientation: Matrix3::identity(),
            flags: AtomFlags::empty(),
            cluster: None,
        }
    }

    /// Whether the atom's stage-B classification recognized a crystal structure.
    pub fn is_crystalline(&self) -> bool {
        self.structure_type.is_crystalline()
    }
}
