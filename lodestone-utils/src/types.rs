// Wrapper types making it harder to accidentaly use the wrong underlying type.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::math::Vector3;

/// A block position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos(pub Vector3<i32>);

impl BlockPos {
    /// The six face offsets, in the order neighbours are updated: west, east, down, up, north, south.
    pub const NEIGHBOR_OFFSETS: [(i32, i32, i32); 6] = [
        (-1, 0, 0),
        (1, 0, 0),
        (0, -1, 0),
        (0, 1, 0),
        (0, 0, -1),
        (0, 0, 1),
    ];

    /// Creates a block position from its coordinates.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self(Vector3::new(x, y, z))
    }

    /// Returns the position offset by the given amounts.
    #[inline]
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.0.x + dx, self.0.y + dy, self.0.z + dz)
    }

    /// Returns the six directly adjacent positions.
    #[must_use]
    pub fn neighbors(self) -> [BlockPos; 6] {
        Self::NEIGHBOR_OFFSETS.map(|(dx, dy, dz)| self.offset(dx, dy, dz))
    }
}

impl Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

/// An entity id, unique for the lifetime of a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub i32);

impl Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity {}", self.0)
    }
}

/// The kind of a block. Scheduled ticks and behaviours are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u16);

impl BlockId {
    /// The empty block.
    pub const AIR: BlockId = BlockId(0);
}

impl Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A concrete block state: the block kind plus its packed property bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockState {
    /// The block kind.
    pub block: BlockId,
    /// Packed property bits, read with [`Self::flag`].
    pub data: u8,
}

impl BlockState {
    /// Plain air with no data bits.
    pub const AIR: BlockState = BlockState {
        block: BlockId::AIR,
        data: 0,
    };

    /// Creates a state from a block kind and its data bits.
    #[must_use]
    pub const fn new(block: BlockId, data: u8) -> Self {
        Self { block, data }
    }

    /// Returns true for air, whatever its data bits.
    #[must_use]
    pub const fn is_air(self) -> bool {
        self.block.0 == BlockId::AIR.0
    }

    /// Folds every air state into [`Self::AIR`].
    #[must_use]
    pub const fn normalized(self) -> Self {
        if self.is_air() { Self::AIR } else { self }
    }

    /// Returns the state with the given data bit set or cleared.
    #[must_use]
    pub const fn with_flag(self, bit: u8, value: bool) -> Self {
        let data = if value {
            self.data | (1 << bit)
        } else {
            self.data & !(1 << bit)
        };
        Self::new(self.block, data)
    }

    /// Returns whether the given data bit is set.
    #[must_use]
    pub const fn flag(self, bit: u8) -> bool {
        self.data & (1 << bit) != 0
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self::AIR
    }
}

impl Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block, self.data)
    }
}
