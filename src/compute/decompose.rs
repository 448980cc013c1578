//! Cartesian domain decomposition.
//!
//! Splits a global 3D extent across a process grid and derives, for one rank,
//! its subdomain and its six face neighbors. Ranks are laid out row-major with
//! z fastest, matching a Cartesian communicator with reordering disabled.

use super::{Result, SimulationError};

/// One of the six faces of a subdomain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Face {
    /// -x
    West,
    /// +x
    East,
    /// -y
    Down,
    /// +y
    Up,
    /// -z
    South,
    /// +z
    North,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::West,
        Face::East,
        Face::Down,
        Face::Up,
        Face::South,
        Face::North,
    ];

    /// Axis perpendicular to this face (0 = x, 1 = y, 2 = z).
    #[inline]
    pub fn axis(self) -> usize {
        match self {
            Face::West | Face::East => 0,
            Face::Down | Face::Up => 1,
            Face::South | Face::North => 2,
        }
    }

    /// True for the face on the positive side of its axis.
    #[inline]
    pub fn is_high(self) -> bool {
        matches!(self, Face::East | Face::Up | Face::North)
    }

    #[inline]
    pub fn opposite(self) -> Face {
        match self {
            Face::West => Face::East,
            Face::East => Face::West,
            Face::Down => Face::Up,
            Face::Up => Face::Down,
            Face::South => Face::North,
            Face::North => Face::South,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Shape of the process grid and this rank's place in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessTopology {
    /// Process-grid dimensions (npx, npy, npz).
    pub dims: [usize; 3],
    /// This rank's coordinate (px, py, pz).
    pub coords: [usize; 3],
    /// This rank.
    pub rank: usize,
    /// Neighbor rank per face, indexed by [`Face::index`]. `None` on a
    /// non-periodic domain boundary.
    pub neighbors: [Option<usize>; 6],
}

impl ProcessTopology {
    /// Build the topology of `rank` in a grid of shape `dims`.
    pub fn new(dims: [usize; 3], rank: usize) -> Self {
        let coords = rank_to_coords(dims, rank);
        let mut neighbors = [None; 6];
        for face in Face::ALL {
            let axis = face.axis();
            let mut c = coords;
            let shifted = if face.is_high() {
                (c[axis] + 1 < dims[axis]).then(|| c[axis] + 1)
            } else {
                c[axis].checked_sub(1)
            };
            neighbors[face.index()] = shifted.map(|v| {
                c[axis] = v;
                coords_to_rank(dims, c)
            });
        }
        Self {
            dims,
            coords,
            rank,
            neighbors,
        }
    }

    /// Total number of ranks in the grid.
    #[inline]
    pub fn size(&self) -> usize {
        self.dims.iter().product()
    }

    #[inline]
    pub fn neighbor(&self, face: Face) -> Option<usize> {
        self.neighbors[face.index()]
    }

    /// True when `face` lies on the global domain boundary.
    #[inline]
    pub fn is_boundary(&self, face: Face) -> bool {
        self.neighbor(face).is_none()
    }
}

/// Row-major rank of a grid coordinate (z fastest).
#[inline]
pub fn coords_to_rank(dims: [usize; 3], coords: [usize; 3]) -> usize {
    (coords[0] * dims[1] + coords[1]) * dims[2] + coords[2]
}

#[inline]
pub fn rank_to_coords(dims: [usize; 3], rank: usize) -> [usize; 3] {
    [
        rank / (dims[1] * dims[2]),
        (rank / dims[2]) % dims[1],
        rank % dims[2],
    ]
}

/// The part of the global domain owned by one rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalSubdomain {
    /// Local cell counts (size_x, size_y, size_z), ghosts excluded.
    pub size: [usize; 3],
    /// Global coordinate of the first local cell.
    pub offset: [usize; 3],
}

impl LocalSubdomain {
    /// Subdomain of the rank at `coords` in a grid of shape `dims`.
    pub fn new(extent: [usize; 3], dims: [usize; 3], coords: [usize; 3]) -> Self {
        let mut size = [0; 3];
        let mut offset = [0; 3];
        for axis in 0..3 {
            let (s, o) = split_axis(extent[axis], dims[axis], coords[axis]);
            size[axis] = s;
            offset[axis] = o;
        }
        Self { size, offset }
    }

    /// Number of interior cells.
    #[inline]
    pub fn cells(&self) -> usize {
        self.size.iter().product()
    }

    /// Dimensions including one ghost layer on every face.
    #[inline]
    pub fn ghosted_dims(&self) -> [usize; 3] {
        [self.size[0] + 2, self.size[1] + 2, self.size[2] + 2]
    }

    /// Number of cells including ghosts.
    #[inline]
    pub fn ghosted_cells(&self) -> usize {
        self.ghosted_dims().iter().product()
    }

    /// Linear index of a ghosted local coordinate (x fastest).
    #[inline]
    pub fn local_index(&self, x: usize, y: usize, z: usize) -> usize {
        let [nx, ny, _] = self.ghosted_dims();
        x + y * nx + z * nx * ny
    }

    /// True if the global coordinate belongs to this subdomain.
    #[inline]
    pub fn is_inside(&self, gx: usize, gy: usize, gz: usize) -> bool {
        let g = [gx, gy, gz];
        (0..3).all(|a| g[a] >= self.offset[a] && g[a] < self.offset[a] + self.size[a])
    }

    /// Ghosted local coordinate of a global coordinate inside this subdomain.
    #[inline]
    pub fn global_to_local(&self, gx: usize, gy: usize, gz: usize) -> [usize; 3] {
        [
            gx - self.offset[0] + 1,
            gy - self.offset[1] + 1,
            gz - self.offset[2] + 1,
        ]
    }

    /// Linear index of a global coordinate inside this subdomain.
    #[inline]
    pub fn global_index(&self, gx: usize, gy: usize, gz: usize) -> usize {
        let [x, y, z] = self.global_to_local(gx, gy, gz);
        self.local_index(x, y, z)
    }
}

/// Size and offset of block `coord` when `len` cells are split into `parts`.
///
/// The first `len % parts` blocks get one extra cell.
#[inline]
fn split_axis(len: usize, parts: usize, coord: usize) -> (usize, usize) {
    let base = len / parts;
    let rem = len % parts;
    let size = base + usize::from(coord < rem);
    let offset = coord * base + coord.min(rem);
    (size, offset)
}

/// Choose a process-grid shape for `process_count` ranks over `extent`.
///
/// Nonzero entries of `hint` pin that axis. Among the admissible shapes the one
/// with the smallest total interface area wins.
pub fn process_grid(
    extent: [usize; 3],
    process_count: usize,
    hint: [usize; 3],
) -> Result<[usize; 3]> {
    if process_count == 0 {
        return Err(SimulationError::configuration(
            "Number of processes must be positive",
        ));
    }
    if extent.contains(&0) {
        return Err(SimulationError::configuration(format!(
            "Global extent {:?} must be positive on every axis",
            extent
        )));
    }

    let admissible = |dims: [usize; 3]| {
        (0..3).all(|a| dims[a] <= extent[a] && (hint[a] == 0 || hint[a] == dims[a]))
    };
    let cost = |dims: [usize; 3]| -> u128 {
        (0..3)
            .map(|a| {
                let face: u128 = (0..3)
                    .filter(|&b| b != a)
                    .map(|b| extent[b] as u128)
                    .product();
                (dims[a] as u128 - 1) * face
            })
            .sum()
    };

    let mut best: Option<([usize; 3], u128)> = None;
    for npx in (1..=process_count).rev() {
        if process_count % npx != 0 {
            continue;
        }
        let rest = process_count / npx;
        for npy in (1..=rest).rev() {
            if rest % npy != 0 {
                continue;
            }
            let dims = [npx, npy, rest / npy];
            if !admissible(dims) {
                continue;
            }
            let c = cost(dims);
            if best.is_none_or(|(_, bc)| c < bc) {
                best = Some((dims, c));
            }
        }
    }

    best.map(|(dims, _)| dims).ok_or_else(|| {
        SimulationError::configuration(format!(
            "Cannot arrange {} processes over extent {:?} (grid hint {:?})",
            process_count, extent, hint
        ))
    })
}

/// Decompose `extent` over `process_count` ranks and return `rank`'s share.
pub fn decompose(
    extent: [usize; 3],
    process_count: usize,
    rank: usize,
) -> Result<(ProcessTopology, LocalSubdomain)> {
    decompose_with(extent, process_count, rank, [0; 3])
}

/// Like [`decompose`], with a process-grid hint (zero = free axis).
pub fn decompose_with(
    extent: [usize; 3],
    process_count: usize,
    rank: usize,
    hint: [usize; 3],
) -> Result<(ProcessTopology, LocalSubdomain)> {
    let dims = process_grid(extent, process_count, hint)?;
    if rank >= process_count {
        return Err(SimulationError::configuration(format!(
            "Rank {} out of range for {} processes",
            rank, process_count
        )));
    }
    let topology = ProcessTopology::new(dims, rank);
    let local = LocalSubdomain::new(extent, dims, topology.coords);
    Ok((topology, local))
}
