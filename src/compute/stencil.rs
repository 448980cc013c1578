//! Gray-Scott explicit Euler update over a ghosted subdomain.
//!
//! ```text
//! u' = u + dt * (Du * lap(u) - u*v^2 + F*(1 - u))
//! v' = v + dt * (Dv * lap(v) + u*v^2 - (F + k)*v)
//! ```
//!
//! `lap` is the 7-point Laplacian with unit grid spacing. Interior z-planes are
//! independent and swept in parallel.

use rayon::prelude::*;

use crate::schema::{BoundaryCondition, Settings};

use super::{Face, Field, LocalSubdomain, ProcessTopology};

/// Model coefficients for one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parameters {
    pub du: f64,
    pub dv: f64,
    pub f: f64,
    pub k: f64,
    pub dt: f64,
}

impl Parameters {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            du: settings.du,
            dv: settings.dv,
            f: settings.f,
            k: settings.k,
            dt: settings.dt,
        }
    }
}

/// Faces on which the stencil mirrors the boundary cell instead of reading the
/// ghost plane, indexed by [`Face::index`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Walls([bool; 6]);

impl Walls {
    /// Every face reads its ghost plane.
    pub const NONE: Walls = Walls([false; 6]);

    pub fn new(topology: &ProcessTopology, boundary: BoundaryCondition) -> Self {
        match boundary {
            BoundaryCondition::Fixed => Self::NONE,
            BoundaryCondition::Reflective => {
                let mut walls = [false; 6];
                for face in Face::ALL {
                    walls[face.index()] = topology.is_boundary(face);
                }
                Walls(walls)
            }
        }
    }

    #[inline]
    pub fn has(&self, face: Face) -> bool {
        self.0[face.index()]
    }
}

/// Reaction term of U.
#[inline]
pub fn react_u(u: f64, v: f64, f: f64) -> f64 {
    -u * v * v + f * (1.0 - u)
}

/// Reaction term of V.
#[inline]
pub fn react_v(u: f64, v: f64, f: f64, k: f64) -> f64 {
    u * v * v - (f + k) * v
}

/// 7-point Laplacian of `field` at a ghosted interior coordinate.
#[inline]
pub fn laplacian(field: &Field, x: usize, y: usize, z: usize) -> f64 {
    field.get(x - 1, y, z)
        + field.get(x + 1, y, z)
        + field.get(x, y - 1, z)
        + field.get(x, y + 1, z)
        + field.get(x, y, z - 1)
        + field.get(x, y, z + 1)
        - 6.0 * field.get(x, y, z)
}

/// Strides of a ghosted array and the flags needed to mirror at walls.
#[derive(Clone, Copy)]
struct Geometry {
    size: [usize; 3],
    sy: usize,
    sz: usize,
    walls: Walls,
}

impl Geometry {
    /// Laplacian at linear index `i` (local coordinate `x, y, z`).
    #[inline(always)]
    fn laplacian(&self, s: &[f64], i: usize, x: usize, y: usize, z: usize) -> f64 {
        let c = s[i];
        let w = &self.walls;
        let xm = if x == 1 && w.has(Face::West) { c } else { s[i - 1] };
        let xp = if x == self.size[0] && w.has(Face::East) { c } else { s[i + 1] };
        let ym = if y == 1 && w.has(Face::Down) { c } else { s[i - self.sy] };
        let yp = if y == self.size[1] && w.has(Face::Up) { c } else { s[i + self.sy] };
        let zm = if z == 1 && w.has(Face::South) { c } else { s[i - self.sz] };
        let zp = if z == self.size[2] && w.has(Face::North) { c } else { s[i + self.sz] };
        xm + xp + ym + yp + zm + zp - 6.0 * c
    }
}

/// Compute one step from `(u, v)` into the interior of `(u_next, v_next)`.
///
/// Ghost cells of the next buffers are not written. With [`Walls::NONE`] this
/// is the plain stencil; otherwise each wall face uses the boundary cell in
/// place of its ghost, which makes the domain edge zero-flux.
pub fn step(
    u: &Field,
    v: &Field,
    u_next: &mut Field,
    v_next: &mut Field,
    local: &LocalSubdomain,
    params: &Parameters,
    walls: Walls,
) {
    debug_assert_eq!(u.local(), local);
    debug_assert_eq!(u_next.local(), local);
    let [nx, ny, _] = local.ghosted_dims();
    let plane = nx * ny;
    let geom = Geometry {
        size: local.size,
        sy: nx,
        sz: plane,
        walls,
    };
    let p = *params;
    let us = u.as_slice();
    let vs = v.as_slice();

    u_next
        .as_mut_slice()
        .par_chunks_mut(plane)
        .zip(v_next.as_mut_slice().par_chunks_mut(plane))
        .enumerate()
        .skip(1)
        .take(local.size[2])
        .for_each(|(z, (u_plane, v_plane))| {
            for y in 1..=geom.size[1] {
                for x in 1..=geom.size[0] {
                    let j = x + y * nx;
                    let i = j + z * plane;
                    let uc = us[i];
                    let vc = vs[i];
                    let lap_u = geom.laplacian(us, i, x, y, z);
                    let lap_v = geom.laplacian(vs, i, x, y, z);
                    u_plane[j] = uc + p.dt * (p.du * lap_u + react_u(uc, vc, p.f));
                    v_plane[j] = vc + p.dt * (p.dv * lap_v + react_v(uc, vc, p.f, p.k));
                }
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::decompose;

    fn cube(n: usize) -> LocalSubdomain {
        LocalSubdomain {
            size: [n, n, n],
            offset: [0, 0, 0],
        }
    }

    fn params() -> Parameters {
        Parameters {
            du: 0.2,
            dv: 0.1,
            f: 0.02,
            k: 0.048,
            dt: 1.0,
        }
    }

    /// Straightforward per-cell reference using the public helpers.
    fn reference(u: &Field, v: &Field, p: &Parameters) -> (Field, Field) {
        let local = *u.local();
        let mut un = Field::new(local);
        let mut vn = Field::new(local);
        let [sx, sy, sz] = local.size;
        for z in 1..=sz {
            for y in 1..=sy {
                for x in 1..=sx {
                    let uc = u.get(x, y, z);
                    let vc = v.get(x, y, z);
                    un.set(
                        x,
                        y,
                        z,
                        uc + p.dt * (p.du * laplacian(u, x, y, z) + react_u(uc, vc, p.f)),
                    );
                    vn.set(
                        x,
                        y,
                        z,
                        vc + p.dt * (p.dv * laplacian(v, x, y, z) + react_v(uc, vc, p.f, p.k)),
                    );
                }
            }
        }
        (un, vn)
    }

    fn wavy(local: LocalSubdomain, phase: f64) -> Field {
        let mut field = Field::new(local);
        let [nx, ny, nz] = local.ghosted_dims();
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    let t = (x as f64 * 0.7 + y as f64 * 1.3 + z as f64 * 0.4 + phase).sin();
                    field.set(x, y, z, 0.5 + 0.25 * t);
                }
            }
        }
        field
    }

    #[test]
    fn test_reaction_terms() {
        assert_eq!(react_u(1.0, 0.0, 0.02), 0.0);
        assert_eq!(react_v(1.0, 0.0, 0.02, 0.048), 0.0);
        let (u, v, f, k) = (0.5, 0.25, 0.02, 0.048);
        assert!((react_u(u, v, f) - (-0.03125 + 0.01)).abs() < 1e-15);
        assert!((react_v(u, v, f, k) - (0.03125 - 0.017)).abs() < 1e-15);
    }

    #[test]
    fn test_laplacian_of_uniform_is_zero() {
        let mut field = Field::new(cube(3));
        field.fill(0.7);
        assert_eq!(laplacian(&field, 2, 2, 2), 0.0);
        assert_eq!(laplacian(&field, 1, 1, 1), 0.0);
    }

    #[test]
    fn test_laplacian_point_source() {
        let mut field = Field::new(cube(3));
        field.set(2, 2, 2, 1.0);
        assert_eq!(laplacian(&field, 2, 2, 2), -6.0);
        assert_eq!(laplacian(&field, 1, 2, 2), 1.0);
        assert_eq!(laplacian(&field, 1, 1, 1), 0.0);
    }

    #[test]
    fn test_step_matches_reference() {
        let local = LocalSubdomain {
            size: [5, 4, 6],
            offset: [0, 0, 0],
        };
        let u = wavy(local, 0.0);
        let v = wavy(local, 1.1);
        let p = params();
        let mut un = Field::new(local);
        let mut vn = Field::new(local);
        step(&u, &v, &mut un, &mut vn, &local, &p, Walls::NONE);
        let (ru, rv) = reference(&u, &v, &p);
        assert_eq!(un, ru);
        assert_eq!(vn, rv);
    }

    #[test]
    fn test_step_leaves_next_ghosts() {
        let local = cube(3);
        let u = wavy(local, 0.0);
        let v = wavy(local, 0.3);
        let mut un = Field::new(local);
        let mut vn = Field::new(local);
        un.fill(9.0);
        vn.fill(9.0);
        step(&u, &v, &mut un, &mut vn, &local, &params(), Walls::NONE);
        assert_eq!(un.get(0, 2, 2), 9.0);
        assert_eq!(vn.get(4, 4, 4), 9.0);
        assert_ne!(un.get(2, 2, 2), 9.0);
    }

    #[test]
    fn test_walls_mirror_boundary_cell() {
        let (topology, local) = decompose([4, 4, 4], 1, 0).unwrap();
        let walls = Walls::new(&topology, BoundaryCondition::Reflective);
        assert!(Face::ALL.iter().all(|&f| walls.has(f)));
        assert_eq!(Walls::new(&topology, BoundaryCondition::Fixed), Walls::NONE);

        // Uniform interior with garbage ghosts: walls hide the ghosts.
        let mut u = Field::new(local);
        u.fill(123.0);
        u.fill_interior(1.0);
        let v = Field::new(local);
        let mut un = Field::new(local);
        let mut vn = Field::new(local);
        step(&u, &v, &mut un, &mut vn, &local, &params(), walls);
        assert!(un.interior().all(|x| x == 1.0));
        assert!(vn.interior().all(|x| x == 0.0));
    }

    #[test]
    fn test_diffusion_conserves_mass_with_walls() {
        let (topology, local) = decompose([6, 5, 4], 1, 0).unwrap();
        let walls = Walls::new(&topology, BoundaryCondition::Reflective);
        let p = Parameters {
            du: 0.1,
            dv: 0.05,
            f: 0.0,
            k: 0.0,
            dt: 1.0,
        };
        let mut u = wavy(local, 0.0);
        let mut v = Field::new(local);
        let mut un = Field::new(local);
        let mut vn = Field::new(local);
        let before: f64 = u.interior().sum();
        for _ in 0..20 {
            step(&u, &v, &mut un, &mut vn, &local, &p, walls);
            std::mem::swap(&mut u, &mut un);
            std::mem::swap(&mut v, &mut vn);
        }
        let after: f64 = u.interior().sum();
        assert!((after - before).abs() < 1e-10 * before.abs().max(1.0));
    }
}
