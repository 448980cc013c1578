//! Halo exchange of one-cell ghost planes with the six face neighbors.
//!
//! Faces are packed into contiguous buffers before sending, so any
//! [`Transport`] works. All sends for a field go out before the first receive;
//! the call returns only once every existing neighbor's plane has landed.

use super::{Face, Field, ProcessTopology, Result, SimulationError, Transport};

/// Identifies which field a halo message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTag {
    U = 0,
    V = 1,
}

/// Tag of a message travelling through `face` (sender's view).
#[inline]
fn message_tag(field: FieldTag, travel: Face) -> u32 {
    field as u32 * 6 + travel.index() as u32
}

/// The two in-plane axes of `axis`, lower first.
#[inline]
fn plane_axes(axis: usize) -> (usize, usize) {
    match axis {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    }
}

/// Layer index perpendicular to `face`: the outermost interior layer, or the
/// ghost layer beyond it.
#[inline]
fn layer(field: &Field, face: Face, ghost: bool) -> usize {
    let size = field.local().size[face.axis()];
    match (face.is_high(), ghost) {
        (false, false) => 1,
        (false, true) => 0,
        (true, false) => size,
        (true, true) => size + 1,
    }
}

/// Number of cells in the interior part of the plane perpendicular to `face`.
#[inline]
pub fn plane_len(field: &Field, face: Face) -> usize {
    let (a, b) = plane_axes(face.axis());
    let size = field.local().size;
    size[a] * size[b]
}

/// Copy the boundary interior plane on `face` into `buf`.
pub fn pack_face(field: &Field, face: Face, buf: &mut Vec<f64>) {
    let axis = face.axis();
    let (a, b) = plane_axes(axis);
    let size = field.local().size;
    let mut c = [0usize; 3];
    c[axis] = layer(field, face, false);

    buf.clear();
    buf.reserve(size[a] * size[b]);
    for j in 1..=size[b] {
        c[b] = j;
        for i in 1..=size[a] {
            c[a] = i;
            buf.push(field.at(c));
        }
    }
}

/// Write `data` into the ghost plane on `face`.
pub fn unpack_face(field: &mut Field, face: Face, data: &[f64]) {
    let axis = face.axis();
    let (a, b) = plane_axes(axis);
    let size = field.local().size;
    let mut c = [0usize; 3];
    c[axis] = layer(field, face, true);

    let mut values = data.iter();
    for j in 1..=size[b] {
        c[b] = j;
        for i in 1..=size[a] {
            c[a] = i;
            if let Some(&v) = values.next() {
                *field.at_mut(c) = v;
            }
        }
    }
}

/// Refresh the ghost layer of `field` from the face neighbors in `topology`.
///
/// Faces on the domain boundary are skipped and their ghost planes keep
/// whatever they held.
pub fn exchange<T: Transport + ?Sized>(
    field: &mut Field,
    tag: FieldTag,
    topology: &ProcessTopology,
    transport: &mut T,
) -> Result<()> {
    for face in Face::ALL {
        if let Some(dest) = topology.neighbor(face) {
            let mut buf = Vec::new();
            pack_face(field, face, &mut buf);
            transport.send(dest, message_tag(tag, face), buf)?;
        }
    }

    for face in Face::ALL {
        let Some(source) = topology.neighbor(face) else {
            continue;
        };
        // The neighbor on our `face` sent its plane travelling the other way.
        let data = transport.recv(source, message_tag(tag, face.opposite()))?;
        let expected = plane_len(field, face);
        if data.len() != expected {
            return Err(SimulationError::communication(
                source,
                format!(
                    "halo plane for {:?} has {} values, expected {}",
                    face,
                    data.len(),
                    expected
                ),
            ));
        }
        unpack_face(field, face, &data);
    }

    log::trace!(
        "rank {} exchanged {:?} halos with {:?}",
        topology.rank,
        tag,
        topology.neighbors
    );
    Ok(())
}
