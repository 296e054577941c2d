//! STL loading (ASCII and binary).
//!
//! Binary layout:
//!
//! ```text
//! UINT8[80]    – Header
//! UINT32       – Number of triangles
//! foreach triangle
//!     REAL32[3] – Normal (ignored)
//!     REAL32[3] – Vertex 1..3
//!     UINT16    – Attribute byte count
//! end
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::Path;

use nalgebra::Point3;

use super::ClosedMesh;
use crate::{NavigateError, Result};

const HEADER_SIZE: usize = 80;
const TRIANGLE_SIZE: usize = 50;

/// Load an STL file and scale its vertices uniformly.
///
/// Vertices are not welded: each facet contributes three vertices, which is
/// all the volume queries need.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid STL.
pub fn load_stl(path: impl AsRef<Path>, scale: f64) -> Result<ClosedMesh> {
    let path = path.as_ref();
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;

    if bytes.len() < 6 {
        return Err(NavigateError::invalid_mesh(path, "file too small to be STL"));
    }

    let mesh = if looks_ascii(&bytes) {
        parse_ascii(BufReader::new(Cursor::new(&bytes)), path)?
    } else {
        parse_binary(&bytes, path)?
    };

    Ok(if (scale - 1.0).abs() > f64::EPSILON {
        mesh.scaled(scale)
    } else {
        mesh
    })
}

/// ASCII files start with `solid` and have no NUL bytes in the header.
fn looks_ascii(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(HEADER_SIZE)];
    let starts_solid = String::from_utf8_lossy(head).trim_start().starts_with("solid");
    starts_solid && !head.contains(&0)
}

fn parse_binary(bytes: &[u8], path: &Path) -> Result<ClosedMesh> {
    let count_bytes = bytes
        .get(HEADER_SIZE..HEADER_SIZE + 4)
        .ok_or_else(|| NavigateError::invalid_mesh(path, "truncated binary header"))?;
    let face_count = u32::from_le_bytes([
        count_bytes[0],
        count_bytes[1],
        count_bytes[2],
        count_bytes[3],
    ]) as usize;

    let body = &bytes[HEADER_SIZE + 4..];
    if body.len() < face_count * TRIANGLE_SIZE {
        return Err(NavigateError::invalid_mesh(
            path,
            format!(
                "expected {face_count} triangles, found {}",
                body.len() / TRIANGLE_SIZE
            ),
        ));
    }

    let mut vertices = Vec::with_capacity(face_count * 3);
    let mut faces = Vec::with_capacity(face_count);
    for tri in body.chunks_exact(TRIANGLE_SIZE).take(face_count) {
        #[allow(clippy::cast_possible_truncation)]
        let base = vertices.len() as u32;
        // Skip the 12-byte normal
        vertices.push(read_vertex(&tri[12..24]));
        vertices.push(read_vertex(&tri[24..36]));
        vertices.push(read_vertex(&tri[36..48]));
        faces.push([base, base + 1, base + 2]);
    }
    Ok(ClosedMesh::from_parts(vertices, faces))
}

fn read_vertex(buf: &[u8]) -> Point3<f64> {
    let f = |i: usize| f64::from(f32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]));
    Point3::new(f(0), f(4), f(8))
}

fn parse_ascii<R: BufRead>(reader: R, path: &Path) -> Result<ClosedMesh> {
    let mut vertices = Vec::new();
    let mut faces = Vec::new();
    let mut pending: Vec<Point3<f64>> = Vec::with_capacity(3);

    for line in reader.lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("vertex") => {
                let coords: Vec<f64> = parts
                    .map(str::parse)
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| NavigateError::invalid_mesh(path, format!("bad vertex: {e}")))?;
                if coords.len() != 3 {
                    return Err(NavigateError::invalid_mesh(
                        path,
                        format!("vertex needs 3 coordinates, got {}", coords.len()),
                    ));
                }
                pending.push(Point3::new(coords[0], coords[1], coords[2]));
            }
            Some("endloop") => {
                if pending.len() != 3 {
                    return Err(NavigateError::invalid_mesh(
                        path,
                        format!("facet with {} vertices", pending.len()),
                    ));
                }
                #[allow(clippy::cast_possible_truncation)]
                let base = vertices.len() as u32;
                vertices.append(&mut pending);
                faces.push([base, base + 1, base + 2]);
            }
            _ => {}
        }
    }

    if faces.is_empty() {
        return Err(NavigateError::invalid_mesh(path, "no facets"));
    }
    Ok(ClosedMesh::from_parts(vertices, faces))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_binary(mesh: &ClosedMesh, path: &Path) {
        let mut out = vec![0u8; HEADER_SIZE];
        #[allow(clippy::cast_possible_truncation)]
        out.extend_from_slice(&(mesh.faces.len() as u32).to_le_bytes());
        for tri in mesh.triangles() {
            out.extend_from_slice(&[0u8; 12]);
            for v in tri {
                for c in [v.x, v.y, v.z] {
                    #[allow(clippy::cast_possible_truncation)]
                    out.extend_from_slice(&(c as f32).to_le_bytes());
                }
            }
            out.extend_from_slice(&[0u8; 2]);
        }
        std::fs::write(path, out).unwrap();
    }

    #[test]
    fn test_binary_with_scale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.stl");
        let cube = ClosedMesh::cuboid(Point3::origin(), Point3::new(1.0, 2.0, 4.0));
        write_binary(&cube, &path);

        let loaded = load_stl(&path, 0.5).unwrap();
        assert_eq!(loaded.faces.len(), 12);
        let b = loaded.bounds().unwrap();
        assert_eq!(b.max, Point3::new(0.5, 1.0, 2.0));
        assert!(loaded.contains(&Point3::new(0.25, 0.5, 1.0)));
    }

    #[test]
    fn test_ascii() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tri.stl");
        let mut f = File::create(&path).unwrap();
        writeln!(
            f,
            "solid t\n facet normal 0 0 1\n  outer loop\n   vertex 0 0 0\n   vertex 1 0 0\n   vertex 0 1 0\n  endloop\n endfacet\nendsolid t"
        )
        .unwrap();

        let mesh = load_stl(&path, 1.0).unwrap();
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
        assert_eq!(mesh.vertices[1], Point3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_truncated_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.stl");
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes.extend_from_slice(&5u32.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        let err = load_stl(&path, 1.0).unwrap_err();
        assert!(matches!(err, NavigateError::InvalidMesh { .. }));
    }
}
