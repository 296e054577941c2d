//! Entities attached to the arena: the phantom, the guidewire and its tip.
//!
//! The task only relies on the traits. The concrete types are small
//! procedural builders that are enough to drive the task from the CLI and
//! the tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nalgebra::{Isometry3, Point3, Translation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::config::GuidewireConfig;
use crate::mesh::{load_stl, ClosedMesh};
use crate::physics::Physics;
use crate::scene_option::{GUIDEWIRE_GROUP, PHANTOM_GROUP, TIP_GROUP};
use crate::world::{Actuator, Asset, Body, Geom, GeomShape, Joint, JointKind, Rgba, Site};
use crate::{NavigateError, Result};

/// Something that contributes a body fragment to the world.
pub trait Entity {
    /// Name of the entity's root body.
    fn name(&self) -> &str;

    /// The body fragment to attach.
    fn mjcf(&self) -> &Body;

    /// Assets the fragment references.
    fn assets(&self) -> Vec<Asset> {
        Vec::new()
    }

    /// Actuators driving the fragment's joints.
    fn actuators(&self) -> Vec<Actuator> {
        Vec::new()
    }
}

/// An anatomical phantom.
pub trait PhantomEntity: Entity {
    /// Named anchor points in world coordinates.
    fn sites(&self) -> BTreeMap<String, Point3<f64>>;

    /// The simplified, watertight lumen mesh, uniformly scaled.
    fn simplified_mesh(&self, scale: f64) -> Result<ClosedMesh>;

    /// Mutable access to the fragment, for site styling before attach.
    fn mjcf_mut(&mut self) -> &mut Body;
}

/// A guidewire that can carry a tip.
pub trait GuidewireEntity: Entity {
    /// Attach a tip to the distal end.
    fn attach(&mut self, tip: &dyn Entity) -> Result<()>;

    /// Move the wire's root to `position` in the live simulation.
    fn set_pose(&self, physics: &mut dyn Physics, position: Vector3<f64>) -> Result<()>;
}

// ============================================================================
// Phantom
// ============================================================================

/// Source of the simplified phantom mesh.
#[derive(Debug, Clone)]
enum SimplifiedSource {
    File(PathBuf),
    Memory(Arc<ClosedMesh>),
}

/// Phantom description file.
///
/// ```json
/// {
///   "name": "phantom3",
///   "mesh": "meshes/phantom3/visual.stl",
///   "simplified": "meshes/phantom3/simplified.stl",
///   "scale": 0.001,
///   "sites": { "bca": [0.0, 0.12, 0.0] }
/// }
/// ```
///
/// Relative paths are resolved against the description file's directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhantomSpec {
    /// Entity name.
    pub name: String,
    /// STL file of the visual/collision mesh.
    pub mesh: PathBuf,
    /// STL file of the simplified lumen; defaults to `mesh`.
    #[serde(default)]
    pub simplified: Option<PathBuf>,
    /// Scale applied when loading the meshes.
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Named anchor points in the phantom frame.
    #[serde(default)]
    pub sites: BTreeMap<String, [f64; 3]>,
}

fn default_scale() -> f64 {
    1.0
}

impl PhantomSpec {
    /// Load a description from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut spec: Self = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        if let Some(dir) = path.parent() {
            spec.mesh = dir.join(&spec.mesh);
            spec.simplified = spec.simplified.map(|p| dir.join(p));
        }
        Ok(spec)
    }
}

/// A phantom with one mesh geom and a set of sites.
#[derive(Debug, Clone)]
pub struct Phantom {
    name: String,
    body: Body,
    mesh: Arc<ClosedMesh>,
    simplified: SimplifiedSource,
    scale: f64,
}

impl Phantom {
    /// Build a phantom from an in-memory mesh.
    ///
    /// The mesh doubles as the simplified lumen.
    #[must_use]
    pub fn from_mesh(
        name: &str,
        mesh: ClosedMesh,
        sites: impl IntoIterator<Item = (String, Point3<f64>)>,
    ) -> Self {
        let mesh = Arc::new(mesh);
        Self::assemble(name, Arc::clone(&mesh), SimplifiedSource::Memory(mesh), 1.0, sites)
    }

    /// Load a phantom from a description.
    ///
    /// # Errors
    ///
    /// Fails if the mesh cannot be read or parsed.
    pub fn from_spec(spec: &PhantomSpec) -> Result<Self> {
        let mesh = Arc::new(load_stl(&spec.mesh, spec.scale)?);
        let simplified = spec.simplified.clone().unwrap_or_else(|| spec.mesh.clone());
        let sites = spec
            .sites
            .iter()
            .map(|(name, p)| (name.clone(), Point3::from(*p)));
        Ok(Self::assemble(
            &spec.name,
            mesh,
            SimplifiedSource::File(simplified),
            spec.scale,
            sites,
        ))
    }

    /// A straight box-shaped vessel with three branch sites, for demos and
    /// tests.
    #[must_use]
    pub fn demo() -> Self {
        let lumen = ClosedMesh::cuboid(Point3::new(-0.04, -0.01, -0.01), Point3::new(0.04, 0.22, 0.01));
        let sites = [
            ("bca", Point3::new(-0.02, 0.17, 0.0)),
            ("lcca", Point3::new(0.0, 0.19, 0.0)),
            ("lsa", Point3::new(0.02, 0.17, 0.0)),
        ];
        Self::from_mesh(
            "phantom",
            lumen,
            sites.into_iter().map(|(n, p)| (n.to_string(), p)),
        )
    }

    fn assemble(
        name: &str,
        mesh: Arc<ClosedMesh>,
        simplified: SimplifiedSource,
        scale: f64,
        sites: impl IntoIterator<Item = (String, Point3<f64>)>,
    ) -> Self {
        let mut body = Body::new(name).with_geom(
            Geom::new(
                format!("{name}/visual"),
                GeomShape::Mesh {
                    asset: name.to_string(),
                },
            )
            .with_group(PHANTOM_GROUP)
            .with_rgba([0.8, 0.6, 0.6, 0.3]),
        );
        for (site_name, pos) in sites {
            body = body.with_site(Site::new(site_name, pos.coords));
        }
        Self {
            name: name.to_string(),
            body,
            mesh,
            simplified,
            scale,
        }
    }
}

impl Entity for Phantom {
    fn name(&self) -> &str {
        &self.name
    }

    fn mjcf(&self) -> &Body {
        &self.body
    }

    fn assets(&self) -> Vec<Asset> {
        vec![Asset::Mesh {
            name: self.name.clone(),
            mesh: Arc::clone(&self.mesh),
        }]
    }
}

impl PhantomEntity for Phantom {
    fn sites(&self) -> BTreeMap<String, Point3<f64>> {
        let mut out = BTreeMap::new();
        collect_sites(&self.body, &Isometry3::identity(), &mut out);
        out
    }

    fn simplified_mesh(&self, scale: f64) -> Result<ClosedMesh> {
        match &self.simplified {
            // The file is stored in source units; apply the load scale first.
            SimplifiedSource::File(path) => load_stl(path, self.scale * scale),
            SimplifiedSource::Memory(mesh) => Ok(mesh.scaled(scale)),
        }
    }

    fn mjcf_mut(&mut self) -> &mut Body {
        &mut self.body
    }
}

fn collect_sites(body: &Body, parent: &Isometry3<f64>, out: &mut BTreeMap<String, Point3<f64>>) {
    let frame = parent * Isometry3::from_parts(Translation3::from(body.pos), body.rotation());
    for site in &body.sites {
        out.insert(site.name.clone(), frame * Point3::from(site.pos));
    }
    for child in &body.children {
        collect_sites(child, &frame, out);
    }
}

// ============================================================================
// Guidewire and tip
// ============================================================================

/// Name of the guidewire's root body.
pub const GUIDEWIRE_ROOT: &str = "guidewire";

const GUIDEWIRE_RGBA: Rgba = [0.2, 0.2, 0.2, 1.0];
const TIP_RGBA: Rgba = [0.1, 0.1, 0.6, 1.0];

/// A chain of sphere segments along +y.
///
/// The root carries a slide joint (insertion along y) and a hinge (twist
/// about y), each driven by a velocity actuator. Every further segment
/// bends about z relative to its parent.
#[derive(Debug, Clone)]
pub struct Guidewire {
    body: Body,
    offset: f64,
}

impl Guidewire {
    /// Build a wire from its geometry configuration.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid.
    pub fn new(config: &GuidewireConfig) -> Result<Self> {
        config.validate()?;
        let radius = config.sphere_radius();
        let offset = config.offset();

        let segment = |i: usize| {
            Body::new(format!("{GUIDEWIRE_ROOT}/body_{i}")).with_geom(
                Geom::new(format!("{GUIDEWIRE_ROOT}/geom_{i}"), GeomShape::Sphere { radius })
                    .with_group(GUIDEWIRE_GROUP)
                    .with_rgba(GUIDEWIRE_RGBA),
            )
        };

        // Build from the distal end inwards.
        let mut chain: Option<Body> = None;
        for i in (1..config.n_bodies).rev() {
            let mut body = segment(i)
                .with_pos(Vector3::new(0.0, offset, 0.0))
                .with_joint(Joint {
                    name: format!("{GUIDEWIRE_ROOT}/bend_{i}"),
                    kind: JointKind::Hinge,
                    axis: Vector3::z(),
                    range: Some((-0.5, 0.5)),
                });
            if let Some(child) = chain.take() {
                body = body.with_child(child);
            }
            chain = Some(body);
        }

        let mut first = segment(0);
        if let Some(chain) = chain {
            first = first.with_child(chain);
        }
        let root = Body::new(GUIDEWIRE_ROOT)
            .with_joint(Joint {
                name: format!("{GUIDEWIRE_ROOT}/slider"),
                kind: JointKind::Slide,
                axis: Vector3::y(),
                range: None,
            })
            .with_joint(Joint {
                name: format!("{GUIDEWIRE_ROOT}/rotator"),
                kind: JointKind::Hinge,
                axis: Vector3::y(),
                range: None,
            })
            .with_child(first);

        Ok(Self { body: root, offset })
    }
}

impl Entity for Guidewire {
    fn name(&self) -> &str {
        GUIDEWIRE_ROOT
    }

    fn mjcf(&self) -> &Body {
        &self.body
    }

    fn actuators(&self) -> Vec<Actuator> {
        ["slider", "rotator"]
            .iter()
            .map(|joint| Actuator {
                name: format!("{GUIDEWIRE_ROOT}/{joint}_actuator"),
                joint: format!("{GUIDEWIRE_ROOT}/{joint}"),
                gain: 1.0,
                ctrl_range: Some((-1.0, 1.0)),
            })
            .collect()
    }
}

impl GuidewireEntity for Guidewire {
    fn attach(&mut self, tip: &dyn Entity) -> Result<()> {
        let distal = self.body.last_descendant_mut();
        let mut fragment = tip.mjcf().clone();
        fragment.pos = Vector3::new(0.0, self.offset, 0.0);
        distal.children.push(fragment);
        Ok(())
    }

    fn set_pose(&self, physics: &mut dyn Physics, position: Vector3<f64>) -> Result<()> {
        physics.set_body_position(GUIDEWIRE_ROOT, position)?;
        Ok(())
    }
}

/// The distal tip: a short chain of smaller spheres.
#[derive(Debug, Clone)]
pub struct Tip {
    body: Body,
}

impl Tip {
    /// A tip of `n_segments` spheres sized from the wire configuration.
    ///
    /// # Errors
    ///
    /// Fails for zero segments or an invalid configuration.
    pub fn new(config: &GuidewireConfig, n_segments: usize) -> Result<Self> {
        config.validate()?;
        if n_segments == 0 {
            return Err(NavigateError::invalid_config("tip needs at least one segment"));
        }
        let radius = config.sphere_radius() * 0.8;
        let spacing = radius * 2.0;
        let mut body = Body::new("tip");
        for i in 0..n_segments {
            body = body.with_geom(
                Geom::new(format!("tip/geom_{i}"), GeomShape::Sphere { radius })
                    .with_pos(Vector3::new(0.0, spacing * i as f64, 0.0))
                    .with_group(TIP_GROUP)
                    .with_rgba(TIP_RGBA),
            );
        }
        Ok(Self { body })
    }
}

impl Entity for Tip {
    fn name(&self) -> &str {
        &self.body.name
    }

    fn mjcf(&self) -> &Body {
        &self.body
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_guidewire_chain_length() {
        let config = GuidewireConfig {
            n_bodies: 5,
            ..Default::default()
        };
        let wire = Guidewire::new(&config).unwrap();
        let bodies = wire.mjcf().descendants();
        // Root plus one body per segment.
        assert_eq!(bodies.len(), 6);
        let geoms: Vec<_> = bodies.iter().flat_map(|b| b.geoms.iter()).collect();
        assert_eq!(geoms.len(), 5);
        assert!(geoms.iter().all(|g| g.group == GUIDEWIRE_GROUP));
        assert!(geoms.iter().all(|g| g.name.contains("guidewire")));
        assert_eq!(wire.actuators().len(), 2);
    }

    #[test]
    fn test_tip_attaches_to_distal_end() {
        let config = GuidewireConfig {
            n_bodies: 3,
            ..Default::default()
        };
        let mut wire = Guidewire::new(&config).unwrap();
        let tip = Tip::new(&config, 2).unwrap();
        wire.attach(&tip).unwrap();

        let bodies = wire.mjcf().descendants();
        let last = bodies.last().unwrap();
        assert_eq!(last.name, "tip");
        assert_relative_eq!(last.pos.y, config.offset());
        assert!(last.geoms.iter().all(|g| g.group == TIP_GROUP));
    }

    #[test]
    fn test_phantom_sites_in_world_frame() {
        let mut phantom = Phantom::demo();
        phantom.mjcf_mut().pos = Vector3::new(1.0, 0.0, 0.0);
        let sites = phantom.sites();
        assert_eq!(sites.len(), 3);
        assert_relative_eq!(sites["lcca"], Point3::new(1.0, 0.19, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_in_memory_simplified_mesh_scales() {
        let phantom = Phantom::demo();
        let mesh = phantom.simplified_mesh(0.9).unwrap();
        let bounds = mesh.bounds().unwrap();
        assert_relative_eq!(bounds.max.y, 0.22 * 0.9, epsilon = 1e-12);
        assert_eq!(phantom.assets().len(), 1);
    }

    #[test]
    fn test_zero_segment_tip_rejected() {
        assert!(Tip::new(&GuidewireConfig::default(), 0).is_err());
    }

    #[test]
    fn test_phantom_spec_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phantom.json");
        std::fs::write(
            &path,
            r#"{"name": "p", "mesh": "visual.stl", "sites": {"a": [0.0, 1.0, 0.0]}}"#,
        )
        .unwrap();
        let spec = PhantomSpec::from_json_file(&path).unwrap();
        assert_eq!(spec.mesh, dir.path().join("visual.stl"));
        assert_eq!(spec.scale, 1.0);
        assert_eq!(spec.sites["a"], [0.0, 1.0, 0.0]);
        assert!(Phantom::from_spec(&spec).is_err());
    }
}
