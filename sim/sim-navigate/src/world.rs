//! World description tree.
//!
//! A typed, in-memory version of an MJCF document: global settings, assets
//! and a body tree holding geoms, sites, cameras, lights and joints. The
//! arena builds the static part; entities contribute body fragments through
//! [`WorldTree::attach`]. Backends compile the finished tree into a live
//! physics handle (see [`crate::CompilePhysics`]).

use std::sync::Arc;

use nalgebra::{Point3, UnitQuaternion, Vector3};

use crate::config::{CompilerConfig, OptionConfig, VisualConfig};
use crate::mesh::ClosedMesh;
use crate::{NavigateError, Result};

/// RGBA colour with components in `[0, 1]`.
pub type Rgba = [f64; 4];

// ============================================================================
// Element kinds and attributes
// ============================================================================

/// Kind of a named element in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// `<body>`.
    Body,
    /// `<geom>`.
    Geom,
    /// `<site>`.
    Site,
    /// `<camera>`.
    Camera,
    /// `<joint>`.
    Joint,
    /// `<texture>` or `<mesh>` asset.
    Asset,
    /// `<actuator>` entry.
    Actuator,
}

impl ElementKind {
    /// Lowercase element name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::Geom => "geom",
            Self::Site => "site",
            Self::Camera => "camera",
            Self::Joint => "joint",
            Self::Asset => "asset",
            Self::Actuator => "actuator",
        }
    }
}

/// Attribute that structural variation can rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Colour (`rgba`, 4 values).
    Rgba,
    /// Size (`size`; radius, or radius and half-length for capsules).
    Size,
    /// Position relative to the parent body (`pos`, 3 values).
    Position,
}

impl Attribute {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Rgba => "rgba",
            Self::Size => "size",
            Self::Position => "pos",
        }
    }
}

// ============================================================================
// Elements
// ============================================================================

/// Geometry shape.
#[derive(Debug, Clone, PartialEq)]
pub enum GeomShape {
    /// Sphere with the given radius.
    Sphere {
        /// Radius (m).
        radius: f64,
    },
    /// Capsule aligned with the local z axis.
    Capsule {
        /// Radius (m).
        radius: f64,
        /// Half-length of the cylindrical part (m).
        half_length: f64,
    },
    /// Triangle mesh referencing a mesh asset by name.
    Mesh {
        /// Name of the mesh asset.
        asset: String,
    },
}

/// A `<geom>` element.
#[derive(Debug, Clone, PartialEq)]
pub struct Geom {
    /// Geom name.
    pub name: String,
    /// Shape.
    pub shape: GeomShape,
    /// Position relative to the owning body.
    pub pos: Vector3<f64>,
    /// Visibility group.
    pub group: usize,
    /// Colour.
    pub rgba: Rgba,
}

impl Geom {
    /// Create a geom at the body origin, group 0, grey.
    #[must_use]
    pub fn new(name: impl Into<String>, shape: GeomShape) -> Self {
        Self {
            name: name.into(),
            shape,
            pos: Vector3::zeros(),
            group: 0,
            rgba: [0.5, 0.5, 0.5, 1.0],
        }
    }

    /// Set the visibility group.
    #[must_use]
    pub fn with_group(mut self, group: usize) -> Self {
        self.group = group;
        self
    }

    /// Set the colour.
    #[must_use]
    pub fn with_rgba(mut self, rgba: Rgba) -> Self {
        self.rgba = rgba;
        self
    }

    /// Set the position relative to the body.
    #[must_use]
    pub fn with_pos(mut self, pos: Vector3<f64>) -> Self {
        self.pos = pos;
        self
    }
}

/// A `<site>` element: a named anchor point without physics.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    /// Site name.
    pub name: String,
    /// Position relative to the owning body.
    pub pos: Vector3<f64>,
    /// Colour; `None` uses the tree's site default.
    pub rgba: Option<Rgba>,
    /// Radius; `None` uses the tree's site default.
    pub size: Option<f64>,
}

impl Site {
    /// Create a site with default appearance.
    #[must_use]
    pub fn new(name: impl Into<String>, pos: Vector3<f64>) -> Self {
        Self {
            name: name.into(),
            pos,
            rgba: None,
            size: None,
        }
    }
}

/// A `<camera>` element.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Camera name.
    pub name: String,
    /// Position relative to the owning body.
    pub pos: Vector3<f64>,
    /// Orientation as XYZ euler angles (radians).
    pub euler: Vector3<f64>,
    /// Vertical field of view (degrees).
    pub fovy: f64,
}

impl Camera {
    /// Orientation as a quaternion.
    #[must_use]
    pub fn rotation(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_euler_angles(self.euler.x, self.euler.y, self.euler.z)
    }
}

/// A `<light>` element.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    /// Position.
    pub pos: Vector3<f64>,
    /// Direction the light points to.
    pub dir: Vector3<f64>,
    /// Whether the light casts shadows.
    pub cast_shadow: bool,
}

/// Joint type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointKind {
    /// Translation along the axis.
    Slide,
    /// Rotation about the axis.
    Hinge,
}

/// A `<joint>` element.
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    /// Joint name.
    pub name: String,
    /// Joint type.
    pub kind: JointKind,
    /// Joint axis in the body frame.
    pub axis: Vector3<f64>,
    /// Optional position limits.
    pub range: Option<(f64, f64)>,
}

/// A velocity actuator driving one joint.
#[derive(Debug, Clone, PartialEq)]
pub struct Actuator {
    /// Actuator name.
    pub name: String,
    /// Name of the driven joint.
    pub joint: String,
    /// Control-to-velocity gain.
    pub gain: f64,
    /// Optional control clamp.
    pub ctrl_range: Option<(f64, f64)>,
}

/// A `<body>` element and its subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    /// Body name.
    pub name: String,
    /// Position relative to the parent body.
    pub pos: Vector3<f64>,
    /// Orientation as XYZ euler angles (radians).
    pub euler: Vector3<f64>,
    /// Joints connecting this body to its parent.
    pub joints: Vec<Joint>,
    /// Geoms.
    pub geoms: Vec<Geom>,
    /// Sites.
    pub sites: Vec<Site>,
    /// Cameras.
    pub cameras: Vec<Camera>,
    /// Lights.
    pub lights: Vec<Light>,
    /// Child bodies.
    pub children: Vec<Body>,
}

impl Body {
    /// Create an empty body at the parent origin.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pos: Vector3::zeros(),
            euler: Vector3::zeros(),
            joints: Vec::new(),
            geoms: Vec::new(),
            sites: Vec::new(),
            cameras: Vec::new(),
            lights: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Set position.
    #[must_use]
    pub fn with_pos(mut self, pos: Vector3<f64>) -> Self {
        self.pos = pos;
        self
    }

    /// Add a geom.
    #[must_use]
    pub fn with_geom(mut self, geom: Geom) -> Self {
        self.geoms.push(geom);
        self
    }

    /// Add a site.
    #[must_use]
    pub fn with_site(mut self, site: Site) -> Self {
        self.sites.push(site);
        self
    }

    /// Add a joint.
    #[must_use]
    pub fn with_joint(mut self, joint: Joint) -> Self {
        self.joints.push(joint);
        self
    }

    /// Add a child body.
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// Orientation as a quaternion.
    #[must_use]
    pub fn rotation(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_euler_angles(self.euler.x, self.euler.y, self.euler.z)
    }

    /// Position as a point.
    #[must_use]
    pub fn position(&self) -> Point3<f64> {
        Point3::from(self.pos)
    }

    /// Depth-first list of this body and all descendants.
    #[must_use]
    pub fn descendants(&self) -> Vec<&Self> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.descendants());
        }
        out
    }

    /// Find a body by name in this subtree.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Self> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    /// Find a body by name in this subtree (mutable).
    pub fn find_mut(&mut self, name: &str) -> Option<&mut Self> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(name))
    }

    /// Deepest last descendant (the distal end of a chain).
    pub fn last_descendant_mut(&mut self) -> &mut Self {
        if self.children.is_empty() {
            return self;
        }
        let last = self.children.len() - 1;
        self.children[last].last_descendant_mut()
    }

    /// Visit every site in this subtree.
    pub fn for_each_site_mut(&mut self, f: &mut dyn FnMut(&mut Site)) {
        for site in &mut self.sites {
            f(site);
        }
        for child in &mut self.children {
            child.for_each_site_mut(f);
        }
    }

    fn names(&self, kind: ElementKind) -> Vec<&str> {
        let mut out = Vec::new();
        for body in self.descendants() {
            match kind {
                ElementKind::Body => out.push(body.name.as_str()),
                ElementKind::Geom => out.extend(body.geoms.iter().map(|g| g.name.as_str())),
                ElementKind::Site => out.extend(body.sites.iter().map(|s| s.name.as_str())),
                ElementKind::Camera => out.extend(body.cameras.iter().map(|c| c.name.as_str())),
                ElementKind::Joint => out.extend(body.joints.iter().map(|j| j.name.as_str())),
                ElementKind::Asset | ElementKind::Actuator => {}
            }
        }
        out.retain(|n| !n.is_empty());
        out
    }

    fn find_geom_mut(&mut self, name: &str) -> Option<&mut Geom> {
        if let Some(geom) = self.geoms.iter_mut().find(|g| g.name == name) {
            return Some(geom);
        }
        self.children.iter_mut().find_map(|c| c.find_geom_mut(name))
    }

    fn find_site_mut(&mut self, name: &str) -> Option<&mut Site> {
        if let Some(site) = self.sites.iter_mut().find(|s| s.name == name) {
            return Some(site);
        }
        self.children.iter_mut().find_map(|c| c.find_site_mut(name))
    }
}

// ============================================================================
// Assets and defaults
// ============================================================================

/// Built-in texture generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureBuiltin {
    /// Vertical gradient between `rgb1` and `rgb2`.
    Gradient,
    /// Checker pattern.
    Checker,
    /// Flat `rgb1`.
    Flat,
}

/// Texture usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    /// Environment cube map.
    Skybox,
    /// 2D texture for materials.
    TwoD,
}

/// A `<texture>` asset.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    /// Usage.
    pub kind: TextureKind,
    /// Generator.
    pub builtin: TextureBuiltin,
    /// First colour.
    pub rgb1: [f64; 3],
    /// Second colour.
    pub rgb2: [f64; 3],
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
}

/// An asset referenced by elements.
#[derive(Debug, Clone, PartialEq)]
pub enum Asset {
    /// Texture.
    Texture(Texture),
    /// Named triangle mesh.
    Mesh {
        /// Asset name.
        name: String,
        /// Mesh data.
        mesh: Arc<ClosedMesh>,
    },
}

/// Default appearance of sites (`<default><site>`).
#[derive(Debug, Clone, PartialEq)]
pub struct SiteDefaults {
    /// Radius of the sphere drawn for a site.
    pub size: f64,
    /// Colour.
    pub rgba: Rgba,
}

impl Default for SiteDefaults {
    fn default() -> Self {
        Self {
            size: 0.005,
            rgba: [0.5, 0.5, 0.5, 1.0],
        }
    }
}

// ============================================================================
// Handles
// ============================================================================

/// Handle to a camera added to the worldbody.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CameraHandle(usize);

/// Handle to a light added to the worldbody.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightHandle(usize);

/// Handle to a site added to the worldbody.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SiteHandle(usize);

// ============================================================================
// Tree
// ============================================================================

/// A complete world description.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldTree {
    /// Model name.
    pub model: String,
    /// Compiler settings.
    pub compiler: CompilerConfig,
    /// Simulation options.
    pub option: OptionConfig,
    /// Visualization settings.
    pub visual: VisualConfig,
    /// Default site appearance.
    pub site_default: SiteDefaults,
    /// Assets.
    pub assets: Vec<Asset>,
    /// Root of the body tree.
    pub worldbody: Body,
    /// Actuators in control order.
    pub actuators: Vec<Actuator>,
}

impl WorldTree {
    /// Create an empty tree with default settings.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            compiler: CompilerConfig::default(),
            option: OptionConfig::default(),
            visual: VisualConfig::default(),
            site_default: SiteDefaults::default(),
            assets: Vec::new(),
            worldbody: Body::new("world"),
            actuators: Vec::new(),
        }
    }

    fn ensure_unique(&self, kind: ElementKind, name: &str) -> Result<()> {
        let taken = match kind {
            ElementKind::Actuator => self.actuators.iter().any(|a| a.name == name),
            ElementKind::Asset => self.assets.iter().any(|a| match a {
                Asset::Mesh { name: n, .. } => n == name,
                Asset::Texture(_) => false,
            }),
            _ => self.worldbody.names(kind).contains(&name),
        };
        if taken {
            return Err(NavigateError::DuplicateElement {
                kind: kind.as_str(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Add a camera to the worldbody.
    pub fn add_camera(&mut self, camera: Camera) -> Result<CameraHandle> {
        self.ensure_unique(ElementKind::Camera, &camera.name)?;
        self.worldbody.cameras.push(camera);
        Ok(CameraHandle(self.worldbody.cameras.len() - 1))
    }

    /// Add a light to the worldbody.
    pub fn add_light(&mut self, light: Light) -> LightHandle {
        self.worldbody.lights.push(light);
        LightHandle(self.worldbody.lights.len() - 1)
    }

    /// Add a site to the worldbody.
    pub fn add_site(&mut self, site: Site) -> Result<SiteHandle> {
        self.ensure_unique(ElementKind::Site, &site.name)?;
        self.worldbody.sites.push(site);
        Ok(SiteHandle(self.worldbody.sites.len() - 1))
    }

    /// Add an asset.
    pub fn add_asset(&mut self, asset: Asset) -> Result<()> {
        if let Asset::Mesh { name, .. } = &asset {
            self.ensure_unique(ElementKind::Asset, name)?;
        }
        self.assets.push(asset);
        Ok(())
    }

    /// Add an actuator for a joint already in the tree.
    pub fn add_actuator(&mut self, actuator: Actuator) -> Result<()> {
        self.ensure_unique(ElementKind::Actuator, &actuator.name)?;
        if !self
            .worldbody
            .names(ElementKind::Joint)
            .contains(&actuator.joint.as_str())
        {
            return Err(NavigateError::ElementNotFound {
                kind: ElementKind::Joint.as_str(),
                name: actuator.joint,
            });
        }
        self.actuators.push(actuator);
        Ok(())
    }

    /// Attach an entity fragment below the worldbody.
    ///
    /// Fails without modifying the tree if any body, geom, site, camera or
    /// joint name in the fragment is already taken.
    pub fn attach(&mut self, fragment: Body) -> Result<()> {
        for kind in [
            ElementKind::Body,
            ElementKind::Geom,
            ElementKind::Site,
            ElementKind::Camera,
            ElementKind::Joint,
        ] {
            let mut seen: Vec<&str> = Vec::new();
            for name in fragment.names(kind) {
                if seen.contains(&name) {
                    return Err(NavigateError::DuplicateElement {
                        kind: kind.as_str(),
                        name: name.to_string(),
                    });
                }
                self.ensure_unique(kind, name)?;
                seen.push(name);
            }
        }
        self.worldbody.children.push(fragment);
        Ok(())
    }

    /// Camera added through [`Self::add_camera`].
    #[must_use]
    pub fn camera(&self, handle: CameraHandle) -> Option<&Camera> {
        self.worldbody.cameras.get(handle.0)
    }

    /// Light added through [`Self::add_light`].
    #[must_use]
    pub fn light(&self, handle: LightHandle) -> Option<&Light> {
        self.worldbody.lights.get(handle.0)
    }

    /// Site added through [`Self::add_site`].
    #[must_use]
    pub fn site(&self, handle: SiteHandle) -> Option<&Site> {
        self.worldbody.sites.get(handle.0)
    }

    /// All cameras in depth-first order; the index is the camera id.
    #[must_use]
    pub fn cameras(&self) -> Vec<&Camera> {
        self.worldbody
            .descendants()
            .into_iter()
            .flat_map(|b| b.cameras.iter())
            .collect()
    }

    /// All geoms in depth-first order; the index is the geom id.
    #[must_use]
    pub fn geoms(&self) -> Vec<&Geom> {
        self.worldbody
            .descendants()
            .into_iter()
            .flat_map(|b| b.geoms.iter())
            .collect()
    }

    /// Id of the camera with the given name.
    #[must_use]
    pub fn camera_index(&self, name: &str) -> Option<usize> {
        self.cameras().iter().position(|c| c.name == name)
    }

    /// Sites in the subtree of a named body, depth-first.
    pub fn sites_under(&self, body: &str) -> Result<Vec<&Site>> {
        let root = self
            .worldbody
            .find(body)
            .ok_or_else(|| NavigateError::ElementNotFound {
                kind: ElementKind::Body.as_str(),
                name: body.to_string(),
            })?;
        Ok(root
            .descendants()
            .into_iter()
            .flat_map(|b| b.sites.iter())
            .collect())
    }

    /// Find a site anywhere in the tree.
    #[must_use]
    pub fn find_site(&self, name: &str) -> Option<&Site> {
        self.worldbody
            .descendants()
            .into_iter()
            .find_map(|b| b.sites.iter().find(|s| s.name == name))
    }

    /// Find a body anywhere in the tree.
    #[must_use]
    pub fn find_body(&self, name: &str) -> Option<&Body> {
        self.worldbody.find(name)
    }

    /// Find a body anywhere in the tree (mutable).
    pub fn find_body_mut(&mut self, name: &str) -> Option<&mut Body> {
        self.worldbody.find_mut(name)
    }

    /// Mesh asset by name.
    #[must_use]
    pub fn mesh_asset(&self, name: &str) -> Option<&Arc<ClosedMesh>> {
        self.assets.iter().find_map(|a| match a {
            Asset::Mesh { name: n, mesh } if n == name => Some(mesh),
            _ => None,
        })
    }

    /// Read an attribute of a named element.
    pub fn attribute(&self, kind: ElementKind, name: &str, attribute: Attribute) -> Result<Vec<f64>> {
        let mut copy = self.clone();
        copy.attribute_slot(kind, name, attribute, None)
    }

    /// Overwrite an attribute of a named element.
    pub fn set_attribute(
        &mut self,
        kind: ElementKind,
        name: &str,
        attribute: Attribute,
        value: &[f64],
    ) -> Result<()> {
        self.attribute_slot(kind, name, attribute, Some(value))
            .map(|_| ())
    }

    /// Shared read/write path: returns the value before any write.
    fn attribute_slot(
        &mut self,
        kind: ElementKind,
        name: &str,
        attribute: Attribute,
        write: Option<&[f64]>,
    ) -> Result<Vec<f64>> {
        let site_default = self.site_default.clone();
        let not_found = || NavigateError::ElementNotFound {
            kind: kind.as_str(),
            name: name.to_string(),
        };
        let unsupported = || {
            NavigateError::invalid_config(format!(
                "{} has no variable attribute '{}'",
                kind.as_str(),
                attribute.as_str()
            ))
        };

        match kind {
            ElementKind::Geom => {
                let geom = self.worldbody.find_geom_mut(name).ok_or_else(not_found)?;
                match attribute {
                    Attribute::Rgba => {
                        let old = geom.rgba.to_vec();
                        if let Some(v) = write {
                            geom.rgba = to_array::<4>(v, "rgba")?;
                        }
                        Ok(old)
                    }
                    Attribute::Position => {
                        let old = geom.pos.as_slice().to_vec();
                        if let Some(v) = write {
                            geom.pos = Vector3::from(to_array::<3>(v, "pos")?);
                        }
                        Ok(old)
                    }
                    Attribute::Size => match &mut geom.shape {
                        GeomShape::Sphere { radius } => {
                            let old = vec![*radius];
                            if let Some(v) = write {
                                *radius = to_array::<1>(v, "size")?[0];
                            }
                            Ok(old)
                        }
                        GeomShape::Capsule {
                            radius,
                            half_length,
                        } => {
                            let old = vec![*radius, *half_length];
                            if let Some(v) = write {
                                let [r, h] = to_array::<2>(v, "size")?;
                                *radius = r;
                                *half_length = h;
                            }
                            Ok(old)
                        }
                        GeomShape::Mesh { .. } => Err(unsupported()),
                    },
                }
            }
            ElementKind::Site => {
                let site = self.worldbody.find_site_mut(name).ok_or_else(not_found)?;
                match attribute {
                    Attribute::Rgba => {
                        let old = site.rgba.unwrap_or(site_default.rgba).to_vec();
                        if let Some(v) = write {
                            site.rgba = Some(to_array::<4>(v, "rgba")?);
                        }
                        Ok(old)
                    }
                    Attribute::Size => {
                        let old = vec![site.size.unwrap_or(site_default.size)];
                        if let Some(v) = write {
                            site.size = Some(to_array::<1>(v, "size")?[0]);
                        }
                        Ok(old)
                    }
                    Attribute::Position => {
                        let old = site.pos.as_slice().to_vec();
                        if let Some(v) = write {
                            site.pos = Vector3::from(to_array::<3>(v, "pos")?);
                        }
                        Ok(old)
                    }
                }
            }
            ElementKind::Body => {
                let body = self.worldbody.find_mut(name).ok_or_else(not_found)?;
                match attribute {
                    Attribute::Position => {
                        let old = body.pos.as_slice().to_vec();
                        if let Some(v) = write {
                            body.pos = Vector3::from(to_array::<3>(v, "pos")?);
                        }
                        Ok(old)
                    }
                    Attribute::Rgba | Attribute::Size => Err(unsupported()),
                }
            }
            ElementKind::Camera
            | ElementKind::Joint
            | ElementKind::Asset
            | ElementKind::Actuator => Err(unsupported()),
        }
    }
}

fn to_array<const N: usize>(values: &[f64], attribute: &str) -> Result<[f64; N]> {
    values.try_into().map_err(|_| {
        NavigateError::invalid_config(format!(
            "attribute '{attribute}' expects {N} values, got {}",
            values.len()
        ))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn sphere(name: &str) -> Geom {
        Geom::new(name, GeomShape::Sphere { radius: 0.01 })
    }

    fn camera(name: &str) -> Camera {
        Camera {
            name: name.to_string(),
            pos: Vector3::zeros(),
            euler: Vector3::zeros(),
            fovy: 45.0,
        }
    }

    #[test]
    fn test_camera_names_unique() {
        let mut world = WorldTree::new("test");
        let handle = world.add_camera(camera("top")).unwrap();
        assert_eq!(world.camera(handle).map(|c| c.name.as_str()), Some("top"));

        let err = world.add_camera(camera("top")).unwrap_err();
        assert!(matches!(err, NavigateError::DuplicateElement { kind: "camera", .. }));
        assert_eq!(world.cameras().len(), 1);
    }

    #[test]
    fn test_attach_rejects_clashing_fragment() {
        let mut world = WorldTree::new("test");
        world
            .attach(Body::new("a").with_geom(sphere("g0")))
            .unwrap();

        let clash = Body::new("b").with_geom(sphere("g0"));
        assert!(world.attach(clash).is_err());
        assert!(world.find_body("b").is_none());

        let internal = Body::new("c")
            .with_geom(sphere("g1"))
            .with_child(Body::new("c").with_geom(sphere("g2")));
        assert!(world.attach(internal).is_err());
    }

    #[test]
    fn test_geoms_depth_first() {
        let mut world = WorldTree::new("test");
        world
            .attach(
                Body::new("root")
                    .with_geom(sphere("g0"))
                    .with_child(Body::new("child").with_geom(sphere("g1"))),
            )
            .unwrap();
        world.attach(Body::new("other").with_geom(sphere("g2"))).unwrap();

        let names: Vec<_> = world.geoms().iter().map(|g| g.name.clone()).collect();
        assert_eq!(names, vec!["g0", "g1", "g2"]);
    }

    #[test]
    fn test_site_attribute_uses_defaults() {
        let mut world = WorldTree::new("test");
        world.site_default.rgba = [0.8, 0.8, 0.8, 0.0];
        world.add_site(Site::new("s", Vector3::zeros())).unwrap();

        let rgba = world.attribute(ElementKind::Site, "s", Attribute::Rgba).unwrap();
        assert_eq!(rgba, vec![0.8, 0.8, 0.8, 0.0]);

        world
            .set_attribute(ElementKind::Site, "s", Attribute::Rgba, &[1.0, 0.0, 0.0, 1.0])
            .unwrap();
        assert_eq!(world.find_site("s").unwrap().rgba, Some([1.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_attribute_arity_checked() {
        let mut world = WorldTree::new("test");
        world.attach(Body::new("b").with_geom(sphere("g"))).unwrap();
        let err = world
            .set_attribute(ElementKind::Geom, "g", Attribute::Rgba, &[1.0, 0.0])
            .unwrap_err();
        assert!(err.is_config_error());

        let missing = world.attribute(ElementKind::Geom, "nope", Attribute::Rgba);
        assert!(matches!(missing, Err(NavigateError::ElementNotFound { .. })));
    }

    #[test]
    fn test_camera_index_and_sites_under() {
        let mut world = WorldTree::new("test");
        world.add_camera(camera("a")).unwrap();
        world.add_camera(camera("b")).unwrap();
        assert_eq!(world.camera_index("b"), Some(1));
        assert_eq!(world.camera_index("c"), None);

        world
            .attach(
                Body::new("phantom")
                    .with_site(Site::new("s0", Vector3::zeros()))
                    .with_child(Body::new("inner").with_site(Site::new("s1", Vector3::x()))),
            )
            .unwrap();
        let names: Vec<_> = world
            .sites_under("phantom")
            .unwrap()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["s0", "s1"]);
        assert!(world.sites_under("nope").is_err());
    }

    #[test]
    fn test_actuator_needs_joint() {
        let mut world = WorldTree::new("test");
        world
            .attach(Body::new("slider").with_joint(Joint {
                name: "slide".to_string(),
                kind: JointKind::Slide,
                axis: Vector3::y(),
                range: None,
            }))
            .unwrap();
        let actuator = |joint: &str| Actuator {
            name: "act".to_string(),
            joint: joint.to_string(),
            gain: 1.0,
            ctrl_range: None,
        };
        assert!(world.add_actuator(actuator("missing")).is_err());
        world.add_actuator(actuator("slide")).unwrap();
        assert!(matches!(
            world.add_actuator(actuator("slide")),
            Err(NavigateError::DuplicateElement { kind: "actuator", .. })
        ));
    }

    #[test]
    fn test_last_descendant() {
        let mut body = Body::new("0").with_child(Body::new("1").with_child(Body::new("2")));
        assert_eq!(body.last_descendant_mut().name, "2");
    }
}
