//! A headless kinematic backend.
//!
//! [`KinematicPhysics`] compiles a [`WorldTree`] into flat arrays and moves
//! joints by integrating actuator controls as velocities. There is no
//! dynamics and no collision detection: contacts and constraint forces are
//! injected by the caller. Rendering draws spheres and capsules as discs and
//! rasterizes mesh triangles through a [`CameraMatrix`], with a depth
//! buffer and per-group visibility.

use std::collections::BTreeMap;
use std::sync::Arc;

use nalgebra::{Isometry3, Point3, Translation3, Unit, UnitQuaternion, Vector3};
use tracing::debug;

use crate::camera::CameraMatrix;
use crate::mesh::ClosedMesh;
use crate::physics::{
    CameraRef, CameraState, CompilePhysics, Contact, Image, Physics, PhysicsError, RenderRequest,
    RgbImage, SegmentationImage,
};
use crate::world::{Body, GeomShape, JointKind, Rgba, WorldTree};

/// Background colour of colour renders.
const BACKGROUND: [u8; 3] = [255, 255, 255];

// ============================================================================
// Compiled model
// ============================================================================

#[derive(Debug, Clone)]
struct BodyNode {
    name: String,
    parent: Option<usize>,
    pos: Vector3<f64>,
    rotation: UnitQuaternion<f64>,
    joints: Vec<usize>,
}

#[derive(Debug, Clone)]
struct JointNode {
    name: String,
    kind: JointKind,
    axis: Unit<Vector3<f64>>,
    range: Option<(f64, f64)>,
}

#[derive(Debug, Clone)]
struct ActuatorNode {
    name: String,
    joint: usize,
    gain: f64,
    ctrl_range: Option<(f64, f64)>,
}

#[derive(Debug, Clone)]
enum Shape {
    Sphere(f64),
    Capsule { radius: f64, half_length: f64 },
    Mesh(Arc<ClosedMesh>),
}

#[derive(Debug, Clone)]
struct GeomNode {
    name: String,
    body: usize,
    pos: Vector3<f64>,
    shape: Shape,
    group: usize,
    rgba: Rgba,
}

#[derive(Debug, Clone)]
struct CameraNode {
    name: String,
    body: usize,
    pos: Vector3<f64>,
    rotation: UnitQuaternion<f64>,
    fovy: f64,
}

/// Kinematic simulation of a compiled world.
///
/// # Example
///
/// ```
/// use sim_navigate::{CompilePhysics, KinematicPhysics, Physics, Scene, EnvConfig};
///
/// let scene = Scene::build("arena", &EnvConfig::default()).unwrap();
/// let physics = KinematicPhysics::compile(scene.world()).unwrap();
/// assert_eq!(physics.camera_count(), 2);
/// assert_eq!(physics.camera_index("top_camera"), Some(0));
/// ```
#[derive(Debug, Clone)]
pub struct KinematicPhysics {
    timestep: f64,
    time: f64,
    bodies: Vec<BodyNode>,
    joints: Vec<JointNode>,
    actuators: Vec<ActuatorNode>,
    geoms: Vec<GeomNode>,
    cameras: Vec<CameraNode>,
    qpos: Vec<f64>,
    qvel: Vec<f64>,
    ctrl: Vec<f64>,
    qfrc_constraint: Vec<f64>,
    contacts: Vec<Contact>,
    frames: Vec<Isometry3<f64>>,
}

impl CompilePhysics for KinematicPhysics {
    fn compile(world: &WorldTree) -> Result<Self, PhysicsError> {
        let mut physics = Self {
            timestep: world.option.timestep,
            time: 0.0,
            bodies: Vec::new(),
            joints: Vec::new(),
            actuators: Vec::new(),
            geoms: Vec::new(),
            cameras: Vec::new(),
            qpos: Vec::new(),
            qvel: Vec::new(),
            ctrl: Vec::new(),
            qfrc_constraint: Vec::new(),
            contacts: Vec::new(),
            frames: Vec::new(),
        };
        physics.flatten(world, &world.worldbody, None)?;

        for actuator in &world.actuators {
            let joint = physics
                .joints
                .iter()
                .position(|j| j.name == actuator.joint)
                .ok_or_else(|| PhysicsError::Compile {
                    reason: format!(
                        "actuator '{}' drives unknown joint '{}'",
                        actuator.name, actuator.joint
                    ),
                })?;
            physics.actuators.push(ActuatorNode {
                name: actuator.name.clone(),
                joint,
                gain: actuator.gain,
                ctrl_range: actuator.ctrl_range,
            });
        }

        let nq = physics.joints.len();
        physics.qpos = vec![0.0; nq];
        physics.qvel = vec![0.0; nq];
        physics.qfrc_constraint = vec![0.0; nq];
        physics.ctrl = vec![0.0; physics.actuators.len()];
        physics.forward();
        debug!(
            model = %world.model,
            bodies = physics.bodies.len(),
            joints = nq,
            geoms = physics.geoms.len(),
            "world compiled"
        );
        Ok(physics)
    }
}

impl KinematicPhysics {
    /// Pre-order flattening: matches [`WorldTree::geoms`] and
    /// [`WorldTree::cameras`] ordering.
    fn flatten(&mut self, world: &WorldTree, body: &Body, parent: Option<usize>) -> Result<(), PhysicsError> {
        let index = self.bodies.len();
        let mut joints = Vec::with_capacity(body.joints.len());
        for joint in &body.joints {
            let axis = Unit::try_new(joint.axis, f64::EPSILON).ok_or_else(|| PhysicsError::Compile {
                reason: format!("joint '{}' has a zero axis", joint.name),
            })?;
            joints.push(self.joints.len());
            self.joints.push(JointNode {
                name: joint.name.clone(),
                kind: joint.kind,
                axis,
                range: joint.range,
            });
        }
        self.bodies.push(BodyNode {
            name: body.name.clone(),
            parent,
            pos: body.pos,
            rotation: body.rotation(),
            joints,
        });

        for geom in &body.geoms {
            let shape = match &geom.shape {
                GeomShape::Sphere { radius } => Shape::Sphere(*radius),
                GeomShape::Capsule {
                    radius,
                    half_length,
                } => Shape::Capsule {
                    radius: *radius,
                    half_length: *half_length,
                },
                GeomShape::Mesh { asset } => {
                    let mesh = world.mesh_asset(asset).ok_or_else(|| PhysicsError::Compile {
                        reason: format!("geom '{}' references unknown mesh '{asset}'", geom.name),
                    })?;
                    Shape::Mesh(Arc::clone(mesh))
                }
            };
            self.geoms.push(GeomNode {
                name: geom.name.clone(),
                body: index,
                pos: geom.pos,
                shape,
                group: geom.group,
                rgba: geom.rgba,
            });
        }
        for camera in &body.cameras {
            self.cameras.push(CameraNode {
                name: camera.name.clone(),
                body: index,
                pos: camera.pos,
                rotation: camera.rotation(),
                fovy: camera.fovy,
            });
        }
        for child in &body.children {
            self.flatten(world, child, Some(index))?;
        }
        Ok(())
    }

    /// Recompute body frames from positions and joint values.
    fn forward(&mut self) {
        let mut frames: Vec<Isometry3<f64>> = Vec::with_capacity(self.bodies.len());
        for body in &self.bodies {
            let parent = body
                .parent
                .and_then(|p| frames.get(p).copied())
                .unwrap_or_else(Isometry3::identity);
            let mut frame = parent * Isometry3::from_parts(Translation3::from(body.pos), body.rotation);
            for &j in &body.joints {
                let joint = &self.joints[j];
                let q = self.qpos[j];
                let local = match joint.kind {
                    JointKind::Slide => Isometry3::translation(
                        joint.axis.x * q,
                        joint.axis.y * q,
                        joint.axis.z * q,
                    ),
                    JointKind::Hinge => Isometry3::from_parts(
                        Translation3::identity(),
                        UnitQuaternion::from_axis_angle(&joint.axis, q),
                    ),
                };
                frame *= local;
            }
            frames.push(frame);
        }
        self.frames = frames;
    }

    /// Replace the active contacts.
    pub fn set_contacts(&mut self, contacts: Vec<Contact>) {
        self.contacts = contacts;
    }

    /// Replace the constraint forces.
    pub fn set_qfrc_constraint(&mut self, forces: Vec<f64>) {
        self.qfrc_constraint = forces;
    }

    /// Overwrite one generalized position and update body frames.
    pub fn set_qpos(&mut self, index: usize, value: f64) {
        if let Some(q) = self.qpos.get_mut(index) {
            *q = value;
            self.forward();
        }
    }

    /// Named parameters accepted by [`Physics::parameter`], with their
    /// value lengths.
    #[must_use]
    pub fn parameter_names(&self) -> BTreeMap<String, usize> {
        let mut names = BTreeMap::new();
        names.insert("timestep".to_string(), 1);
        for geom in &self.geoms {
            names.insert(format!("geom_rgba:{}", geom.name), 4);
            match geom.shape {
                Shape::Sphere(_) => {
                    names.insert(format!("geom_size:{}", geom.name), 1);
                }
                Shape::Capsule { .. } => {
                    names.insert(format!("geom_size:{}", geom.name), 2);
                }
                Shape::Mesh(_) => {}
            }
        }
        for actuator in &self.actuators {
            names.insert(format!("actuator_gain:{}", actuator.name), 1);
        }
        names
    }

    /// World frame of a named body.
    #[must_use]
    pub fn body_frame(&self, name: &str) -> Option<Isometry3<f64>> {
        let index = self.bodies.iter().position(|b| b.name == name)?;
        self.frames.get(index).copied()
    }

    fn geom_id(&self, name: &str) -> Result<usize, PhysicsError> {
        self.geoms
            .iter()
            .position(|g| g.name == name)
            .ok_or_else(|| PhysicsError::UnknownParameter {
                name: name.to_string(),
            })
    }

    fn resolve_camera(&self, camera: &CameraRef) -> Result<usize, PhysicsError> {
        match camera {
            CameraRef::Id(id) if *id < self.cameras.len() => Ok(*id),
            CameraRef::Id(id) => Err(PhysicsError::CameraOutOfRange {
                id: *id,
                count: self.cameras.len(),
            }),
            CameraRef::Name(name) => self
                .camera_index(name)
                .ok_or_else(|| PhysicsError::UnknownCamera { name: name.clone() }),
        }
    }
}

// ============================================================================
// Physics
// ============================================================================

impl Physics for KinematicPhysics {
    fn timestep(&self) -> f64 {
        self.timestep
    }

    fn time(&self) -> f64 {
        self.time
    }

    fn step(&mut self) -> Result<(), PhysicsError> {
        for (actuator, &ctrl) in self.actuators.iter().zip(&self.ctrl) {
            let ctrl = match actuator.ctrl_range {
                Some((lo, hi)) => ctrl.clamp(lo, hi),
                None => ctrl,
            };
            self.qvel[actuator.joint] = actuator.gain * ctrl;
        }
        for (j, joint) in self.joints.iter().enumerate() {
            let q = self.qpos[j] + self.qvel[j] * self.timestep;
            self.qpos[j] = match joint.range {
                Some((lo, hi)) if q < lo || q > hi => {
                    self.qvel[j] = 0.0;
                    q.clamp(lo, hi)
                }
                _ => q,
            };
        }
        if let Some(j) = self.qpos.iter().position(|q| !q.is_finite()) {
            return Err(PhysicsError::Diverged {
                reason: format!("joint '{}' has non-finite position", self.joints[j].name),
            });
        }
        self.time += self.timestep;
        self.forward();
        Ok(())
    }

    fn num_actuators(&self) -> usize {
        self.actuators.len()
    }

    fn set_control(&mut self, control: &[f64]) -> Result<(), PhysicsError> {
        if control.len() != self.actuators.len() {
            return Err(PhysicsError::ControlSize {
                expected: self.actuators.len(),
                got: control.len(),
            });
        }
        self.ctrl.copy_from_slice(control);
        Ok(())
    }

    fn qpos(&self) -> &[f64] {
        &self.qpos
    }

    fn qvel(&self) -> &[f64] {
        &self.qvel
    }

    fn joint_names(&self) -> Vec<String> {
        self.joints.iter().map(|j| j.name.clone()).collect()
    }

    fn geom_count(&self) -> usize {
        self.geoms.len()
    }

    fn geom_name(&self, id: usize) -> Option<&str> {
        self.geoms.get(id).map(|g| g.name.as_str())
    }

    fn geom_group(&self, id: usize) -> Option<usize> {
        self.geoms.get(id).map(|g| g.group)
    }

    fn geom_xpos(&self, id: usize) -> Option<Point3<f64>> {
        let geom = self.geoms.get(id)?;
        let frame = self.frames.get(geom.body)?;
        Some(frame * Point3::from(geom.pos))
    }

    fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    fn qfrc_constraint(&self) -> &[f64] {
        &self.qfrc_constraint
    }

    fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    fn camera_index(&self, name: &str) -> Option<usize> {
        self.cameras.iter().position(|c| c.name == name)
    }

    fn camera(&self, id: usize) -> Result<CameraState, PhysicsError> {
        let camera = self.cameras.get(id).ok_or(PhysicsError::CameraOutOfRange {
            id,
            count: self.cameras.len(),
        })?;
        let frame = self
            .frames
            .get(camera.body)
            .copied()
            .unwrap_or_else(Isometry3::identity);
        Ok(CameraState {
            position: frame * Point3::from(camera.pos),
            rotation: (frame.rotation * camera.rotation)
                .to_rotation_matrix()
                .into_inner(),
            fovy: camera.fovy,
        })
    }

    fn render(&self, request: &RenderRequest) -> Result<Image, PhysicsError> {
        if request.width == 0 || request.height == 0 {
            return Err(PhysicsError::Render {
                reason: format!("empty image {}x{}", request.width, request.height),
            });
        }
        let id = self.resolve_camera(&request.camera)?;
        let state = self.camera(id)?;
        let mut canvas = Canvas::new(&state, request.width, request.height);

        for (geom_id, geom) in self.geoms.iter().enumerate() {
            let visible = request
                .scene_option
                .map_or(true, |option| option.is_visible(geom.group));
            if !visible {
                continue;
            }
            let Some(frame) = self.frames.get(geom.body) else {
                continue;
            };
            let origin = frame * Isometry3::from_parts(Translation3::from(geom.pos), UnitQuaternion::identity());
            let label = u32::try_from(geom_id + 1).unwrap_or(u32::MAX);
            match &geom.shape {
                Shape::Sphere(radius) => {
                    canvas.disc(&Point3::from(origin.translation.vector), *radius, label);
                }
                Shape::Capsule {
                    radius,
                    half_length,
                } => {
                    let axis = origin.rotation * Vector3::z();
                    let centre = Point3::from(origin.translation.vector);
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let steps = ((2.0 * half_length / radius.max(1e-9)).ceil() as usize).max(1);
                    for i in 0..=steps {
                        let t = -half_length + 2.0 * half_length * i as f64 / steps as f64;
                        canvas.disc(&(centre + axis * t), *radius, label);
                    }
                }
                Shape::Mesh(mesh) => {
                    for [a, b, c] in mesh.triangles() {
                        canvas.triangle(&[origin * a, origin * b, origin * c], label);
                    }
                }
            }
        }

        Ok(if request.segmentation {
            Image::Segmentation(canvas.into_segmentation())
        } else {
            let colours: Vec<Rgba> = self.geoms.iter().map(|g| g.rgba).collect();
            Image::Rgb(canvas.into_rgb(&colours))
        })
    }

    fn set_body_position(&mut self, body: &str, position: Vector3<f64>) -> Result<(), PhysicsError> {
        let node = self
            .bodies
            .iter_mut()
            .find(|b| b.name == body)
            .ok_or_else(|| PhysicsError::UnknownBody {
                name: body.to_string(),
            })?;
        node.pos = position;
        for &j in &node.joints {
            self.qvel[j] = 0.0;
        }
        self.forward();
        Ok(())
    }

    fn parameter(&self, name: &str) -> Result<Vec<f64>, PhysicsError> {
        let unknown = || PhysicsError::UnknownParameter {
            name: name.to_string(),
        };
        match name.split_once(':') {
            None if name == "timestep" => Ok(vec![self.timestep]),
            Some(("geom_rgba", geom)) => Ok(self.geoms[self.geom_id(geom)?].rgba.to_vec()),
            Some(("geom_size", geom)) => match &self.geoms[self.geom_id(geom)?].shape {
                Shape::Sphere(radius) => Ok(vec![*radius]),
                Shape::Capsule {
                    radius,
                    half_length,
                } => Ok(vec![*radius, *half_length]),
                Shape::Mesh(_) => Err(unknown()),
            },
            Some(("actuator_gain", actuator)) => self
                .actuators
                .iter()
                .find(|a| a.name == actuator)
                .map(|a| vec![a.gain])
                .ok_or_else(unknown),
            _ => Err(unknown()),
        }
    }

    fn set_parameter(&mut self, name: &str, value: &[f64]) -> Result<(), PhysicsError> {
        let unknown = || PhysicsError::UnknownParameter {
            name: name.to_string(),
        };
        let bad_value = || PhysicsError::UnknownParameter {
            name: format!("{name} (wrong value length {})", value.len()),
        };
        match name.split_once(':') {
            None if name == "timestep" => match value {
                [dt] if dt.is_finite() && *dt > 0.0 => {
                    self.timestep = *dt;
                    Ok(())
                }
                _ => Err(bad_value()),
            },
            Some(("geom_rgba", geom)) => {
                let id = self.geom_id(geom)?;
                self.geoms[id].rgba = value.try_into().map_err(|_| bad_value())?;
                Ok(())
            }
            Some(("geom_size", geom)) => {
                let id = self.geom_id(geom)?;
                match (&mut self.geoms[id].shape, value) {
                    (Shape::Sphere(radius), [r]) => *radius = *r,
                    (
                        Shape::Capsule {
                            radius,
                            half_length,
                        },
                        [r, h],
                    ) => {
                        *radius = *r;
                        *half_length = *h;
                    }
                    _ => return Err(bad_value()),
                }
                Ok(())
            }
            Some(("actuator_gain", actuator)) => {
                let node = self
                    .actuators
                    .iter_mut()
                    .find(|a| a.name == actuator)
                    .ok_or_else(unknown)?;
                match value {
                    [gain] => {
                        node.gain = *gain;
                        Ok(())
                    }
                    _ => Err(bad_value()),
                }
            }
            _ => Err(unknown()),
        }
    }
}

// ============================================================================
// Rasterization
// ============================================================================

/// Label and depth buffers for one render.
struct Canvas {
    camera: CameraMatrix,
    focal: f64,
    position: Point3<f64>,
    forward: Vector3<f64>,
    width: u32,
    height: u32,
    labels: Vec<u32>,
    depth: Vec<f64>,
}

impl Canvas {
    fn new(state: &CameraState, width: u32, height: u32) -> Self {
        let n = width as usize * height as usize;
        Self {
            camera: CameraMatrix::new(state, width, height),
            focal: (1.0 / (state.fovy.to_radians() / 2.0).tan()) * f64::from(height) / 2.0,
            position: state.position,
            // The camera looks along its local -Z axis.
            forward: -state.rotation.column(2).into_owned(),
            width,
            height,
            labels: vec![0; n],
            depth: vec![f64::INFINITY; n],
        }
    }

    fn view_depth(&self, point: &Point3<f64>) -> f64 {
        (point - self.position).dot(&self.forward)
    }

    fn plot(&mut self, x: i64, y: i64, depth: f64, label: u32) {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let i = y as usize * self.width as usize + x as usize;
        if depth < self.depth[i] {
            self.depth[i] = depth;
            self.labels[i] = label;
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn disc(&mut self, centre: &Point3<f64>, radius: f64, label: u32) {
        let depth = self.view_depth(centre);
        if depth <= 0.0 {
            return;
        }
        let Some([cx, cy]) = self.camera.project(centre) else {
            return;
        };
        let r = (radius * self.focal / depth).max(0.5);
        let (x0, x1) = ((cx - r).floor() as i64, (cx + r).ceil() as i64);
        let (y0, y1) = ((cy - r).floor() as i64, (cy + r).ceil() as i64);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let (dx, dy) = (x as f64 - cx, y as f64 - cy);
                if dx * dx + dy * dy <= r * r {
                    self.plot(x, y, depth, label);
                }
            }
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn triangle(&mut self, vertices: &[Point3<f64>; 3], label: u32) {
        let mut projected = [[0.0; 2]; 3];
        let mut depths = [0.0; 3];
        for (k, v) in vertices.iter().enumerate() {
            depths[k] = self.view_depth(v);
            if depths[k] <= 0.0 {
                return;
            }
            match self.camera.project(v) {
                Some(p) => projected[k] = p,
                None => return,
            }
        }
        let [a, b, c] = projected;
        let area = (b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1]);
        if area.abs() < f64::EPSILON {
            return;
        }

        let min_x = a[0].min(b[0]).min(c[0]).floor() as i64;
        let max_x = a[0].max(b[0]).max(c[0]).ceil() as i64;
        let min_y = a[1].min(b[1]).min(c[1]).floor() as i64;
        let max_y = a[1].max(b[1]).max(c[1]).ceil() as i64;
        let min_x = min_x.max(0);
        let min_y = min_y.max(0);
        let max_x = max_x.min(i64::from(self.width) - 1);
        let max_y = max_y.min(i64::from(self.height) - 1);

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let (px, py) = (x as f64, y as f64);
                let w0 = ((b[0] - px) * (c[1] - py) - (c[0] - px) * (b[1] - py)) / area;
                let w1 = ((c[0] - px) * (a[1] - py) - (a[0] - px) * (c[1] - py)) / area;
                let w2 = 1.0 - w0 - w1;
                if w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0 {
                    let depth = w0 * depths[0] + w1 * depths[1] + w2 * depths[2];
                    self.plot(x, y, depth, label);
                }
            }
        }
    }

    fn into_segmentation(self) -> SegmentationImage {
        SegmentationImage {
            width: self.width,
            height: self.height,
            data: self.labels,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn into_rgb(self, colours: &[Rgba]) -> RgbImage {
        let mut image = RgbImage::filled(self.width, self.height, BACKGROUND);
        for (i, &label) in self.labels.iter().enumerate() {
            let Some(rgba) = label.checked_sub(1).and_then(|id| colours.get(id as usize)) else {
                continue;
            };
            for k in 0..3 {
                image.data[i * 3 + k] = (rgba[k].clamp(0.0, 1.0) * 255.0).round() as u8;
            }
        }
        image
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::scene_option::make_scene;
    use crate::world::{Actuator, Camera, Geom, Joint};
    use approx::assert_relative_eq;

    fn world() -> WorldTree {
        let mut world = WorldTree::new("test");
        world
            .add_camera(Camera {
                name: "above".to_string(),
                pos: Vector3::new(0.0, 0.0, 1.0),
                euler: Vector3::zeros(),
                fovy: 45.0,
            })
            .unwrap();
        world
            .attach(
                Body::new("ball").with_geom(
                    Geom::new("ball/geom", GeomShape::Sphere { radius: 0.1 })
                        .with_rgba([1.0, 0.0, 0.0, 1.0]),
                ),
            )
            .unwrap();
        world
            .attach(
                Body::new("cart")
                    .with_pos(Vector3::new(0.3, 0.0, 0.0))
                    .with_joint(Joint {
                        name: "cart/slide".to_string(),
                        kind: JointKind::Slide,
                        axis: Vector3::y(),
                        range: Some((-0.05, 0.05)),
                    })
                    .with_geom(Geom::new("cart/geom", GeomShape::Sphere { radius: 0.05 }).with_group(1)),
            )
            .unwrap();
        world
            .add_actuator(Actuator {
                name: "cart/motor".to_string(),
                joint: "cart/slide".to_string(),
                gain: 1.0,
                ctrl_range: Some((-1.0, 1.0)),
            })
            .unwrap();
        world
    }

    #[test]
    fn test_compile_flattens_tree() {
        let physics = KinematicPhysics::compile(&world()).unwrap();
        assert_eq!(physics.geom_count(), 2);
        assert_eq!(physics.geom_name(1), Some("cart/geom"));
        assert_eq!(physics.geom_group(1), Some(1));
        assert_eq!(physics.joint_names(), vec!["cart/slide".to_string()]);
        assert_eq!(physics.num_actuators(), 1);
        assert_eq!(physics.qfrc_constraint(), &[0.0]);
        let pos = physics.geom_xpos(1).unwrap();
        assert_relative_eq!(pos, Point3::new(0.3, 0.0, 0.0));
    }

    #[test]
    fn test_compile_rejects_missing_mesh() {
        let mut world = WorldTree::new("test");
        world
            .attach(Body::new("b").with_geom(Geom::new(
                "b/mesh",
                GeomShape::Mesh {
                    asset: "missing".to_string(),
                },
            )))
            .unwrap();
        let err = KinematicPhysics::compile(&world).unwrap_err();
        assert!(matches!(err, PhysicsError::Compile { .. }));
    }

    #[test]
    fn test_step_clamps_control_and_range() {
        let mut physics = KinematicPhysics::compile(&world()).unwrap();
        physics.set_parameter("timestep", &[0.01]).unwrap();
        physics.set_control(&[2.0]).unwrap();
        physics.step().unwrap();
        assert_relative_eq!(physics.qvel()[0], 1.0);
        assert_relative_eq!(physics.qpos()[0], 0.01);
        assert_relative_eq!(physics.time(), 0.01);
        assert_relative_eq!(physics.geom_xpos(1).unwrap().y, 0.01);

        for _ in 0..10 {
            physics.step().unwrap();
        }
        assert_relative_eq!(physics.qpos()[0], 0.05);
    }

    #[test]
    fn test_control_size_checked() {
        let mut physics = KinematicPhysics::compile(&world()).unwrap();
        let err = physics.set_control(&[]).unwrap_err();
        assert_eq!(err, PhysicsError::ControlSize { expected: 1, got: 0 });
    }

    #[test]
    fn test_set_body_position_moves_and_stops() {
        let mut physics = KinematicPhysics::compile(&world()).unwrap();
        physics.set_control(&[1.0]).unwrap();
        physics.step().unwrap();
        physics
            .set_body_position("cart", Vector3::new(0.0, 0.2, 0.0))
            .unwrap();
        assert_eq!(physics.qvel(), &[0.0]);
        assert_relative_eq!(physics.body_frame("cart").unwrap().translation.vector.x, 0.0);
        assert!(matches!(
            physics.set_body_position("nope", Vector3::zeros()),
            Err(PhysicsError::UnknownBody { .. })
        ));
    }

    #[test]
    fn test_segmentation_honours_groups() {
        let physics = KinematicPhysics::compile(&world()).unwrap();
        let request = RenderRequest::segmentation(0, 65);
        let Image::Segmentation(all) = physics.render(&request).unwrap() else {
            panic!("expected segmentation");
        };
        assert_eq!(all.geom_at(32, 32), Some(0));

        let only_cart = request.with_scene_option(make_scene(&[1]).unwrap());
        let Image::Segmentation(cart) = physics.render(&only_cart).unwrap() else {
            panic!("expected segmentation");
        };
        assert_eq!(cart.geom_at(32, 32), None);
        assert!(cart.data.iter().all(|&l| l == 0 || l == 2));
        assert!(cart.data.contains(&2));
    }

    #[test]
    fn test_rgb_uses_geom_colour() {
        let physics = KinematicPhysics::compile(&world()).unwrap();
        let Image::Rgb(img) = physics.render(&RenderRequest::rgb(0, 65)).unwrap() else {
            panic!("expected colour");
        };
        assert_eq!(img.get(32, 32), Some([255, 0, 0]));
        assert_eq!(img.get(0, 0), Some(BACKGROUND));
    }

    #[test]
    fn test_render_unknown_camera() {
        let physics = KinematicPhysics::compile(&world()).unwrap();
        let request = RenderRequest {
            camera: CameraRef::Name("missing".to_string()),
            ..RenderRequest::rgb(0, 8)
        };
        assert!(matches!(
            physics.render(&request),
            Err(PhysicsError::UnknownCamera { .. })
        ));
        assert!(matches!(
            physics.render(&RenderRequest::rgb(3, 8)),
            Err(PhysicsError::CameraOutOfRange { id: 3, count: 1 })
        ));
    }

    #[test]
    fn test_mesh_rasterized() {
        let mut world = WorldTree::new("test");
        world
            .add_camera(Camera {
                name: "above".to_string(),
                pos: Vector3::new(0.0, 0.0, 1.0),
                euler: Vector3::zeros(),
                fovy: 45.0,
            })
            .unwrap();
        world
            .add_asset(crate::world::Asset::Mesh {
                name: "box".to_string(),
                mesh: Arc::new(ClosedMesh::cuboid(
                    Point3::new(-0.1, -0.1, -0.1),
                    Point3::new(0.1, 0.1, 0.1),
                )),
            })
            .unwrap();
        world
            .attach(Body::new("box").with_geom(Geom::new(
                "box/geom",
                GeomShape::Mesh {
                    asset: "box".to_string(),
                },
            )))
            .unwrap();
        let physics = KinematicPhysics::compile(&world).unwrap();
        let Image::Segmentation(img) = physics.render(&RenderRequest::segmentation(0, 65)).unwrap() else {
            panic!("expected segmentation");
        };
        assert_eq!(img.geom_at(35, 31), Some(0));
        assert_eq!(img.geom_at(0, 0), None);
    }

    #[test]
    fn test_parameters() {
        let mut physics = KinematicPhysics::compile(&world()).unwrap();
        assert_eq!(physics.parameter("geom_size:ball/geom").unwrap(), vec![0.1]);
        physics
            .set_parameter("geom_rgba:cart/geom", &[0.0, 1.0, 0.0, 1.0])
            .unwrap();
        assert_eq!(
            physics.parameter("geom_rgba:cart/geom").unwrap(),
            vec![0.0, 1.0, 0.0, 1.0]
        );
        physics.set_parameter("actuator_gain:cart/motor", &[2.0]).unwrap();
        assert_eq!(physics.parameter("actuator_gain:cart/motor").unwrap(), vec![2.0]);
        assert!(physics.set_parameter("geom_rgba:cart/geom", &[1.0]).is_err());
        assert!(physics.parameter("gravity").is_err());
        assert!(physics.parameter_names().contains_key("geom_size:cart/geom"));
    }
}
