//! Kinematic tree with per-link collision geometry
//!
//! A `RobotModel` is an immutable description of links, joints and named
//! joint groups. Joints are kept in topological order so forward kinematics
//! can be evaluated in a single pass from the root link.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet, VecDeque};
use std::f64::consts::PI;
use std::hash::{Hash, Hasher};

use nalgebra::{Isometry3, Point3, Unit, Vector3};

use crate::common::{CostFunctionError, CostFunctionResult};

/// Collision primitive expressed in the owning link's frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollisionShape {
    Sphere { center: Point3<f64>, radius: f64 },
    /// Swept sphere between two end points
    Capsule { a: Point3<f64>, b: Point3<f64>, radius: f64 },
}

impl CollisionShape {
    pub fn sphere(center: Point3<f64>, radius: f64) -> Self {
        CollisionShape::Sphere { center, radius }
    }

    pub fn capsule(a: Point3<f64>, b: Point3<f64>, radius: f64) -> Self {
        CollisionShape::Capsule { a, b, radius }
    }

    pub fn radius(&self) -> f64 {
        match self {
            CollisionShape::Sphere { radius, .. } | CollisionShape::Capsule { radius, .. } => *radius,
        }
    }

    pub fn is_finite(&self) -> bool {
        match self {
            CollisionShape::Sphere { center, radius } => {
                center.iter().all(|v| v.is_finite()) && radius.is_finite()
            }
            CollisionShape::Capsule { a, b, radius } => {
                a.iter().chain(b.iter()).all(|v| v.is_finite()) && radius.is_finite()
            }
        }
    }

    /// Signed distance from `p` to the shape surface, negative inside
    pub fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        match self {
            CollisionShape::Sphere { center, radius } => (p - center).norm() - radius,
            CollisionShape::Capsule { a, b, radius } => {
                let ab = b - a;
                let len2 = ab.norm_squared();
                let t = if len2 > 0.0 {
                    ((p - a).dot(&ab) / len2).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                (p - (a + ab * t)).norm() - radius
            }
        }
    }

    /// Axis-aligned bounds (min, max) in the link frame
    pub fn bounds(&self) -> (Point3<f64>, Point3<f64>) {
        match self {
            CollisionShape::Sphere { center, radius } => {
                let r = Vector3::repeat(*radius);
                (center - r, center + r)
            }
            CollisionShape::Capsule { a, b, radius } => {
                let r = Vector3::repeat(*radius);
                (a.inf(b) - r, a.sup(b) + r)
            }
        }
    }

    /// Points on the outer surface, spaced roughly `spacing` apart
    pub fn surface_points(&self, spacing: f64) -> Vec<Point3<f64>> {
        match self {
            CollisionShape::Sphere { center, radius } => fibonacci_sphere(center, *radius, spacing),
            CollisionShape::Capsule { a, b, radius } => {
                let axis = b - a;
                let length = axis.norm();
                if length < 1e-9 {
                    return fibonacci_sphere(a, *radius, spacing);
                }
                let dir = axis / length;

                // caps: keep the outward-facing hemisphere of each end sphere
                let mut points: Vec<Point3<f64>> = fibonacci_sphere(a, *radius, spacing)
                    .into_iter()
                    .filter(|p| (p - a).dot(&dir) <= 0.0)
                    .collect();
                points.extend(
                    fibonacci_sphere(b, *radius, spacing)
                        .into_iter()
                        .filter(|p| (p - b).dot(&dir) >= 0.0),
                );

                // cylinder rings
                let helper = if dir.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
                let u = dir.cross(&helper).normalize();
                let v = dir.cross(&u);
                let n_rings = (length / spacing).ceil().max(1.0) as usize;
                let n_around = ((2.0 * PI * radius) / spacing).ceil().max(6.0) as usize;
                for i in 0..=n_rings {
                    let base = a + axis * (i as f64 / n_rings as f64);
                    for k in 0..n_around {
                        let phi = 2.0 * PI * k as f64 / n_around as f64;
                        points.push(base + (u * phi.cos() + v * phi.sin()) * *radius);
                    }
                }
                points
            }
        }
    }
}

fn fibonacci_sphere(center: &Point3<f64>, radius: f64, spacing: f64) -> Vec<Point3<f64>> {
    let golden_angle = PI * (3.0 - 5.0_f64.sqrt());
    let n = ((4.0 * PI * radius * radius) / (spacing * spacing)).ceil().max(16.0) as usize;
    (0..n)
        .map(|i| {
            let y = 1.0 - 2.0 * (i as f64 + 0.5) / n as f64;
            let r = (1.0 - y * y).sqrt();
            let theta = golden_angle * i as f64;
            center + Vector3::new(theta.cos() * r, y, theta.sin() * r) * radius
        })
        .collect()
}

/// Rigid body of the robot
#[derive(Debug, Clone)]
pub struct Link {
    pub name: String,
    pub shapes: Vec<CollisionShape>,
}

impl Link {
    pub fn new(name: &str, shapes: Vec<CollisionShape>) -> Self {
        Self { name: name.to_string(), shapes }
    }

    pub fn has_geometry(&self) -> bool {
        !self.shapes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointType {
    Revolute { axis: Unit<Vector3<f64>> },
    Prismatic { axis: Unit<Vector3<f64>> },
    Fixed,
}

/// Connection between a parent and a child link
#[derive(Debug, Clone)]
pub struct Joint {
    pub name: String,
    pub joint_type: JointType,
    pub parent_link: String,
    pub child_link: String,
    /// Child frame relative to the parent frame at zero joint value
    pub origin: Isometry3<f64>,
}

impl Joint {
    pub fn revolute(
        name: &str,
        parent_link: &str,
        child_link: &str,
        origin: Isometry3<f64>,
        axis: Vector3<f64>,
    ) -> Self {
        Self::new(name, JointType::Revolute { axis: Unit::new_normalize(axis) }, parent_link, child_link, origin)
    }

    pub fn prismatic(
        name: &str,
        parent_link: &str,
        child_link: &str,
        origin: Isometry3<f64>,
        axis: Vector3<f64>,
    ) -> Self {
        Self::new(name, JointType::Prismatic { axis: Unit::new_normalize(axis) }, parent_link, child_link, origin)
    }

    pub fn fixed(name: &str, parent_link: &str, child_link: &str, origin: Isometry3<f64>) -> Self {
        Self::new(name, JointType::Fixed, parent_link, child_link, origin)
    }

    fn new(
        name: &str,
        joint_type: JointType,
        parent_link: &str,
        child_link: &str,
        origin: Isometry3<f64>,
    ) -> Self {
        Self {
            name: name.to_string(),
            joint_type,
            parent_link: parent_link.to_string(),
            child_link: child_link.to_string(),
            origin,
        }
    }

    pub fn is_movable(&self) -> bool {
        self.joint_type != JointType::Fixed
    }
}

/// Named subset of joints driven together by the planner
#[derive(Debug, Clone)]
pub struct JointGroup {
    name: String,
    joint_names: Vec<String>,
    variable_indices: Vec<usize>,
    moved_links: Vec<bool>,
}

impl JointGroup {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn joint_names(&self) -> &[String] {
        &self.joint_names
    }

    /// Number of joint coordinates, i.e. rows of a trajectory batch
    pub fn variable_count(&self) -> usize {
        self.variable_indices.len()
    }

    pub fn variable_indices(&self) -> &[usize] {
        &self.variable_indices
    }

    /// True if the link's pose depends on any joint of the group
    pub fn moves_link(&self, link_index: usize) -> bool {
        self.moved_links.get(link_index).copied().unwrap_or(false)
    }
}

/// Immutable robot description
#[derive(Debug, Clone)]
pub struct RobotModel {
    name: String,
    root_link: usize,
    links: Vec<Link>,
    link_index: HashMap<String, usize>,
    /// Joints in topological order
    joints: Vec<Joint>,
    joint_parent: Vec<usize>,
    joint_child: Vec<usize>,
    joint_variable: Vec<Option<usize>>,
    variable_names: Vec<String>,
    groups: HashMap<String, JointGroup>,
    fingerprint: u64,
}

impl RobotModel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root_link(&self) -> usize {
        self.root_link
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn link_index(&self, name: &str) -> Option<usize> {
        self.link_index.get(name).copied()
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    /// (parent link, child link, variable index) of the i-th joint in topological order
    pub(crate) fn joint_topology(&self, i: usize) -> (usize, usize, Option<usize>) {
        (self.joint_parent[i], self.joint_child[i], self.joint_variable[i])
    }

    pub fn variable_count(&self) -> usize {
        self.variable_names.len()
    }

    pub fn variable_names(&self) -> &[String] {
        &self.variable_names
    }

    pub fn variable_index(&self, joint_name: &str) -> Option<usize> {
        self.variable_names.iter().position(|n| n == joint_name)
    }

    pub fn joint_group(&self, name: &str) -> Option<&JointGroup> {
        self.groups.get(name)
    }

    pub fn group_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.groups.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Structural hash of names, topology and geometry
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Link pairs directly connected by a joint
    pub fn adjacent_link_pairs(&self) -> Vec<(&str, &str)> {
        self.joints
            .iter()
            .map(|j| (j.parent_link.as_str(), j.child_link.as_str()))
            .collect()
    }
}

/// Incremental, validating constructor for `RobotModel`
#[derive(Debug, Clone, Default)]
pub struct RobotModelBuilder {
    name: String,
    links: Vec<Link>,
    joints: Vec<Joint>,
    groups: Vec<(String, Vec<String>)>,
}

impl RobotModelBuilder {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), ..Default::default() }
    }

    pub fn link(mut self, name: &str, shapes: Vec<CollisionShape>) -> Self {
        self.links.push(Link::new(name, shapes));
        self
    }

    pub fn joint(mut self, joint: Joint) -> Self {
        self.joints.push(joint);
        self
    }

    pub fn group(mut self, name: &str, joint_names: &[&str]) -> Self {
        self.groups
            .push((name.to_string(), joint_names.iter().map(|s| s.to_string()).collect()));
        self
    }

    pub fn build(self) -> CostFunctionResult<RobotModel> {
        let invalid = |msg: String| CostFunctionError::InvalidRobotModel(msg);

        let mut link_index = HashMap::new();
        for (i, link) in self.links.iter().enumerate() {
            if link_index.insert(link.name.clone(), i).is_some() {
                return Err(invalid(format!("duplicate link '{}'", link.name)));
            }
        }
        if self.links.is_empty() {
            return Err(invalid("model has no links".to_string()));
        }

        let mut joint_names = HashSet::new();
        let mut has_parent = vec![false; self.links.len()];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); self.links.len()];
        for (ji, joint) in self.joints.iter().enumerate() {
            if !joint_names.insert(joint.name.as_str()) {
                return Err(invalid(format!("duplicate joint '{}'", joint.name)));
            }
            let parent = *link_index.get(&joint.parent_link).ok_or_else(|| {
                invalid(format!("joint '{}' references unknown parent link '{}'", joint.name, joint.parent_link))
            })?;
            let child = *link_index.get(&joint.child_link).ok_or_else(|| {
                invalid(format!("joint '{}' references unknown child link '{}'", joint.name, joint.child_link))
            })?;
            if has_parent[child] {
                return Err(invalid(format!("link '{}' has more than one parent joint", joint.child_link)));
            }
            has_parent[child] = true;
            children[parent].push(ji);
        }

        let roots: Vec<usize> = (0..self.links.len()).filter(|&i| !has_parent[i]).collect();
        if roots.len() != 1 {
            return Err(invalid(format!("expected exactly one root link, found {}", roots.len())));
        }
        let root_link = roots[0];

        // breadth-first from the root gives a topological joint order
        let mut order = Vec::with_capacity(self.joints.len());
        let mut queue = VecDeque::from(vec![root_link]);
        while let Some(link) = queue.pop_front() {
            for &ji in &children[link] {
                order.push(ji);
                queue.push_back(link_index[&self.joints[ji].child_link]);
            }
        }
        if order.len() != self.joints.len() {
            return Err(invalid("joint graph is not a tree rooted at a single link".to_string()));
        }

        let joints: Vec<Joint> = order.iter().map(|&ji| self.joints[ji].clone()).collect();
        let joint_parent: Vec<usize> = joints.iter().map(|j| link_index[&j.parent_link]).collect();
        let joint_child: Vec<usize> = joints.iter().map(|j| link_index[&j.child_link]).collect();

        let mut variable_names = Vec::new();
        let joint_variable: Vec<Option<usize>> = joints
            .iter()
            .map(|j| {
                if j.is_movable() {
                    variable_names.push(j.name.clone());
                    Some(variable_names.len() - 1)
                } else {
                    None
                }
            })
            .collect();

        let mut groups = HashMap::new();
        for (group_name, names) in &self.groups {
            if names.is_empty() {
                return Err(invalid(format!("group '{}' has no joints", group_name)));
            }
            let mut variable_indices = Vec::with_capacity(names.len());
            let mut moved_links = vec![false; self.links.len()];
            for jn in names {
                let ji = joints
                    .iter()
                    .position(|j| &j.name == jn)
                    .ok_or_else(|| invalid(format!("group '{}' references unknown joint '{}'", group_name, jn)))?;
                let var = joint_variable[ji]
                    .ok_or_else(|| invalid(format!("group '{}' references fixed joint '{}'", group_name, jn)))?;
                variable_indices.push(var);

                // everything below the joint moves with it
                let mut stack = vec![joint_child[ji]];
                while let Some(link) = stack.pop() {
                    moved_links[link] = true;
                    for &cj in &children[link] {
                        stack.push(link_index[&self.joints[cj].child_link]);
                    }
                }
            }
            let group = JointGroup {
                name: group_name.clone(),
                joint_names: names.clone(),
                variable_indices,
                moved_links,
            };
            if groups.insert(group_name.clone(), group).is_some() {
                return Err(invalid(format!("duplicate group '{}'", group_name)));
            }
        }

        let fingerprint = fingerprint(&self.name, &self.links, &joints);

        Ok(RobotModel {
            name: self.name,
            root_link,
            links: self.links,
            link_index,
            joints,
            joint_parent,
            joint_child,
            joint_variable,
            variable_names,
            groups,
            fingerprint,
        })
    }
}

fn fingerprint(name: &str, links: &[Link], joints: &[Joint]) -> u64 {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    for link in links {
        link.name.hash(&mut hasher);
        for shape in &link.shapes {
            let values: Vec<f64> = match shape {
                CollisionShape::Sphere { center, radius } => {
                    vec![center.x, center.y, center.z, *radius]
                }
                CollisionShape::Capsule { a, b, radius } => {
                    vec![a.x, a.y, a.z, b.x, b.y, b.z, *radius]
                }
            };
            values.iter().for_each(|v| v.to_bits().hash(&mut hasher));
        }
    }
    for joint in joints {
        joint.name.hash(&mut hasher);
        joint.parent_link.hash(&mut hasher);
        joint.child_link.hash(&mut hasher);
        let t = joint.origin.translation.vector;
        let q = joint.origin.rotation.coords;
        t.iter().chain(q.iter()).for_each(|v| v.to_bits().hash(&mut hasher));
        match joint.joint_type {
            JointType::Revolute { axis } => {
                1u8.hash(&mut hasher);
                axis.iter().for_each(|v| v.to_bits().hash(&mut hasher));
            }
            JointType::Prismatic { axis } => {
                2u8.hash(&mut hasher);
                axis.iter().for_each(|v| v.to_bits().hash(&mut hasher));
            }
            JointType::Fixed => 0u8.hash(&mut hasher),
        }
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::fixtures;

    #[test]
    fn test_sphere_signed_distance() {
        let s = CollisionShape::sphere(Point3::origin(), 0.5);
        assert!((s.signed_distance(&Point3::new(1.0, 0.0, 0.0)) - 0.5).abs() < 1e-12);
        assert!((s.signed_distance(&Point3::origin()) + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_capsule_signed_distance() {
        let c = CollisionShape::capsule(Point3::origin(), Point3::new(1.0, 0.0, 0.0), 0.1);
        assert!((c.signed_distance(&Point3::new(0.5, 0.3, 0.0)) - 0.2).abs() < 1e-12);
        assert!((c.signed_distance(&Point3::new(1.5, 0.0, 0.0)) - 0.4).abs() < 1e-12);
        assert!(c.signed_distance(&Point3::new(0.5, 0.0, 0.05)) < 0.0);
    }

    #[test]
    fn test_surface_points_lie_on_surface() {
        let c = CollisionShape::capsule(Point3::origin(), Point3::new(0.0, 0.4, 0.0), 0.05);
        let points = c.surface_points(0.02);
        assert!(points.len() > 50);
        for p in points {
            assert!(c.signed_distance(&p).abs() < 1e-9);
        }
    }

    #[test]
    fn test_build_orders_joints_topologically() {
        // joints declared child-first must still come out parent-first
        let model = RobotModelBuilder::new("chain")
            .link("base", vec![])
            .link("a", vec![])
            .link("b", vec![])
            .joint(Joint::revolute("j2", "a", "b", Isometry3::identity(), Vector3::z()))
            .joint(Joint::revolute("j1", "base", "a", Isometry3::identity(), Vector3::z()))
            .group("arm", &["j1", "j2"])
            .build()
            .unwrap();

        assert_eq!(model.joints()[0].name, "j1");
        assert_eq!(model.joints()[1].name, "j2");
        assert_eq!(model.variable_names(), &["j1".to_string(), "j2".to_string()]);

        let group = model.joint_group("arm").unwrap();
        assert_eq!(group.variable_count(), 2);
        assert!(!group.moves_link(model.link_index("base").unwrap()));
        assert!(group.moves_link(model.link_index("b").unwrap()));
    }

    #[test]
    fn test_build_rejects_bad_topology() {
        let result = RobotModelBuilder::new("broken")
            .link("base", vec![])
            .joint(Joint::fixed("j", "base", "missing", Isometry3::identity()))
            .build();
        assert!(matches!(result, Err(CostFunctionError::InvalidRobotModel(_))));

        let result = RobotModelBuilder::new("two_roots")
            .link("a", vec![])
            .link("b", vec![])
            .build();
        assert!(result.is_err());

        let result = RobotModelBuilder::new("fixed_group")
            .link("a", vec![])
            .link("b", vec![])
            .joint(Joint::fixed("j", "a", "b", Isometry3::identity()))
            .group("g", &["j"])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_fingerprint_tracks_geometry() {
        let a = fixtures::two_link_arm(0.4);
        let b = fixtures::two_link_arm(0.4);
        let c = fixtures::two_link_arm(0.3);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_adjacent_link_pairs() {
        let model = fixtures::two_link_arm(0.4);
        let pairs = model.adjacent_link_pairs();
        assert_eq!(pairs, vec![("base", "link1"), ("link1", "link2")]);
    }
}
