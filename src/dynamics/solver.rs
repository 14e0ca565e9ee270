use glam::{Mat2, Vec2};

use crate::{
    collision::manifold::{Manifold, ManifoldType, WorldManifold},
    config::{BAUMGARTE, LINEAR_SLOP, MAX_LINEAR_CORRECTION, MAX_MANIFOLD_POINTS, TOI_BAUMGARTE},
    core::{
        body::{Body, BodyType},
        types::{Position, Rot, Sweep, Transform, Velocity},
    },
    dynamics::contact::ContactImpulse,
    utils::{
        allocator::BodyHandle,
        math::{cross, cross_sv, cross_vs, inverse22},
    },
};

/// Condition number bound for the two-point block solver.
const MAX_CONDITION_NUMBER: f32 = 1000.0;

/// Per-step timing shared by every constraint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeStep {
    pub dt: f32,
    pub inv_dt: f32,
    /// `dt` of this step divided by `dt` of the previous one.
    pub dt_ratio: f32,
    pub velocity_iterations: u32,
    pub position_iterations: u32,
    pub warm_starting: bool,
}

/// Island-local copy of a body's solver-relevant state.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SolverBody {
    /// `None` for the fixed anchor of a world-anchored joint.
    pub handle: Option<BodyHandle>,
    pub body_type: BodyType,
    pub sweep: Sweep,
    pub mass: f32,
    pub inv_mass: f32,
    pub inv_inertia: f32,
    pub force: Vec2,
    pub torque: f32,
    pub gravity_scale: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub allow_sleep: bool,
    pub sleep_time: f32,
}

impl SolverBody {
    /// Immovable body at the world origin.
    pub fn ground() -> Self {
        Self {
            handle: None,
            body_type: BodyType::Static,
            sweep: Sweep::default(),
            mass: 0.0,
            inv_mass: 0.0,
            inv_inertia: 0.0,
            force: Vec2::ZERO,
            torque: 0.0,
            gravity_scale: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            allow_sleep: true,
            sleep_time: 0.0,
        }
    }

    pub fn from_body(handle: BodyHandle, body: &Body) -> Self {
        Self {
            handle: Some(handle),
            body_type: body.body_type,
            sweep: body.sweep,
            mass: body.mass,
            inv_mass: body.inv_mass,
            inv_inertia: body.inv_inertia,
            force: body.force,
            torque: body.torque,
            gravity_scale: body.gravity_scale,
            linear_damping: body.linear_damping,
            angular_damping: body.angular_damping,
            allow_sleep: body.allow_sleep,
            sleep_time: body.sleep_time,
        }
    }

    /// Snapshot that the solver cannot move: zero inverse mass, static type.
    pub fn fixed(handle: BodyHandle, body: &Body) -> Self {
        Self {
            body_type: BodyType::Static,
            inv_mass: 0.0,
            inv_inertia: 0.0,
            ..Self::from_body(handle, body)
        }
    }

    pub fn local_center(&self) -> Vec2 {
        self.sweep.local_center
    }
}

/// Mutable solver state handed to joints.
pub(crate) struct SolverData<'a> {
    pub step: TimeStep,
    pub bodies: &'a [SolverBody],
    pub positions: &'a mut [Position],
    pub velocities: &'a mut [Velocity],
}

/// What the contact solver needs from one contact.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ContactSolverInput {
    pub manifold: Manifold,
    pub index_a: usize,
    pub index_b: usize,
    pub friction: f32,
    pub restitution: f32,
    pub tangent_speed: f32,
    pub radius_a: f32,
    pub radius_b: f32,
}

#[derive(Debug, Clone, Copy, Default)]
struct VelocityConstraintPoint {
    r_a: Vec2,
    r_b: Vec2,
    normal_impulse: f32,
    tangent_impulse: f32,
    normal_mass: f32,
    tangent_mass: f32,
    velocity_bias: f32,
}

#[derive(Debug, Clone, Copy)]
struct VelocityConstraint {
    points: [VelocityConstraintPoint; MAX_MANIFOLD_POINTS],
    normal: Vec2,
    normal_mass: Mat2,
    k: Mat2,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_i_a: f32,
    inv_i_b: f32,
    friction: f32,
    restitution: f32,
    tangent_speed: f32,
    point_count: usize,
}

#[derive(Debug, Clone, Copy)]
struct PositionConstraint {
    local_points: [Vec2; MAX_MANIFOLD_POINTS],
    local_normal: Vec2,
    local_point: Vec2,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    local_center_a: Vec2,
    local_center_b: Vec2,
    inv_i_a: f32,
    inv_i_b: f32,
    manifold_type: ManifoldType,
    radius_a: f32,
    radius_b: f32,
    point_count: usize,
}

impl PositionConstraint {
    /// Normal, contact point and separation of point `index` in world space.
    fn evaluate(&self, xf_a: &Transform, xf_b: &Transform, index: usize) -> (Vec2, Vec2, f32) {
        match self.manifold_type {
            ManifoldType::Circles => {
                let point_a = xf_a.apply(self.local_point);
                let point_b = xf_b.apply(self.local_points[0]);
                let normal = (point_b - point_a).normalize_or_zero();
                let point = 0.5 * (point_a + point_b);
                let separation = (point_b - point_a).dot(normal) - self.radius_a - self.radius_b;
                (normal, point, separation)
            }
            ManifoldType::FaceA => {
                let normal = xf_a.q.apply(self.local_normal);
                let plane_point = xf_a.apply(self.local_point);
                let clip_point = xf_b.apply(self.local_points[index]);
                let separation =
                    (clip_point - plane_point).dot(normal) - self.radius_a - self.radius_b;
                (normal, clip_point, separation)
            }
            ManifoldType::FaceB => {
                let normal = xf_b.q.apply(self.local_normal);
                let plane_point = xf_b.apply(self.local_point);
                let clip_point = xf_a.apply(self.local_points[index]);
                let separation =
                    (clip_point - plane_point).dot(normal) - self.radius_a - self.radius_b;
                // Keep the normal pointing from A to B.
                (-normal, clip_point, separation)
            }
        }
    }
}

fn body_transform(position: &Position, local_center: Vec2) -> Transform {
    let q = Rot::new(position.a);
    Transform {
        p: position.c - q.apply(local_center),
        q,
    }
}

/// Sequential-impulse solver for the contacts of one island.
pub(crate) struct ContactSolver {
    inputs: Vec<ContactSolverInput>,
    velocity_constraints: Vec<VelocityConstraint>,
    position_constraints: Vec<PositionConstraint>,
    /// Restitution is only applied above this approach speed.
    velocity_threshold: f32,
    block_solve: bool,
}

impl ContactSolver {
    pub fn new(
        step: TimeStep,
        inputs: Vec<ContactSolverInput>,
        bodies: &[SolverBody],
        velocity_threshold: f32,
    ) -> Self {
        let mut velocity_constraints = Vec::with_capacity(inputs.len());
        let mut position_constraints = Vec::with_capacity(inputs.len());

        for input in &inputs {
            let manifold = &input.manifold;
            let point_count = manifold.point_count;
            debug_assert!(point_count > 0);
            let body_a = &bodies[input.index_a];
            let body_b = &bodies[input.index_b];

            let mut vc = VelocityConstraint {
                points: [VelocityConstraintPoint::default(); MAX_MANIFOLD_POINTS],
                normal: Vec2::ZERO,
                normal_mass: Mat2::ZERO,
                k: Mat2::ZERO,
                index_a: input.index_a,
                index_b: input.index_b,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                inv_i_a: body_a.inv_inertia,
                inv_i_b: body_b.inv_inertia,
                friction: input.friction,
                restitution: input.restitution,
                tangent_speed: input.tangent_speed,
                point_count,
            };
            let mut pc = PositionConstraint {
                local_points: [Vec2::ZERO; MAX_MANIFOLD_POINTS],
                local_normal: manifold.local_normal,
                local_point: manifold.local_point,
                index_a: input.index_a,
                index_b: input.index_b,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                local_center_a: body_a.local_center(),
                local_center_b: body_b.local_center(),
                inv_i_a: body_a.inv_inertia,
                inv_i_b: body_b.inv_inertia,
                manifold_type: manifold.manifold_type,
                radius_a: input.radius_a,
                radius_b: input.radius_b,
                point_count,
            };

            for (j, point) in manifold.points().iter().enumerate() {
                let vcp = &mut vc.points[j];
                if step.warm_starting {
                    vcp.normal_impulse = step.dt_ratio * point.normal_impulse;
                    vcp.tangent_impulse = step.dt_ratio * point.tangent_impulse;
                }
                pc.local_points[j] = point.local_point;
            }

            velocity_constraints.push(vc);
            position_constraints.push(pc);
        }

        Self {
            inputs,
            velocity_constraints,
            position_constraints,
            velocity_threshold,
            block_solve: true,
        }
    }

    pub fn contact_count(&self) -> usize {
        self.velocity_constraints.len()
    }

    /// Computes anchors, effective masses and restitution bias.
    pub fn initialize_velocity_constraints(
        &mut self,
        positions: &[Position],
        velocities: &[Velocity],
    ) {
        for i in 0..self.velocity_constraints.len() {
            let input = self.inputs[i];
            let pc = self.position_constraints[i];
            let vc = &mut self.velocity_constraints[i];

            let (m_a, m_b) = (vc.inv_mass_a, vc.inv_mass_b);
            let (i_a, i_b) = (vc.inv_i_a, vc.inv_i_b);

            let pos_a = positions[vc.index_a];
            let pos_b = positions[vc.index_b];
            let vel_a = velocities[vc.index_a];
            let vel_b = velocities[vc.index_b];

            let xf_a = body_transform(&pos_a, pc.local_center_a);
            let xf_b = body_transform(&pos_b, pc.local_center_b);
            let world_manifold =
                WorldManifold::new(&input.manifold, &xf_a, pc.radius_a, &xf_b, pc.radius_b);

            vc.normal = world_manifold.normal;
            let tangent = cross_vs(vc.normal, 1.0);

            for j in 0..vc.point_count {
                let vcp = &mut vc.points[j];
                vcp.r_a = world_manifold.points[j] - pos_a.c;
                vcp.r_b = world_manifold.points[j] - pos_b.c;

                let rn_a = cross(vcp.r_a, vc.normal);
                let rn_b = cross(vcp.r_b, vc.normal);
                let k_normal = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                vcp.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

                let rt_a = cross(vcp.r_a, tangent);
                let rt_b = cross(vcp.r_b, tangent);
                let k_tangent = m_a + m_b + i_a * rt_a * rt_a + i_b * rt_b * rt_b;
                vcp.tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

                vcp.velocity_bias = 0.0;
                let v_rel = vc.normal.dot(
                    vel_b.linear + cross_sv(vel_b.angular, vcp.r_b)
                        - vel_a.linear
                        - cross_sv(vel_a.angular, vcp.r_a),
                );
                if v_rel < -self.velocity_threshold {
                    vcp.velocity_bias = -vc.restitution * v_rel;
                }
            }

            if vc.point_count == 2 && self.block_solve {
                let p1 = vc.points[0];
                let p2 = vc.points[1];
                let rn1_a = cross(p1.r_a, vc.normal);
                let rn1_b = cross(p1.r_b, vc.normal);
                let rn2_a = cross(p2.r_a, vc.normal);
                let rn2_b = cross(p2.r_b, vc.normal);

                let k11 = m_a + m_b + i_a * rn1_a * rn1_a + i_b * rn1_b * rn1_b;
                let k22 = m_a + m_b + i_a * rn2_a * rn2_a + i_b * rn2_b * rn2_b;
                let k12 = m_a + m_b + i_a * rn1_a * rn2_a + i_b * rn1_b * rn2_b;

                if k11 * k11 < MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12) {
                    vc.k = Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));
                    vc.normal_mass = inverse22(vc.k);
                } else {
                    // Nearly redundant points; fall back to one.
                    vc.point_count = 1;
                }
            }
        }
    }

    pub fn warm_start(&self, velocities: &mut [Velocity]) {
        for vc in &self.velocity_constraints {
            let mut vel_a = velocities[vc.index_a];
            let mut vel_b = velocities[vc.index_b];
            let tangent = cross_vs(vc.normal, 1.0);

            for vcp in &vc.points[..vc.point_count] {
                let p = vcp.normal_impulse * vc.normal + vcp.tangent_impulse * tangent;
                vel_a.angular -= vc.inv_i_a * cross(vcp.r_a, p);
                vel_a.linear -= vc.inv_mass_a * p;
                vel_b.angular += vc.inv_i_b * cross(vcp.r_b, p);
                vel_b.linear += vc.inv_mass_b * p;
            }

            velocities[vc.index_a] = vel_a;
            velocities[vc.index_b] = vel_b;
        }
    }

    pub fn solve_velocity_constraints(&mut self, velocities: &mut [Velocity]) {
        for vc in &mut self.velocity_constraints {
            let (m_a, m_b) = (vc.inv_mass_a, vc.inv_mass_b);
            let (i_a, i_b) = (vc.inv_i_a, vc.inv_i_b);
            let mut v_a = velocities[vc.index_a].linear;
            let mut w_a = velocities[vc.index_a].angular;
            let mut v_b = velocities[vc.index_b].linear;
            let mut w_b = velocities[vc.index_b].angular;

            let normal = vc.normal;
            let tangent = cross_vs(normal, 1.0);

            // Friction first so the normal impulse has the last word on penetration.
            for vcp in &mut vc.points[..vc.point_count] {
                let dv = v_b + cross_sv(w_b, vcp.r_b) - v_a - cross_sv(w_a, vcp.r_a);
                let vt = dv.dot(tangent) - vc.tangent_speed;
                let lambda = vcp.tangent_mass * -vt;

                let max_friction = vc.friction * vcp.normal_impulse;
                let new_impulse = (vcp.tangent_impulse + lambda).clamp(-max_friction, max_friction);
                let lambda = new_impulse - vcp.tangent_impulse;
                vcp.tangent_impulse = new_impulse;

                let p = lambda * tangent;
                v_a -= m_a * p;
                w_a -= i_a * cross(vcp.r_a, p);
                v_b += m_b * p;
                w_b += i_b * cross(vcp.r_b, p);
            }

            if vc.point_count == 1 || !self.block_solve {
                for vcp in &mut vc.points[..vc.point_count] {
                    let dv = v_b + cross_sv(w_b, vcp.r_b) - v_a - cross_sv(w_a, vcp.r_a);
                    let vn = dv.dot(normal);
                    let lambda = -vcp.normal_mass * (vn - vcp.velocity_bias);

                    let new_impulse = (vcp.normal_impulse + lambda).max(0.0);
                    let lambda = new_impulse - vcp.normal_impulse;
                    vcp.normal_impulse = new_impulse;

                    let p = lambda * normal;
                    v_a -= m_a * p;
                    w_a -= i_a * cross(vcp.r_a, p);
                    v_b += m_b * p;
                    w_b += i_b * cross(vcp.r_b, p);
                }
            } else {
                // Two-point LCP solved by enumerating the four complementarity cases.
                let (cp1, cp2) = (vc.points[0], vc.points[1]);
                let a = Vec2::new(cp1.normal_impulse, cp2.normal_impulse);
                debug_assert!(a.x >= 0.0 && a.y >= 0.0);

                let dv1 = v_b + cross_sv(w_b, cp1.r_b) - v_a - cross_sv(w_a, cp1.r_a);
                let dv2 = v_b + cross_sv(w_b, cp2.r_b) - v_a - cross_sv(w_a, cp2.r_a);
                let vn1 = dv1.dot(normal);
                let vn2 = dv2.dot(normal);

                let b = Vec2::new(vn1 - cp1.velocity_bias, vn2 - cp2.velocity_bias) - vc.k * a;

                let candidates = [
                    {
                        let x = -(vc.normal_mass * b);
                        (x, x.x >= 0.0 && x.y >= 0.0)
                    },
                    {
                        let x = Vec2::new(-cp1.normal_mass * b.x, 0.0);
                        let vn2 = vc.k.x_axis.y * x.x + b.y;
                        (x, x.x >= 0.0 && vn2 >= 0.0)
                    },
                    {
                        let x = Vec2::new(0.0, -cp2.normal_mass * b.y);
                        let vn1 = vc.k.y_axis.x * x.y + b.x;
                        (x, x.y >= 0.0 && vn1 >= 0.0)
                    },
                    (Vec2::ZERO, b.x >= 0.0 && b.y >= 0.0),
                ];

                if let Some((x, _)) = candidates.iter().find(|(_, valid)| *valid) {
                    let d = *x - a;
                    let p1 = d.x * normal;
                    let p2 = d.y * normal;
                    v_a -= m_a * (p1 + p2);
                    w_a -= i_a * (cross(cp1.r_a, p1) + cross(cp2.r_a, p2));
                    v_b += m_b * (p1 + p2);
                    w_b += i_b * (cross(cp1.r_b, p1) + cross(cp2.r_b, p2));
                    vc.points[0].normal_impulse = x.x;
                    vc.points[1].normal_impulse = x.y;
                }
                // No valid case: leave the impulses untouched this iteration.
            }

            velocities[vc.index_a] = Velocity::new(v_a, w_a);
            velocities[vc.index_b] = Velocity::new(v_b, w_b);
        }
    }

    /// Writes accumulated impulses back into the manifolds for warm starting.
    pub fn store_impulses(&mut self) {
        for (vc, input) in self.velocity_constraints.iter().zip(self.inputs.iter_mut()) {
            for (j, point) in input.manifold.points_mut().iter_mut().enumerate() {
                point.normal_impulse = vc.points[j].normal_impulse;
                point.tangent_impulse = vc.points[j].tangent_impulse;
            }
        }
    }

    /// Manifolds carrying the impulses saved by [`store_impulses`](Self::store_impulses).
    pub fn manifolds(&self) -> impl Iterator<Item = &Manifold> + '_ {
        self.inputs.iter().map(|input| &input.manifold)
    }

    /// Impulses applied to each contact, in input order.
    pub fn impulses(&self) -> Vec<ContactImpulse> {
        self.velocity_constraints
            .iter()
            .map(|vc| {
                let mut impulse = ContactImpulse {
                    count: vc.point_count,
                    ..Default::default()
                };
                for (j, vcp) in vc.points[..vc.point_count].iter().enumerate() {
                    impulse.normal_impulses[j] = vcp.normal_impulse;
                    impulse.tangent_impulses[j] = vcp.tangent_impulse;
                }
                impulse
            })
            .collect()
    }

    /// One non-linear Gauss-Seidel pass. Returns `true` once the worst
    /// penetration is within three times the slop.
    pub fn solve_position_constraints(&self, positions: &mut [Position]) -> bool {
        let min_separation = self.solve_positions(positions, BAUMGARTE, None);
        min_separation >= -3.0 * LINEAR_SLOP
    }

    /// Position pass used during TOI resolution; only the two TOI bodies move.
    pub fn solve_toi_position_constraints(
        &self,
        positions: &mut [Position],
        toi_index_a: usize,
        toi_index_b: usize,
    ) -> bool {
        let min_separation =
            self.solve_positions(positions, TOI_BAUMGARTE, Some((toi_index_a, toi_index_b)));
        min_separation >= -1.5 * LINEAR_SLOP
    }

    fn solve_positions(
        &self,
        positions: &mut [Position],
        baumgarte: f32,
        toi_pair: Option<(usize, usize)>,
    ) -> f32 {
        let mut min_separation = 0.0_f32;

        for pc in &self.position_constraints {
            let movable = |index: usize| match toi_pair {
                Some((a, b)) => index == a || index == b,
                None => true,
            };
            let (m_a, i_a) = if movable(pc.index_a) {
                (pc.inv_mass_a, pc.inv_i_a)
            } else {
                (0.0, 0.0)
            };
            let (m_b, i_b) = if movable(pc.index_b) {
                (pc.inv_mass_b, pc.inv_i_b)
            } else {
                (0.0, 0.0)
            };

            let mut pos_a = positions[pc.index_a];
            let mut pos_b = positions[pc.index_b];

            for j in 0..pc.point_count {
                let xf_a = body_transform(&pos_a, pc.local_center_a);
                let xf_b = body_transform(&pos_b, pc.local_center_b);
                let (normal, point, separation) = pc.evaluate(&xf_a, &xf_b, j);

                let r_a = point - pos_a.c;
                let r_b = point - pos_b.c;
                min_separation = min_separation.min(separation);

                let c = (baumgarte * (separation + LINEAR_SLOP)).clamp(-MAX_LINEAR_CORRECTION, 0.0);

                let rn_a = cross(r_a, normal);
                let rn_b = cross(r_b, normal);
                let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                let impulse = if k > 0.0 { -c / k } else { 0.0 };
                let p = impulse * normal;

                pos_a.c -= m_a * p;
                pos_a.a -= i_a * cross(r_a, p);
                pos_b.c += m_b * p;
                pos_b.a += i_b * cross(r_b, p);
            }

            positions[pc.index_a] = pos_a;
            positions[pc.index_b] = pos_b;
        }

        min_separation
    }
}
