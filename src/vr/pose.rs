use super::{DeviceSession, EyePoses, FovPort, HmdRuntime, Pose};
use glam::{Mat4, Quat, Vec3, Vec4};

pub const NEAR_CLIP: f32 = 0.2;
pub const FAR_CLIP: f32 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeTransforms {
    pub view: Mat4,
    pub projection: Mat4,
}

/// Projection terms the compositor needs to re-warp a frame at display time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimewarpProjectionDesc {
    pub projection22: f32,
    pub projection23: f32,
    pub projection32: f32,
}

impl TimewarpProjectionDesc {
    pub fn from_projection(projection: &Mat4) -> Self {
        // glam is column-major: `col(c)[r]` is row r, column c.
        Self {
            projection22: projection.col(2)[2],
            projection23: projection.col(3)[2],
            projection32: projection.col(2)[3],
        }
    }
}

/// Right-handed perspective projection for an asymmetric FOV, mapping depth
/// to [0, 1].
pub fn projection_rh(fov: &FovPort, near: f32, far: f32) -> Mat4 {
    let x_scale = 2.0 / (fov.left_tan + fov.right_tan);
    let x_offset = (fov.left_tan - fov.right_tan) * x_scale * 0.5;
    let y_scale = 2.0 / (fov.up_tan + fov.down_tan);
    let y_offset = (fov.up_tan - fov.down_tan) * y_scale * 0.5;

    Mat4::from_cols(
        Vec4::new(x_scale, 0.0, 0.0, 0.0),
        Vec4::new(0.0, y_scale, 0.0, 0.0),
        Vec4::new(-x_offset, y_offset, far / (near - far), -1.0),
        Vec4::new(0.0, 0.0, far * near / (near - far), 0.0),
    )
}

/// View and projection for one eye.
///
/// The body frame is rotated by `body_yaw` about +Y and placed at
/// `body_position`; the tracked eye pose is expressed inside it.
pub fn compute_transforms(
    pose: &Pose,
    body_yaw: f32,
    body_position: Vec3,
    fov: &FovPort,
    near: f32,
    far: f32,
) -> EyeTransforms {
    let yaw = Quat::from_rotation_y(body_yaw);
    let orientation = yaw * pose.orientation;
    let up = orientation * Vec3::Y;
    let forward = orientation * Vec3::NEG_Z;
    let eye_position = body_position + yaw * pose.position;

    EyeTransforms {
        view: Mat4::look_at_rh(eye_position, eye_position + forward, up),
        projection: projection_rh(fov, near, far),
    }
}

/// Predicted poses for one frame, or identity poses if the query failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedPoses {
    pub frame_index: i64,
    pub poses: EyePoses,
    pub fallback: bool,
}

/// Turns predicted eye poses into per-eye transforms for a fixed body frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseResolver {
    body_yaw: f32,
    body_position: Vec3,
    near: f32,
    far: f32,
}

impl PoseResolver {
    pub fn new(body_yaw: f32, body_position: Vec3) -> Self {
        Self {
            body_yaw,
            body_position,
            near: NEAR_CLIP,
            far: FAR_CLIP,
        }
    }

    pub fn body_position(&self) -> Vec3 {
        self.body_position
    }

    pub fn body_yaw(&self) -> f32 {
        self.body_yaw
    }

    /// Asks the runtime for eye poses predicted at `frame_index`.
    ///
    /// A failed query is logged and replaced by identity poses with a zero
    /// sample time so the frame can still be drawn.
    pub fn resolve_poses<R: HmdRuntime>(
        &self,
        session: &mut DeviceSession<R>,
        frame_index: i64,
        hmd_to_eye: &[Pose; 2],
    ) -> ResolvedPoses {
        match session.eye_poses(frame_index, hmd_to_eye) {
            Ok(poses) => ResolvedPoses {
                frame_index,
                poses,
                fallback: false,
            },
            Err(err) => {
                log::warn!(
                    "[pose] eye pose query for frame {} failed: {}; using identity poses",
                    frame_index,
                    err
                );
                ResolvedPoses {
                    frame_index,
                    poses: EyePoses {
                        poses: [Pose::IDENTITY; 2],
                        sensor_sample_time: 0.0,
                    },
                    fallback: true,
                }
            }
        }
    }

    pub fn compute_transforms(&self, pose: &Pose, fov: &FovPort) -> EyeTransforms {
        compute_transforms(pose, self.body_yaw, self.body_position, fov, self.near, self.far)
    }
}
