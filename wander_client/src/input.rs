//! Input handling.
//!
//! A real front end samples keyboard/mouse and runs physics. This walker
//! just integrates sampled input into a pose and produces the per-tick
//! `Movement` message.

use wander_shared::{
    math::{wrap_angle, yaw_forward, Vec3},
    protocol::ClientMsg,
};

/// Walking speed in units per second.
pub const WALK_SPEED: f32 = 4.0;
/// Turn rate in radians per second at full input.
pub const TURN_SPEED: f32 = 2.5;

/// User input state at a moment in time. Axes are in `[-1, 1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputState {
    pub forward: f32,
    pub right: f32,
    /// Positive turns left.
    pub turn: f32,
}

/// Local pose integrator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Walker {
    pub position: Vec3,
    pub yaw: f32,
}

impl Walker {
    /// Puts the walker at a room's entry point facing the default direction.
    pub fn teleport(&mut self, spawn: Vec3) {
        self.position = spawn;
        self.yaw = 0.0;
    }

    /// Advances the pose by `dt` seconds of `input`.
    pub fn step(&mut self, input: InputState, dt: f32) {
        self.yaw = wrap_angle(self.yaw + input.turn.clamp(-1.0, 1.0) * TURN_SPEED * dt);

        let forward = yaw_forward(self.yaw);
        // Right is forward rotated a quarter turn clockwise.
        let right = Vec3::new(-forward.z, 0.0, forward.x);
        let wish = forward
            .scale(input.forward.clamp(-1.0, 1.0))
            .add(right.scale(input.right.clamp(-1.0, 1.0)));
        let len = wish.len_sq().sqrt();
        if len > 1e-6 {
            // Diagonals are not faster than straight lines.
            let norm = wish.scale(1.0 / len.max(1.0));
            self.position = self.position.add(norm.scale(WALK_SPEED * dt));
        }
    }

    /// The `Movement` message for the current pose.
    pub fn movement(&self) -> ClientMsg {
        ClientMsg::Movement {
            position: self.position,
            rotation: self.yaw,
        }
    }
}
