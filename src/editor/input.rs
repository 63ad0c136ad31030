//! Fly-camera input state.

use std::collections::HashSet;

use crate::scene::Camera;
use crate::util::{Vec2, Vec3};

/// Radians per tick for arrow-key look.
const KEY_LOOK_SPEED: f32 = 0.03;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Forward,
    Back,
    Left,
    Right,
    Up,
    Down,
    LookLeft,
    LookRight,
    LookUp,
    LookDown,
}

impl Key {
    /// Map a conventional key name (`"w"`, `"ArrowLeft"`, `" "`, ...).
    pub fn from_name(name: &str) -> Option<Key> {
        Some(match name.to_ascii_lowercase().as_str() {
            "w" => Key::Forward,
            "s" => Key::Back,
            "a" => Key::Left,
            "d" => Key::Right,
            " " | "space" => Key::Up,
            "shift" => Key::Down,
            "arrowleft" => Key::LookLeft,
            "arrowright" => Key::LookRight,
            "arrowup" => Key::LookUp,
            "arrowdown" => Key::LookDown,
            _ => return None,
        })
    }
}

/// Keys held plus mouse motion accumulated since the last tick.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    pressed: HashSet<Key>,
    mouse_delta: Vec2,
}

impl InputState {
    pub fn key_down(&mut self, key: Key) {
        self.pressed.insert(key);
    }

    pub fn key_up(&mut self, key: Key) {
        self.pressed.remove(&key);
    }

    pub fn is_pressed(&self, key: Key) -> bool {
        self.pressed.contains(&key)
    }

    /// Accumulate mouse movement in pixels (`dy` positive = down).
    pub fn mouse_move(&mut self, dx: f32, dy: f32) {
        if dx.is_finite() && dy.is_finite() {
            self.mouse_delta += Vec2::new(dx, dy);
        }
    }

    pub fn clear(&mut self) {
        self.pressed.clear();
        self.mouse_delta = Vec2::ZERO;
    }

    fn axis(&self, pos: Key, neg: Key) -> f32 {
        self.is_pressed(pos) as i32 as f32 - self.is_pressed(neg) as i32 as f32
    }

    /// Move and turn `camera` for one tick, then drop the consumed mouse
    /// motion. Returns true if the camera changed.
    pub fn apply(&mut self, camera: &mut Camera, move_speed: f32, look_sensitivity: f32) -> bool {
        let mut changed = false;

        let d_yaw = -self.mouse_delta.x * look_sensitivity
            + self.axis(Key::LookLeft, Key::LookRight) * KEY_LOOK_SPEED;
        let d_pitch = -self.mouse_delta.y * look_sensitivity
            + self.axis(Key::LookUp, Key::LookDown) * KEY_LOOK_SPEED;
        self.mouse_delta = Vec2::ZERO;
        if d_yaw != 0.0 || d_pitch != 0.0 {
            camera.rotate(d_yaw, d_pitch);
            changed = true;
        }

        let fwd = camera.forward();
        let flat = Vec3::new(fwd.x, 0.0, fwd.z).normalize_or_zero();
        let step = flat * self.axis(Key::Forward, Key::Back)
            + camera.right() * self.axis(Key::Right, Key::Left)
            + Vec3::Y * self.axis(Key::Up, Key::Down);
        if step != Vec3::ZERO {
            camera.pos += step * move_speed;
            changed = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_moves_along_view() {
        let mut cam = Camera::default();
        let start = cam.pos;
        let mut input = InputState::default();
        input.key_down(Key::Forward);
        assert!(input.apply(&mut cam, 0.5, 0.01));
        assert!((cam.pos - (start + Vec3::new(0.0, 0.0, -0.5))).length() < 1e-5);

        input.key_up(Key::Forward);
        assert!(!input.apply(&mut cam, 0.5, 0.01));
    }

    #[test]
    fn test_mouse_turns_once() {
        let mut cam = Camera::default();
        let mut input = InputState::default();
        input.mouse_move(100.0, 0.0);
        input.apply(&mut cam, 0.1, 0.001);
        // Moving the mouse right turns toward +X
        assert!(cam.forward().x > 0.0);
        let yaw = cam.yaw;
        input.apply(&mut cam, 0.1, 0.001);
        assert_eq!(cam.yaw, yaw);
    }

    #[test]
    fn test_key_names() {
        assert_eq!(Key::from_name("W"), Some(Key::Forward));
        assert_eq!(Key::from_name("ArrowUp"), Some(Key::LookUp));
        assert_eq!(Key::from_name("q"), None);
    }
}
