//! Screen-space object picking against the live scene.

use super::{ObjectId, Scene};
use crate::util::{ray_sphere, ray_triangle, Ray};

const PICK_EPSILON: f32 = 1e-4;

impl Scene {
    /// Nearest object hit by `ray`, with its distance.
    pub fn pick(&self, ray: &Ray) -> Option<(ObjectId, f32)> {
        let inv_dir = ray.dir.recip();
        let mut best: Option<(ObjectId, f32)> = None;

        for obj in self.objects() {
            let t_max = best.map_or(f32::INFINITY, |(_, t)| t);

            if let Some((center, radius)) = obj.analytic_sphere() {
                if let Some(t) = ray_sphere(ray, center, radius, PICK_EPSILON, t_max) {
                    best = Some((obj.id, t));
                }
                continue;
            }

            if obj
                .bounds(self.library())
                .hit(ray.origin, inv_dir, PICK_EPSILON, t_max)
                .is_none()
            {
                continue;
            }

            let mesh = obj.shape.base_mesh(self.library());
            let m = obj.world_matrix();
            let mut nearest = t_max;
            for tri in mesh.world_triangles(&m) {
                if let Some((t, _, _)) = ray_triangle(ray, &tri, PICK_EPSILON, nearest) {
                    nearest = t;
                }
            }
            if nearest < t_max {
                best = Some((obj.id, nearest));
            }
        }

        best
    }

    /// Pick through pixel `(x, y)` of the current camera.
    pub fn pick_pixel(&self, x: f32, y: f32) -> Option<ObjectId> {
        let ray = self.camera.ray_through(x + 0.5, y + 0.5);
        self.pick(&ray).map(|(id, _)| id)
    }
}
