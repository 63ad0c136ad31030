//! Selection and edit-mode controller.
//!
//! Owns the mode state machine and is the single entry point for every
//! caller-facing operation. All calls come from one control thread.
//!
//! ```text
//!  Rasterizing --enter_edit_mode--> Editing --enter_ray_tracing_mode--> RayTracing
//!       ^                              |                                   |
//!       +--------exit_edit_mode--------+                                   |
//!       +------------------------stop_ray_tracing--------------------------+
//! ```
//!
//! Precondition failures (wrong mode, no selection, non-editable material,
//! stale id) are logged with `warn!` and ignored. Only asset loading, scene
//! import and worker-pool provisioning return errors.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::events::{EngineEvent, EventDispatcher};
use super::input::{InputState, Key};
use super::GameStatus;
use crate::config::EngineConfig;
use crate::pathtracer::{RenderJob, RenderProgress, RenderSettings, RenderedImage, SceneSnapshot, WorkerPool};
use crate::raster::{Framebuffer, Rasterizer};
use crate::scene::{
    Material, MaterialProperties, ObjectId, Primitive, Scene, ScenePreset, SceneState, Transform,
    TransformUpdate,
};
use crate::util::{Error, Result, Vec3};

pub struct Controller {
    config: EngineConfig,
    scene: Arc<RwLock<Scene>>,
    status: GameStatus,
    selected: Option<ObjectId>,
    follow_camera: bool,
    input: InputState,
    rasterizer: Rasterizer,
    framebuffer: Framebuffer,
    pool: Option<WorkerPool>,
    job: Option<RenderJob>,
    last_render: Option<Arc<RenderedImage>>,
    events: EventDispatcher,
    loop_started: bool,
    frames: u64,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Controller {
    pub fn new(config: EngineConfig) -> Self {
        let config = config.validated();
        let scene = Scene::from_config(&config);
        Self {
            rasterizer: Rasterizer::new(config.ambient).with_shadows(config.shadows),
            framebuffer: Framebuffer::new(config.width, config.height),
            scene: Arc::new(RwLock::new(scene)),
            config,
            status: GameStatus::Rasterizing,
            selected: None,
            follow_camera: false,
            input: InputState::default(),
            pool: None,
            job: None,
            last_render: None,
            events: EventDispatcher::new(),
            loop_started: false,
            frames: 0,
        }
    }

    // ---- Accessors ----

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn selected(&self) -> Option<ObjectId> {
        self.selected
    }

    pub fn follow_camera(&self) -> bool {
        self.follow_camera
    }

    /// Shared handle on the live scene.
    pub fn scene(&self) -> Arc<RwLock<Scene>> {
        Arc::clone(&self.scene)
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    // ---- Mode transitions ----

    fn set_status(&mut self, status: GameStatus) {
        if self.status != status {
            info!("mode {:?} -> {:?}", self.status, status);
            self.status = status;
            self.events.emit(EngineEvent::GameStatusChanged(status));
        }
    }

    fn require_editing(&self, op: &str) -> bool {
        if self.status != GameStatus::Editing {
            warn!("{}: not in edit mode ({:?})", op, self.status);
            return false;
        }
        true
    }

    /// Editing-mode selection, or a logged no-op. Drops stale ids.
    fn require_selection(&mut self, op: &str) -> Option<ObjectId> {
        if !self.require_editing(op) {
            return None;
        }
        let Some(id) = self.selected else {
            warn!("{}: nothing selected", op);
            return None;
        };
        if !self.scene.read().contains(id) {
            warn!("{}: selected {} no longer exists", op, id);
            self.set_selection(None);
            return None;
        }
        Some(id)
    }

    /// Enter Editing. From RayTracing the render job is stopped first.
    pub fn enter_edit_mode(&mut self) {
        match self.status {
            GameStatus::Editing => debug!("enter_edit_mode: already editing"),
            GameStatus::RayTracing => {
                self.stop_job();
                self.set_status(GameStatus::Editing);
            }
            GameStatus::Rasterizing => self.set_status(GameStatus::Editing),
        }
    }

    /// Leave Editing; clears the selection.
    pub fn exit_edit_mode(&mut self) -> bool {
        if !self.require_editing("exit_edit_mode") {
            return false;
        }
        self.set_selection(None);
        self.set_status(GameStatus::Rasterizing);
        true
    }

    /// Snapshot the scene and start a progressive render.
    pub fn enter_ray_tracing_mode(&mut self) -> bool {
        if !self.require_editing("enter_ray_tracing_mode") {
            return false;
        }
        let pool = match self.ensure_pool() {
            Ok(pool) => pool,
            Err(e) => {
                error!("enter_ray_tracing_mode: {}", e);
                return false;
            }
        };

        self.set_selection(None);
        self.input.clear();
        let snapshot = SceneSnapshot::from_scene(&self.scene.read());
        let settings = RenderSettings {
            seed: rand::random(),
            ..RenderSettings::from_config(&self.config)
        };
        match RenderJob::start(snapshot, settings, pool) {
            Ok(job) => {
                self.job = Some(job);
                self.last_render = None;
                self.set_status(GameStatus::RayTracing);
                true
            }
            Err(e) => {
                error!("enter_ray_tracing_mode: {}", e);
                false
            }
        }
    }

    /// Cancel the render and return to Rasterizing.
    pub fn stop_ray_tracing(&mut self) -> bool {
        if self.status != GameStatus::RayTracing {
            warn!("stop_ray_tracing: not ray tracing ({:?})", self.status);
            return false;
        }
        self.stop_job();
        self.set_status(GameStatus::Rasterizing);
        true
    }

    fn stop_job(&mut self) {
        if let Some(mut job) = self.job.take() {
            job.stop();
            self.last_render = job.latest_image();
        }
    }

    pub fn render_progress(&self) -> Option<RenderProgress> {
        self.job.as_ref().map(RenderJob::progress)
    }

    /// Latest published render: the running job's, or the last stopped one.
    pub fn render_image(&self) -> Option<Arc<RenderedImage>> {
        match &self.job {
            Some(job) => job.latest_image(),
            None => self.last_render.clone(),
        }
    }

    // ---- Thread pool ----

    /// Provision path-tracing workers (0 = hardware concurrency). Only the
    /// first successful call has an effect.
    pub fn init_thread_pool(&mut self, threads: usize) -> Result<()> {
        if self.pool.is_some() {
            warn!("init_thread_pool: already initialized");
            return Ok(());
        }
        self.pool = Some(WorkerPool::new(threads)?);
        Ok(())
    }

    fn ensure_pool(&mut self) -> Result<WorkerPool> {
        if self.pool.is_none() {
            self.init_thread_pool(self.config.worker_threads())?;
        }
        self.pool
            .clone()
            .ok_or_else(|| Error::ThreadPoolInit("pool unavailable".into()))
    }

    // ---- Selection ----

    fn set_selection(&mut self, id: Option<ObjectId>) {
        if self.selected == id {
            return;
        }
        self.selected = id;
        if self.follow_camera {
            self.follow_camera = false;
            self.events.emit(EngineEvent::FollowCameraChanged(false));
        }
        let props = id.and_then(|id| self.scene.read().material_properties(id));
        self.events.emit(EngineEvent::SelectionChanged(props));
    }

    /// Replace the selection. Unknown ids deselect.
    pub fn select(&mut self, id: Option<ObjectId>) -> bool {
        if !self.require_editing("select") {
            return false;
        }
        let id = id.filter(|id| {
            let exists = self.scene.read().contains(*id);
            if !exists {
                warn!("select: no object {}", id);
            }
            exists
        });
        self.set_selection(id);
        true
    }

    /// Pick at pixel `(x, y)`; selects the nearest object or deselects.
    pub fn click(&mut self, x: f32, y: f32) -> Option<ObjectId> {
        if !self.require_editing("click") {
            return None;
        }
        let hit = self.scene.read().pick_pixel(x, y);
        debug!("click ({}, {}) -> {:?}", x, y, hit);
        self.set_selection(hit);
        hit
    }

    pub fn delete_selected_object(&mut self) -> bool {
        let Some(id) = self.require_selection("delete_selected_object") else {
            return false;
        };
        self.scene.write().remove(id);
        self.set_selection(None);
        true
    }

    // ---- Transforms ----

    fn update_selected(&mut self, op: &str, update: TransformUpdate) -> bool {
        let Some(id) = self.require_selection(op) else {
            return false;
        };
        self.scene.write().set_transform(id, update)
    }

    pub fn translate_selected_obj(&mut self, dx: f32, dy: f32, dz: f32) -> bool {
        if self.follow_camera && self.status == GameStatus::Editing {
            warn!("translate_selected_obj: disabled while following the camera");
            return false;
        }
        self.update_selected("translate_selected_obj", TransformUpdate::Translate(Vec3::new(dx, dy, dz)))
    }

    /// Add Euler XYZ angles in radians.
    pub fn rotate_selected_obj(&mut self, dx: f32, dy: f32, dz: f32) -> bool {
        self.update_selected("rotate_selected_obj", TransformUpdate::Rotate(Vec3::new(dx, dy, dz)))
    }

    pub fn scale_selected_obj(&mut self, factor: f32) -> bool {
        self.update_selected("scale_selected_obj", TransformUpdate::Scale(factor))
    }

    pub fn set_follow_camera(&mut self, follow: bool) -> bool {
        if follow == self.follow_camera {
            return true;
        }
        if follow && self.require_selection("set_follow_camera").is_none() {
            return false;
        }
        self.follow_camera = follow;
        self.events.emit(EngineEvent::FollowCameraChanged(follow));
        if follow {
            self.apply_follow();
        }
        true
    }

    fn apply_follow(&mut self) {
        if !self.follow_camera || self.status != GameStatus::Editing {
            return;
        }
        let Some(id) = self.selected else {
            return;
        };
        let mut scene = self.scene.write();
        let target = scene.camera.point_ahead(self.config.follow_distance);
        if !scene.set_transform(id, TransformUpdate::MoveTo(target)) {
            drop(scene);
            self.set_selection(None);
        }
    }

    // ---- Object creation ----

    fn spawn_transform(&self) -> Transform {
        let scene = self.scene.read();
        Transform::from_position(scene.camera.point_ahead(self.config.spawn_distance))
    }

    fn add_selected(&mut self, op: &str, primitive: Primitive) -> Option<ObjectId> {
        if !self.require_editing(op) {
            return None;
        }
        let transform = self.spawn_transform();
        let added = self
            .scene
            .write()
            .add_primitive(primitive, transform, Material::default());
        match added {
            Ok(id) => {
                self.set_selection(Some(id));
                Some(id)
            }
            Err(e) => {
                warn!("{}: {}", op, e);
                None
            }
        }
    }

    pub fn add_sphere(&mut self, radius: f32) -> Option<ObjectId> {
        self.add_selected("add_sphere", Primitive::Sphere { radius })
    }

    pub fn add_box(&mut self, x: f32, y: f32, z: f32) -> Option<ObjectId> {
        self.add_selected("add_box", Primitive::Box { x, y, z })
    }

    /// Import a mesh in front of the camera.
    ///
    /// `Ok(None)` when not editing; `Err` if the bytes are missing or do
    /// not decode, in which case the scene is unchanged.
    pub fn add_custom_object(&mut self, bytes: Option<&[u8]>) -> Result<Option<ObjectId>> {
        if !self.require_editing("add_custom_object") {
            return Ok(None);
        }
        let bytes = bytes.ok_or_else(|| Error::malformed("no asset bytes supplied"))?;
        let transform = self.spawn_transform();
        let id = {
            let mut scene = self.scene.write();
            let id = scene.add_mesh(bytes).inspect_err(|e| warn!("add_custom_object: {}", e))?;
            scene.set_transform(id, TransformUpdate::MoveTo(transform.position));
            id
        };
        self.set_selection(Some(id));
        Ok(Some(id))
    }

    // ---- Materials ----

    pub fn get_selected_material_properties(&self) -> Option<MaterialProperties> {
        let id = self.selected?;
        self.scene.read().material_properties(id)
    }

    /// Apply `props` to the selection.
    ///
    /// `Err(InvalidMaterialType)` for unknown type codes (object unchanged);
    /// `Ok(false)` for the logged no-op cases.
    pub fn set_selected_object_material_properties(&mut self, props: &MaterialProperties) -> Result<bool> {
        let Some(id) = self.require_selection("set_selected_object_material_properties") else {
            return Ok(false);
        };
        let applied = self.scene.write().set_material(id, props)?;
        if applied {
            let current = self.scene.read().material_properties(id);
            self.events.emit(EngineEvent::SelectionChanged(current));
        }
        Ok(applied)
    }

    // ---- Camera ----

    /// Vertical FOV in radians.
    pub fn set_fov(&mut self, fov: f32) {
        let fov = {
            let mut scene = self.scene.write();
            scene.camera.set_fov(fov);
            scene.camera.fov
        };
        self.events.emit(EngineEvent::FovChanged(fov));
    }

    pub fn set_focal_dist(&mut self, distance: f32) {
        let d = {
            let mut scene = self.scene.write();
            scene.camera.set_focal_distance(distance);
            scene.camera.focal_distance
        };
        self.events.emit(EngineEvent::FocalDistanceChanged(d));
    }

    /// Aperture angle in radians.
    pub fn set_defocus_angle(&mut self, angle: f32) {
        let a = {
            let mut scene = self.scene.write();
            scene.camera.set_defocus_angle(angle);
            scene.camera.defocus_angle
        };
        self.events.emit(EngineEvent::DefocusAngleChanged(a));
    }

    // ---- Scene loading ----

    fn begin_replace(&mut self, op: &str) -> bool {
        if self.status == GameStatus::RayTracing {
            warn!("{}: rejected while ray tracing", op);
            return false;
        }
        self.events.emit(EngineEvent::SceneLoadingChanged(true));
        true
    }

    fn end_replace(&mut self) {
        self.set_selection(None);
        self.events.emit(EngineEvent::SceneLoadingChanged(false));
        // Loaded cameras carry whatever viewport they were saved with
        let cam = {
            let mut scene = self.scene.write();
            scene.camera.resize(self.config.width, self.config.height);
            scene.camera
        };
        self.events.emit(EngineEvent::FovChanged(cam.fov));
        self.events.emit(EngineEvent::FocalDistanceChanged(cam.focal_distance));
        self.events.emit(EngineEvent::DefocusAngleChanged(cam.defocus_angle));
    }

    /// Replace the scene with a preset. `Ok(false)` while ray tracing;
    /// `Err` if mesh bytes fail to decode (scene unchanged).
    pub fn load_scene(&mut self, preset: ScenePreset, mesh_bytes: Option<&[u8]>) -> Result<bool> {
        if !self.begin_replace("load_scene") {
            return Ok(false);
        }
        let result = self.scene.write().load_preset(preset, mesh_bytes);
        self.end_replace();
        result.map(|()| true)
    }

    /// Replace the scene with an exported state.
    pub fn import_scene_state(&mut self, state: SceneState) -> Result<bool> {
        if !self.begin_replace("import_scene_state") {
            return Ok(false);
        }
        let result = self.scene.write().import_state(state);
        self.end_replace();
        result.map(|()| true)
    }

    pub fn export_scene_state(&self) -> SceneState {
        self.scene.read().export_state()
    }

    // ---- Input and frame loop ----

    pub fn key_down(&mut self, key: Key) {
        self.input.key_down(key);
    }

    pub fn key_up(&mut self, key: Key) {
        self.input.key_up(key);
    }

    pub fn mouse_move(&mut self, dx: f32, dy: f32) {
        self.input.mouse_move(dx, dy);
    }

    /// Start the rasterization loop and draw the first frame.
    pub fn init_and_begin_game_loop(&mut self) -> bool {
        if self.loop_started {
            warn!("init_and_begin_game_loop: already running");
            return false;
        }
        self.loop_started = true;
        info!("game loop started");
        self.tick();
        true
    }

    /// Advance one frame. Returns the rasterized frame, or `None` while ray
    /// tracing (the render job owns the output then) or before the loop
    /// has started.
    pub fn tick(&mut self) -> Option<&Framebuffer> {
        if !self.loop_started {
            warn!("tick: game loop not started");
            return None;
        }
        if self.status == GameStatus::RayTracing {
            self.input.clear();
            return None;
        }

        {
            let mut scene = self.scene.write();
            self.input
                .apply(&mut scene.camera, self.config.move_speed, self.config.look_sensitivity);
        }
        self.apply_follow();

        let scene = self.scene.read();
        let selected = self.selected.filter(|_| self.status == GameStatus::Editing);
        self.rasterizer.render(&scene, selected, &mut self.framebuffer);
        drop(scene);
        self.frames += 1;
        Some(&self.framebuffer)
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop_job();
    }
}
