//! The camera mod: zoom curve, zoom-to-mouse, label handling and snapback.
//!
//! [`CameraPatches`] declares every patch the mod applies to the host game and binds the
//! payload functions its rewritten bodies call. The game itself is reached through the
//! [`CameraRig`] trait, so the whole mod runs unchanged against a test double.
//!
//! # Patches
//!
//! | Target | Kind | Effect |
//! |---|---|---|
//! | `CameraDriver::Update` | body | root size stores go through zoom-to-mouse |
//! | `CameraDriver::Update` | prefix, optional setting | camera shake cleared |
//! | `CameraDriver::CalculateCurInputDollyVect` | postfix | screen edge scrolling scaled by zoom |
//! | `CameraDriver::get_CurrentZoom` | prefix | zoom band from the remapped curve |
//! | `CameraDriver::ApplyPositionToGameObject` | body | camera height, orthographic size, scroll rates |
//! | `CameraDriver::get_CurrentViewRect` | body | view rect from the remapped root size |
//! | `MoteMaker::ThrowText` | prefix | floating text hidden when zoomed out |
//! | `PawnUIOverlay::DrawPawnGUIOverlay` | body, prefix | animal labels drawn like humanlike ones, hidden when zoomed out |
//! | `GenMapUI::DrawPawnLabel` | prefix | full pawn labels hidden when zoomed out |
//! | `PawnRenderer::RenderPawnAt` | postfix | label colour cache warmed |
//! | `GenMapUI::DrawThingLabel` | body, prefix | font adapted to zoom; hidden when zoomed out |
//! | `SaveOurShip2.MeshRecalculateHelper::RecalculateMesh` | body, optional | background offset scaled |
//! | `Map::MapUpdate` | postfix, one-shot | background material tiling fixed once |
//! | `KeyBindingDef::get_KeyDownEvent` | prefix | pause key reports one press per frame |
//! | `Game::UpdatePlay` | postfix | snapback taken and restored |
//! | `TickManager::TogglePaused` | postfix | snapback restored on unpause |
//! | `MainTabWindow_Menu::PreOpen` | postfix | snapback dropped |
//! | `UIRoot_Play::UIRootOnGUI` | postfix | end of frame; snapback frame drawn |
//!
//! The shake prefix is registered under its own owner id (the configured owner with a
//! `.shake` suffix), so it can be left out without touching the zoom-to-mouse rewrite of the
//! same method.

use std::{sync::Arc, time::Instant};

use crate::{
    assembly::{Constant, Instruction, Pattern},
    diagnostics::EventLog,
    patching::{priority, CallContext, PatchRegistration, Patcher, PrefixAction, Value},
    payload::{
        clip_height, dolly_rates, label_visible, lerp_root_size, overlay_label_visible,
        pawn_label_visible, screen_edge_dolly_factor, CameraPose, GameFont, LabelColorCache,
        LabelStyle, PauseKeyLatch, PawnInfo, PayloadTable, SnapbackAction, SnapbackTimer,
        ZoomRange, ZoomState,
    },
    rewrite::{AppendBeforeReturn, CallSiteAdjust, FieldLoadHoist, PointSubstitution, WindowMultiply},
    Result,
};

/// Priority of the label prefixes; they run before other mods' label patches.
pub const LABEL_PRIORITY: i32 = 10_000;

/// Name of the key binding the pause latch applies to.
pub const TOGGLE_PAUSE: &str = "TogglePause";

/// Name of the optional mod whose background is fixed up.
pub const SAVE_OUR_SHIP: &str = "Save Our Ship 2";

/// User settings of the camera mod.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    /// Zoom toward the map point under the mouse (default: true). Holding shift zooms
    /// toward the screen center.
    pub zoom_to_mouse: bool,

    /// Suppress camera shake (default: false)
    pub disable_camera_shake: bool,

    /// Leave all label rendering to the game (default: false)
    pub skip_custom_rendering: bool,

    /// Hide labels and floating text when zoomed out (default: true)
    pub hide_names_when_zoomed_out: bool,

    /// Show hidden labels near the mouse (default: true)
    pub mouse_over_shows_labels: bool,

    /// How pawn labels are styled (default: [`LabelStyle::IncludeAnimals`])
    pub custom_name_style: LabelStyle,

    /// Pull the camera toward the ground for sound, 0 to 1 (default: 0.0)
    pub sound_nearness: f32,

    /// Exponent shaping the root size curve, 1 is linear (default: 1.0)
    pub zoom_curve_exponent: f32,

    /// Scroll speed scale when fully zoomed in (default: 1.0)
    pub zoomed_in_dolly_percent: f32,

    /// Scroll speed scale when fully zoomed out (default: 1.0)
    pub zoomed_out_dolly_percent: f32,

    /// Screen edge scroll factor when fully zoomed in (default: 0.5)
    pub zoomed_in_screen_edge_dolly_factor: f32,

    /// Screen edge scroll factor when fully zoomed out (default: 0.5)
    pub zoomed_out_screen_edge_dolly_factor: f32,

    /// Smallest root size the game produces (default: 11.0)
    pub min_root_input: f32,

    /// Largest root size the game produces (default: 60.0)
    pub max_root_input: f32,

    /// Root size the curve maps the smallest input to (default: 2.0)
    pub min_root_output: f32,

    /// Root size the curve maps the largest input to (default: 130.0)
    pub max_root_output: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            zoom_to_mouse: true,
            disable_camera_shake: false,
            skip_custom_rendering: false,
            hide_names_when_zoomed_out: true,
            mouse_over_shows_labels: true,
            custom_name_style: LabelStyle::IncludeAnimals,
            sound_nearness: 0.0,
            zoom_curve_exponent: 1.0,
            zoomed_in_dolly_percent: 1.0,
            zoomed_out_dolly_percent: 1.0,
            zoomed_in_screen_edge_dolly_factor: 0.5,
            zoomed_out_screen_edge_dolly_factor: 0.5,
            min_root_input: 11.0,
            max_root_input: 60.0,
            min_root_output: 2.0,
            max_root_output: 130.0,
        }
    }
}

/// Scroll parameters pushed to the game's camera configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DollyRates {
    /// Keyboard scroll rate
    pub keys: f32,
    /// Screen edge scroll rate
    pub screen_edge: f32,
    /// Scroll speed decay per frame
    pub speed_decay: f32,
}

/// The running game as seen by the camera mod.
pub trait CameraRig: Send + Sync {
    /// Current root size of the camera driver.
    fn root_size(&self) -> f32;
    /// Sets the root size.
    fn set_root_size(&self, size: f32);
    /// Current root position.
    fn root_pos(&self) -> [f32; 3];
    /// Sets the root position.
    fn set_root_pos(&self, pos: [f32; 3]);
    /// Moves the camera object to match the root position and size.
    fn apply_position(&self);
    /// Map position under the mouse.
    fn mouse_map_position(&self) -> [f32; 3];
    /// Map position under a screen position.
    fn screen_to_map(&self, screen: [f32; 2]) -> [f32; 3];
    /// Returns `true` while shift is held.
    fn shift_held(&self) -> bool;

    /// Height of the camera object.
    fn camera_height(&self) -> f32;
    /// Sets the height of the camera object.
    fn set_camera_height(&self, height: f32);
    /// Orthographic size of the camera object.
    fn orthographic_size(&self) -> f32;
    /// Sets the orthographic size of the camera object.
    fn set_orthographic_size(&self, size: f32);
    /// Stores scroll parameters in the camera configuration.
    fn set_dolly_rates(&self, rates: DollyRates);
    /// Zeroes the current camera shake.
    fn clear_shake(&self);

    /// Returns `true` while the game is paused.
    fn paused(&self) -> bool;
    /// Returns `true` while the pause key is held.
    fn pause_key_down(&self) -> bool;
    /// Returns `true` if the current UI event is a key-up.
    fn key_up_event(&self) -> bool;
    /// Current time.
    fn now(&self) -> Instant;
    /// Draws the frame that marks a pending snapback.
    fn draw_snapback_frame(&self);

    /// Returns `true` if a mod with this display name is active.
    fn mod_active(&self, name: &str) -> bool;
    /// Returns `true` while the world map is shown instead of a colony map.
    fn world_rendered(&self) -> bool;
    /// Object id of the map currently shown.
    fn current_map(&self) -> Option<u64>;
    /// Sets texture offset and scale of the optional space background material.
    ///
    /// Returns `false` if the material does not exist.
    fn set_background_tiling(&self, offset: [f32; 2], scale: [f32; 2]) -> bool;

    /// Describes the pawn `object` is, or the pawn a per-pawn component such as a renderer
    /// or UI overlay belongs to.
    fn pawn(&self, object: u64) -> Option<PawnInfo>;
    /// Looks up the main label colour of a pawn.
    fn pawn_color(&self, pawn: u64) -> Option<[f32; 4]>;
}

/// Host references used by the patches.
pub mod refs {
    use crate::assembly::{FieldRef, MethodRef};

    /// Type owning every payload method.
    pub const PAYLOAD_OWNER: &str = "CameraPlus.Tools";

    /// `CameraDriver.rootSize`
    #[must_use]
    pub fn root_size() -> FieldRef {
        FieldRef::instance("CameraDriver", "rootSize")
    }

    /// `SaveOurShip2.SectionThreadManager.Center`
    #[must_use]
    pub fn ship_center() -> FieldRef {
        FieldRef::new_static("SaveOurShip2.SectionThreadManager", "Center")
    }

    /// `CameraDriver.get_MyCamera`
    #[must_use]
    pub fn my_camera() -> MethodRef {
        MethodRef::new("CameraDriver", "get_MyCamera")
            .returns("Camera")
            .instance()
    }

    /// `Find.get_CameraDriver`
    #[must_use]
    pub fn find_camera_driver() -> MethodRef {
        MethodRef::new("Find", "get_CameraDriver").returns("CameraDriver")
    }

    /// `RaceProperties.get_Humanlike`
    #[must_use]
    pub fn humanlike() -> MethodRef {
        MethodRef::new("RaceProperties", "get_Humanlike")
            .returns("bool")
            .instance()
    }

    /// Payload: zoom-to-mouse root size setter.
    #[must_use]
    pub fn set_root_size() -> MethodRef {
        MethodRef::new(PAYLOAD_OWNER, "SetRootSize")
            .param("CameraDriver")
            .param("float")
    }

    /// Payload: applies the zoom curve to the camera object.
    #[must_use]
    pub fn apply_zoom() -> MethodRef {
        MethodRef::new(PAYLOAD_OWNER, "ApplyZoom")
            .param("CameraDriver")
            .param("Camera")
    }

    /// Payload: the root size curve.
    #[must_use]
    pub fn lerp_root_size() -> MethodRef {
        MethodRef::new(PAYLOAD_OWNER, "LerpRootSize")
            .param("float")
            .returns("float")
    }

    /// Payload: label font for a root size.
    #[must_use]
    pub fn adapted_font() -> MethodRef {
        MethodRef::new(PAYLOAD_OWNER, "GetAdaptedGameFont")
            .param("float")
            .returns("GameFont")
    }

    /// Payload: cached main label colour of a pawn.
    #[must_use]
    pub fn main_color() -> MethodRef {
        MethodRef::new(PAYLOAD_OWNER, "GetMainColor")
            .param("Pawn")
            .returns("Color")
    }
}

/// Patch targets.
pub mod targets {
    use crate::patching::TargetKey;

    /// `CameraDriver.Update()`
    #[must_use]
    pub fn camera_update() -> TargetKey {
        TargetKey::method("CameraDriver", "Update")
    }

    /// `CameraDriver.CalculateCurInputDollyVect()`
    #[must_use]
    pub fn dolly_vector() -> TargetKey {
        TargetKey::method("CameraDriver", "CalculateCurInputDollyVect")
    }

    /// `CameraDriver.CurrentZoom` getter
    #[must_use]
    pub fn current_zoom() -> TargetKey {
        TargetKey::getter("CameraDriver", "CurrentZoom")
    }

    /// `CameraDriver.ApplyPositionToGameObject()`
    #[must_use]
    pub fn apply_position() -> TargetKey {
        TargetKey::method("CameraDriver", "ApplyPositionToGameObject")
    }

    /// `CameraDriver.CurrentViewRect` getter
    #[must_use]
    pub fn current_view_rect() -> TargetKey {
        TargetKey::getter("CameraDriver", "CurrentViewRect")
    }

    /// `MoteMaker.ThrowText(Vector3, Map, string, Color, float)`
    #[must_use]
    pub fn throw_text() -> TargetKey {
        TargetKey::method("MoteMaker", "ThrowText")
            .param("Vector3")
            .param("Map")
            .param("string")
            .param("Color")
            .param("float")
    }

    /// `PawnUIOverlay.DrawPawnGUIOverlay()`
    #[must_use]
    pub fn pawn_overlay() -> TargetKey {
        TargetKey::method("PawnUIOverlay", "DrawPawnGUIOverlay")
    }

    /// `GenMapUI.DrawPawnLabel(Pawn, Vector2, float, float, Dictionary<string, string>, GameFont, bool, bool)`
    #[must_use]
    pub fn pawn_label() -> TargetKey {
        TargetKey::method("GenMapUI", "DrawPawnLabel")
            .param("Pawn")
            .param("Vector2")
            .param("float")
            .param("float")
            .param("Dictionary<string, string>")
            .param("GameFont")
            .param("bool")
            .param("bool")
    }

    /// `PawnRenderer.RenderPawnAt(Vector3, Rot4?, bool)`
    #[must_use]
    pub fn render_pawn() -> TargetKey {
        TargetKey::method("PawnRenderer", "RenderPawnAt")
            .param("Vector3")
            .param("Rot4?")
            .param("bool")
    }

    /// `GenMapUI.DrawThingLabel(Vector2, string, Color)`
    #[must_use]
    pub fn thing_label() -> TargetKey {
        TargetKey::method("GenMapUI", "DrawThingLabel")
            .param("Vector2")
            .param("string")
            .param("Color")
    }

    /// `SaveOurShip2.MeshRecalculateHelper.RecalculateMesh()`
    #[must_use]
    pub fn ship_background() -> TargetKey {
        TargetKey::method("SaveOurShip2.MeshRecalculateHelper", "RecalculateMesh")
    }

    /// `Map.MapUpdate()`
    #[must_use]
    pub fn map_update() -> TargetKey {
        TargetKey::method("Map", "MapUpdate")
    }

    /// `KeyBindingDef.KeyDownEvent` getter
    #[must_use]
    pub fn key_down_event() -> TargetKey {
        TargetKey::getter("KeyBindingDef", "KeyDownEvent")
    }

    /// `Game.UpdatePlay()`
    #[must_use]
    pub fn update_play() -> TargetKey {
        TargetKey::method("Game", "UpdatePlay")
    }

    /// `TickManager.TogglePaused()`
    #[must_use]
    pub fn toggle_paused() -> TargetKey {
        TargetKey::method("TickManager", "TogglePaused")
    }

    /// `MainTabWindow_Menu.PreOpen()`
    #[must_use]
    pub fn menu_open() -> TargetKey {
        TargetKey::method("MainTabWindow_Menu", "PreOpen")
    }

    /// `UIRoot_Play.UIRootOnGUI()`
    #[must_use]
    pub fn ui_root() -> TargetKey {
        TargetKey::method("UIRoot_Play", "UIRootOnGUI")
    }
}

/// Sets the root size, keeping the map point under the mouse in place.
///
/// Falls back to a plain store while shift is held or zoom-to-mouse is off.
pub fn set_root_size(settings: &CameraSettings, rig: &dyn CameraRig, size: f32) {
    if rig.shift_held() || !settings.zoom_to_mouse {
        rig.set_root_size(size);
        return;
    }
    if rig.root_size() == size {
        return;
    }

    rig.apply_position();
    let before = rig.mouse_map_position();
    rig.set_root_size(size);
    rig.apply_position();
    let after = rig.mouse_map_position();

    let pos = rig.root_pos();
    rig.set_root_pos([
        pos[0] + before[0] - after[0],
        pos[1] + before[1] - after[1],
        pos[2] + before[2] - after[2],
    ]);
}

/// Applies the zoom curve to the positioned camera object.
pub fn apply_zoom(settings: &CameraSettings, rig: &dyn CameraRig, zoom: &ZoomState) {
    rig.set_camera_height(clip_height(settings, rig.camera_height()));

    let orth_size = lerp_root_size(settings, rig.orthographic_size());
    rig.set_orthographic_size(orth_size);
    rig.set_dolly_rates(dolly_rates(settings, orth_size));
    zoom.set(orth_size);
}

fn current_pose(rig: &dyn CameraRig) -> CameraPose {
    CameraPose {
        root_pos: rig.root_pos(),
        root_size: rig.root_size(),
    }
}

fn restore_pose(rig: &dyn CameraRig, pose: CameraPose) {
    rig.set_root_pos(pose.root_pos);
    rig.set_root_size(pose.root_size);
}

/// The camera mod: settings, shared state and the patches that use them.
pub struct CameraPatches {
    settings: Arc<CameraSettings>,
    rig: Arc<dyn CameraRig>,
    events: Arc<EventLog>,
    zoom: Arc<ZoomState>,
    latch: Arc<PauseKeyLatch>,
    snapback: Arc<SnapbackTimer>,
    label_colors: Arc<LabelColorCache>,
    payloads: Arc<PayloadTable>,
}

impl CameraPatches {
    /// Creates the mod's state and binds its payload functions.
    ///
    /// `events` should be the event log of the [`Patcher`] the patches are registered with.
    pub fn new(settings: CameraSettings, rig: Arc<dyn CameraRig>, events: Arc<EventLog>) -> Self {
        let patches = CameraPatches {
            settings: Arc::new(settings),
            rig,
            events,
            zoom: Arc::new(ZoomState::new()),
            latch: Arc::new(PauseKeyLatch::new()),
            snapback: Arc::new(SnapbackTimer::new()),
            label_colors: Arc::new(LabelColorCache::new()),
            payloads: Arc::new(PayloadTable::new(refs::PAYLOAD_OWNER)),
        };
        patches.bind_payloads();
        patches
    }

    /// Returns the settings.
    #[must_use]
    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    /// Returns the payload bindings, to be passed to [`Patcher::with_payloads`].
    #[must_use]
    pub fn payloads(&self) -> Arc<PayloadTable> {
        Arc::clone(&self.payloads)
    }

    /// Returns the last applied orthographic size.
    #[must_use]
    pub fn zoom(&self) -> &ZoomState {
        &self.zoom
    }

    /// Returns the pause key latch.
    #[must_use]
    pub fn latch(&self) -> &PauseKeyLatch {
        &self.latch
    }

    /// Returns the snapback timer.
    #[must_use]
    pub fn snapback(&self) -> &SnapbackTimer {
        &self.snapback
    }

    /// Returns the per-pawn label colour cache.
    #[must_use]
    pub fn label_colors(&self) -> &LabelColorCache {
        &self.label_colors
    }

    fn bind_payloads(&self) {
        let (settings, rig, events) = (
            Arc::clone(&self.settings),
            Arc::clone(&self.rig),
            Arc::clone(&self.events),
        );
        self.payloads.bind(refs::set_root_size(), move |args| {
            if args.first().map_or(true, Value::is_null) {
                events.error_once(
                    "camera/null-driver",
                    "Unexpected null camera driver. Looks like a conflict with another mod that patches CameraDriver::Update()",
                );
                return Ok(Value::Unit);
            }
            let size = args
                .get(1)
                .and_then(Value::as_f32)
                .ok_or_else(|| malformed_error!("SetRootSize expects a float root size"))?;
            set_root_size(&settings, rig.as_ref(), size);
            Ok(Value::Unit)
        });

        let (settings, rig, zoom) = (
            Arc::clone(&self.settings),
            Arc::clone(&self.rig),
            Arc::clone(&self.zoom),
        );
        self.payloads.bind(refs::apply_zoom(), move |_args| {
            apply_zoom(&settings, rig.as_ref(), &zoom);
            Ok(Value::Unit)
        });

        let settings = Arc::clone(&self.settings);
        self.payloads.bind(refs::lerp_root_size(), move |args| {
            let size = args
                .first()
                .and_then(Value::as_f32)
                .ok_or_else(|| malformed_error!("LerpRootSize expects a float"))?;
            Ok(Value::F32(lerp_root_size(&settings, size)))
        });

        self.payloads.bind(refs::adapted_font(), |args| {
            let size = args
                .first()
                .and_then(Value::as_f32)
                .ok_or_else(|| malformed_error!("GetAdaptedGameFont expects a float"))?;
            Ok(Value::I32(GameFont::adapted(size) as i32))
        });

        let (rig, colors) = (Arc::clone(&self.rig), Arc::clone(&self.label_colors));
        self.payloads.bind(refs::main_color(), move |args| {
            let pawn = args
                .first()
                .and_then(Value::as_object)
                .ok_or_else(|| malformed_error!("GetMainColor expects a pawn"))?;
            Ok(colors
                .get_or_lookup(pawn, || rig.pawn_color(pawn))
                .map_or(Value::Null, Value::Color))
        });
    }

    /// Registers every patch of the mod with `patcher`.
    ///
    /// # Errors
    ///
    /// Returns an error if a pass definition is invalid or `patcher` rejects a registration.
    pub fn register(&self, patcher: &mut Patcher) -> Result<()> {
        self.register_camera_driver(patcher)?;
        self.register_labels(patcher)?;
        self.register_ship_background(patcher)?;
        self.register_pause(patcher)
    }

    fn register_camera_driver(&self, patcher: &mut Patcher) -> Result<()> {
        let zoom_to_mouse = PointSubstitution::new(
            Pattern::StoresField(refs::root_size()),
            vec![Instruction::call(refs::set_root_size())],
        )?
        .named("zoom-to-mouse");
        patcher.register(
            patcher
                .registration(targets::camera_update())
                .pass(zoom_to_mouse),
        )?;

        let (rig, enabled) = (Arc::clone(&self.rig), Arc::clone(&self.settings));
        let shake = PatchRegistration::new(
            format!("{}.shake", patcher.config().owner),
            targets::camera_update(),
        )
        .enabled(move || enabled.disable_camera_shake)
        .prefix(priority::NORMAL, move |_ctx| {
            rig.clear_shake();
            PrefixAction::Continue
        });
        patcher.register(shake)?;

        let (settings, zoom) = (Arc::clone(&self.settings), Arc::clone(&self.zoom));
        let dolly = patcher
            .registration(targets::dolly_vector())
            .postfix(priority::NORMAL, move |ctx| {
                let Some(orth_size) = zoom.get() else {
                    return;
                };
                if let Some([x, y]) = ctx.result.as_vec2() {
                    let factor = screen_edge_dolly_factor(&settings, orth_size);
                    ctx.result = Value::Vec2([x * factor, y * factor]);
                }
            });
        patcher.register(dolly)?;

        let (settings, rig) = (Arc::clone(&self.settings), Arc::clone(&self.rig));
        let current_zoom = patcher
            .registration(targets::current_zoom())
            .prefix(priority::NORMAL, move |ctx| {
                let range = ZoomRange::classify(&settings, rig.root_size());
                ctx.result = Value::I32(range as i32);
                PrefixAction::Suppress
            });
        patcher.register(current_zoom)?;

        let apply_zoom_call = AppendBeforeReturn::new(vec![
            Instruction::ldarg(0),
            Instruction::ldarg(0),
            Instruction::call(refs::my_camera()),
            Instruction::call(refs::apply_zoom()),
        ])?
        .named("apply-zoom");
        patcher.register(
            patcher
                .registration(targets::apply_position())
                .pass(apply_zoom_call),
        )?;

        let lerped_view = FieldLoadHoist::new(refs::root_size(), refs::lerp_root_size())?
            .named("lerped-view-rect");
        patcher.register(
            patcher
                .registration(targets::current_view_rect())
                .pass(lerped_view),
        )
    }

    fn register_labels(&self, patcher: &mut Patcher) -> Result<()> {
        let (settings, rig) = (Arc::clone(&self.settings), Arc::clone(&self.rig));
        let enabled = Arc::clone(&self.settings);
        let throw_text = patcher
            .registration(targets::throw_text())
            .enabled(move || !enabled.skip_custom_rendering && enabled.hide_names_when_zoomed_out)
            .prefix(priority::NORMAL, move |ctx| {
                let Some(loc) = ctx.arg(0).and_then(Value::as_vec3) else {
                    return PrefixAction::Continue;
                };
                let zoom = ZoomRange::classify(&settings, rig.root_size());
                label_visible(&settings, zoom, loc, rig.mouse_map_position()).into()
            });
        patcher.register(throw_text)?;

        let all_humanlike = CallSiteAdjust::new(
            refs::humanlike(),
            vec![Instruction::pop(), Instruction::ldc_i4(1)],
        )?
        .named("all-humanlike");
        let (settings, rig) = (Arc::clone(&self.settings), Arc::clone(&self.rig));
        let enabled = Arc::clone(&self.settings);
        let overlay = patcher
            .registration(targets::pawn_overlay())
            .pass(all_humanlike)
            .enabled(move || !enabled.skip_custom_rendering)
            .prefix(LABEL_PRIORITY, move |ctx| {
                let pawn = ctx.instance.as_ref().and_then(Value::as_object);
                let Some(pawn) = pawn.and_then(|object| rig.pawn(object)) else {
                    return PrefixAction::Continue;
                };
                let zoom = ZoomRange::classify(&settings, rig.root_size());
                overlay_label_visible(&settings, zoom, &pawn, rig.mouse_map_position()).into()
            });
        patcher.register(overlay)?;

        let (settings, rig) = (Arc::clone(&self.settings), Arc::clone(&self.rig));
        let enabled = Arc::clone(&self.settings);
        let pawn_label = patcher
            .registration(targets::pawn_label())
            .enabled(move || !enabled.skip_custom_rendering)
            .prefix(LABEL_PRIORITY, move |ctx| {
                let pawn = ctx.arg(0).and_then(Value::as_object);
                let pawn = pawn.and_then(|object| rig.pawn(object));
                let width = ctx.arg(3).and_then(Value::as_f32);
                let (Some(pawn), Some(width)) = (pawn, width) else {
                    return PrefixAction::Continue;
                };
                let zoom = ZoomRange::classify(&settings, rig.root_size());
                pawn_label_visible(&settings, zoom, &pawn, width, rig.mouse_map_position()).into()
            });
        patcher.register(pawn_label)?;

        let (rig, payloads, events) = (
            Arc::clone(&self.rig),
            Arc::clone(&self.payloads),
            Arc::clone(&self.events),
        );
        let enabled = Arc::clone(&self.settings);
        let warm_colors = patcher
            .registration(targets::render_pawn())
            .enabled(move || {
                !enabled.skip_custom_rendering
                    && enabled.hide_names_when_zoomed_out
                    && enabled.custom_name_style != LabelStyle::HideAnimals
            })
            .postfix(LABEL_PRIORITY, move |ctx| {
                let renderer = ctx.instance.as_ref().and_then(Value::as_object);
                let Some(pawn) = renderer.and_then(|object| rig.pawn(object)) else {
                    return;
                };
                let mut args = [Value::Object(pawn.id)];
                if let Err(error) = payloads.call(&refs::main_color(), &mut args) {
                    events.error_once("camera/main-color", error.to_string());
                }
            });
        patcher.register(warm_colors)?;

        let adapted_font = PointSubstitution::new(
            Pattern::LoadsConstant(Constant::Int(0)),
            vec![
                Instruction::call(refs::find_camera_driver()),
                Instruction::load_field(refs::root_size()),
                Instruction::call(refs::adapted_font()),
            ],
        )?
        .named("adapted-font")
        .first_only();
        let (settings, rig) = (Arc::clone(&self.settings), Arc::clone(&self.rig));
        let enabled = Arc::clone(&self.settings);
        let thing_label = patcher
            .registration(targets::thing_label())
            .pass(adapted_font)
            .enabled(move || !enabled.skip_custom_rendering)
            .prefix(LABEL_PRIORITY, move |ctx| {
                let Some(screen) = ctx.arg(0).and_then(Value::as_vec2) else {
                    return PrefixAction::Continue;
                };
                let zoom = ZoomRange::classify(&settings, rig.root_size());
                let loc = rig.screen_to_map(screen);
                label_visible(&settings, zoom, loc, rig.mouse_map_position()).into()
            });
        patcher.register(thing_label)
    }

    fn register_ship_background(&self, patcher: &mut Patcher) -> Result<()> {
        let scaled = WindowMultiply::new(refs::ship_center(), 4.0).named("ship-background-scale");
        patcher.register(
            patcher
                .registration(targets::ship_background())
                .pass(scaled)
                .optional(),
        )?;

        let registration = patcher.registration(targets::map_update());
        let lifecycle = registration.lifecycle();
        let (rig, enabled_rig, events) = (
            Arc::clone(&self.rig),
            Arc::clone(&self.rig),
            Arc::clone(&self.events),
        );
        let fix_material = registration
            .enabled(move || enabled_rig.mod_active(SAVE_OUR_SHIP))
            .postfix(priority::NORMAL, move |ctx| {
                if !lifecycle.is_active() || rig.world_rendered() {
                    return;
                }
                let shown = rig.current_map().map(Value::Object);
                if shown.is_none() || ctx.instance != shown {
                    return;
                }
                if !rig.set_background_tiling([0.3, 0.3], [0.4, 0.4]) {
                    events.warn("Space background material not found");
                }
                lifecycle.retire();
            });
        patcher.register(fix_material)
    }

    fn register_pause(&self, patcher: &mut Patcher) -> Result<()> {
        let (rig, latch) = (Arc::clone(&self.rig), Arc::clone(&self.latch));
        let key_down = patcher
            .registration(targets::key_down_event())
            .prefix(priority::NORMAL, move |ctx| {
                if ctx.instance != Some(Value::Str(TOGGLE_PAUSE.to_string())) {
                    return PrefixAction::Continue;
                }
                ctx.result = Value::Bool(latch.key_down_event(rig.pause_key_down()));
                PrefixAction::Suppress
            });
        patcher.register(key_down)?;

        let (rig, snapback, events) = (
            Arc::clone(&self.rig),
            Arc::clone(&self.snapback),
            Arc::clone(&self.events),
        );
        let update_play = patcher
            .registration(targets::update_play())
            .postfix(priority::NORMAL, move |_ctx| {
                let rig = rig.as_ref();
                match snapback.update(rig.now(), rig.pause_key_down(), rig.paused(), current_pose(rig)) {
                    Ok(SnapbackAction::Restore(pose)) => restore_pose(rig, pose),
                    Ok(SnapbackAction::Created) => events.info("Snapback created"),
                    Ok(SnapbackAction::None) => {}
                    Err(error) => events.error_once("camera/snapback", error.to_string()),
                }
            });
        patcher.register(update_play)?;

        let (rig, snapback, events) = (
            Arc::clone(&self.rig),
            Arc::clone(&self.snapback),
            Arc::clone(&self.events),
        );
        let toggle = patcher
            .registration(targets::toggle_paused())
            .postfix(priority::NORMAL, move |_ctx| {
                match snapback.toggle_paused(rig.paused()) {
                    Ok(Some(pose)) => restore_pose(rig.as_ref(), pose),
                    Ok(None) => {}
                    Err(error) => events.error_once("camera/snapback", error.to_string()),
                }
            });
        patcher.register(toggle)?;

        let (snapback, events) = (Arc::clone(&self.snapback), Arc::clone(&self.events));
        let menu = patcher
            .registration(targets::menu_open())
            .postfix(priority::NORMAL, move |_ctx| {
                if let Err(error) = snapback.reset() {
                    events.error_once("camera/snapback", error.to_string());
                }
            });
        patcher.register(menu)?;

        let (rig, latch, snapback) = (
            Arc::clone(&self.rig),
            Arc::clone(&self.latch),
            Arc::clone(&self.snapback),
        );
        let end_of_frame = patcher
            .registration(targets::ui_root())
            .postfix(priority::NORMAL, move |_ctx: &mut CallContext| {
                latch.end_of_frame(rig.key_up_event(), rig.pause_key_down());
                if snapback.has_snapback().unwrap_or(false) {
                    rig.draw_snapback_frame();
                }
            });
        patcher.register(end_of_frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = CameraSettings::default();
        assert!(settings.zoom_to_mouse);
        assert!(settings.hide_names_when_zoomed_out);
        assert!(!settings.skip_custom_rendering);
        assert!(settings.min_root_input < settings.max_root_input);
        assert!(settings.min_root_output < settings.max_root_output);
        assert_eq!(settings.custom_name_style, LabelStyle::IncludeAnimals);
    }

    #[test]
    fn test_payload_refs_share_owner() {
        for method in [
            refs::set_root_size(),
            refs::apply_zoom(),
            refs::lerp_root_size(),
            refs::adapted_font(),
            refs::main_color(),
        ] {
            assert_eq!(method.owner(), refs::PAYLOAD_OWNER);
        }
        assert_eq!(refs::set_root_size().pops(), 2);
        assert_eq!(refs::set_root_size().pushes(), 0);
        assert_eq!(refs::adapted_font().pushes(), 1);
    }

    #[test]
    fn test_target_names() {
        assert_eq!(targets::current_zoom().routine_name(), "get_CurrentZoom");
        assert_eq!(targets::throw_text().params().len(), 5);
        assert_eq!(
            targets::thing_label().to_string(),
            "GenMapUI::DrawThingLabel(Vector2, string, Color)"
        );
        assert_eq!(targets::pawn_label().params().len(), 8);
        assert_eq!(targets::render_pawn().params()[1], "Rot4?");
    }
}
