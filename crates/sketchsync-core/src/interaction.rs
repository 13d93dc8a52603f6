//! Interaction state machine.
//!
//! The [`Editor`] turns pointer, wheel and keyboard input into optimistic
//! store mutations. Each mutation that needs remote confirmation is queued
//! as an [`Outbound::Write`]; every pointer move also queues a cursor frame.
//! Drain both with [`Editor::take_outbound`].

use crate::assets::image_element_at;
use crate::camera::Camera;
use crate::clipboard::Clipboard;
use crate::config::EditorConfig;
use crate::element::{Element, ElementId, ElementKind, Properties, PropertiesPatch, StylePatch};
use crate::generate::{ServiceError, ShapeDescriptor, place_descriptors};
use crate::geometry::{self, Metrics};
use crate::input::{KeyEvent, Key, MouseButton, PointerEvent, WheelEvent};
use crate::selection::ManipulationState;
use crate::shortcuts::{ShortcutAction, ShortcutRegistry};
use crate::store::{ElementStore, PendingWrite, StoreResult};
use crate::tools::ToolKind;
use kurbo::{Point, Size};
use serde::Serialize;

/// Smallest stroke width the style editor accepts.
pub const MIN_STROKE_WIDTH: u32 = 1;
/// Largest stroke width the style editor accepts.
pub const MAX_STROKE_WIDTH: u32 = 10;

/// Current gesture. Each variant carries the context it needs.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InteractionState {
    #[default]
    Idle,
    /// Dragging out a new rect or arrow.
    Drawing { kind: ElementKind, anchor: Point, current: Point },
    Moving(ManipulationState),
    Resizing(ManipulationState),
    /// Editing a text element. `original` is what the element looked like
    /// before editing began.
    EditingText { id: ElementId, original: Properties },
}

impl InteractionState {
    pub fn name(&self) -> &'static str {
        match self {
            InteractionState::Idle => "idle",
            InteractionState::Drawing { .. } => "drawing",
            InteractionState::Moving(_) => "moving",
            InteractionState::Resizing(_) => "resizing",
            InteractionState::EditingText { .. } => "editing_text",
        }
    }

    /// Element the gesture operates on, if any.
    pub fn element_id(&self) -> Option<ElementId> {
        match self {
            InteractionState::Moving(m) | InteractionState::Resizing(m) => Some(m.element_id),
            InteractionState::EditingText { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// Something the editor wants sent to the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Write(PendingWrite),
    /// Our cursor in world coordinates.
    Cursor { x: f64, y: f64 },
}

/// Snapshot of editor state for debugging overlays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugInfo {
    pub state: &'static str,
    pub tool: &'static str,
    pub selected: Option<ElementId>,
    pub element_count: usize,
    pub pending_writes: usize,
    pub zoom: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

/// Owns the local canvas state and reacts to input.
#[derive(Debug, Clone)]
pub struct Editor {
    store: ElementStore,
    camera: Camera,
    config: EditorConfig,
    metrics: Metrics,
    tool: ToolKind,
    state: InteractionState,
    selected: Option<ElementId>,
    /// In-progress draw shape (no id, never persisted).
    preview: Option<Properties>,
    clipboard: Clipboard,
    /// Set by the host while an input field has keyboard focus.
    text_focus: bool,
    outbox: Vec<Outbound>,
}

impl Editor {
    pub fn new(canvas_id: &str, config: EditorConfig) -> Self {
        Self {
            store: ElementStore::new(canvas_id),
            camera: Camera::with_zoom_bounds(config.min_zoom, config.max_zoom),
            metrics: config.metrics(),
            config,
            tool: ToolKind::default(),
            state: InteractionState::Idle,
            selected: None,
            preview: None,
            clipboard: Clipboard::new(),
            text_focus: false,
            outbox: Vec::new(),
        }
    }

    pub fn store(&self) -> &ElementStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ElementStore {
        &mut self.store
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn tool(&self) -> ToolKind {
        self.tool
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn selected(&self) -> Option<ElementId> {
        self.selected
    }

    /// Id of the text element being edited.
    pub fn editing(&self) -> Option<ElementId> {
        match self.state {
            InteractionState::EditingText { id, .. } => Some(id),
            _ => None,
        }
    }

    pub fn preview(&self) -> Option<&Properties> {
        self.preview.as_ref()
    }

    pub fn clipboard(&self) -> &Clipboard {
        &self.clipboard
    }

    /// Tell the editor whether a host text field has keyboard focus.
    pub fn set_text_focus(&mut self, focused: bool) {
        self.text_focus = focused;
    }

    /// Drain queued writes and cursor frames, oldest first.
    pub fn take_outbound(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    /// Run a store mutation and queue its write. Returns false if the store
    /// refused the mutation.
    fn write(&mut self, mutate: impl FnOnce(&mut ElementStore) -> StoreResult<PendingWrite>) -> bool {
        match mutate(&mut self.store) {
            Ok(write) => {
                self.outbox.push(Outbound::Write(write));
                true
            }
            Err(e) => {
                log::warn!("Local write skipped: {}", e);
                false
            }
        }
    }

    /// Switch tools. Abandons an in-progress draw without committing it.
    pub fn set_tool(&mut self, tool: ToolKind) {
        if matches!(self.state, InteractionState::Drawing { .. }) {
            self.state = InteractionState::Idle;
        }
        self.preview = None;
        self.tool = tool;
    }

    /// Dispatch a pointer event (screen coordinates). Only the primary
    /// button starts or ends gestures.
    pub fn handle_pointer(&mut self, event: PointerEvent) {
        match event {
            PointerEvent::Down { position, button: MouseButton::Left } => self.pointer_down(position),
            PointerEvent::Up { position, button: MouseButton::Left } => self.pointer_up(position),
            PointerEvent::Move { position } => self.pointer_move(position),
            _ => {}
        }
    }

    /// Primary button pressed at a screen point.
    pub fn pointer_down(&mut self, screen: Point) {
        self.settle_gesture();
        let world = self.camera.screen_to_world(screen);

        match self.tool {
            ToolKind::Select => self.begin_select(world),
            ToolKind::Rectangle | ToolKind::Arrow => {
                let Some(kind) = self.tool.drawn_kind() else { return };
                self.preview = Some(self.draft(kind, world, world));
                self.state = InteractionState::Drawing { kind, anchor: world, current: world };
            }
            ToolKind::Text => self.place_text(world),
            // Images are placed through `insert_image`
            ToolKind::Image => {}
        }
    }

    fn begin_select(&mut self, world: Point) {
        if let Some(handle_target) = self.selected.and_then(|id| self.store.get(id)) {
            if let Some(handle) = geometry::resize_handle_at(world, handle_target, &self.metrics) {
                let manipulation = ManipulationState::new(
                    handle_target.id,
                    Some(handle),
                    world,
                    handle_target.properties.clone(),
                );
                self.state = InteractionState::Resizing(manipulation);
                return;
            }
        }

        match geometry::hit_test(world, self.store.elements(), &self.metrics) {
            Some(element) => {
                let manipulation = ManipulationState::new(element.id, None, world, element.properties.clone());
                self.selected = Some(element.id);
                self.state = InteractionState::Moving(manipulation);
            }
            None => {
                self.selected = None;
                self.state = InteractionState::Idle;
            }
        }
    }

    fn place_text(&mut self, world: Point) {
        let mut properties = Properties::text(world.x, world.y, self.config.text_placeholder.clone());
        properties.style_mut().stroke_width = self.config.default_stroke_width;
        let element = Element::new(self.store.canvas_id(), properties);
        let (id, original) = (element.id, element.properties.clone());

        if self.write(|store| store.insert(element)) {
            self.selected = Some(id);
            self.state = InteractionState::EditingText { id, original };
        }
        self.tool = ToolKind::Select;
    }

    /// Pointer moved to a screen point.
    pub fn pointer_move(&mut self, screen: Point) {
        let world = self.camera.screen_to_world(screen);
        self.outbox.push(Outbound::Cursor { x: world.x, y: world.y });

        match &mut self.state {
            InteractionState::Drawing { kind, anchor, current } => {
                *current = world;
                let (kind, anchor) = (*kind, *anchor);
                self.preview = Some(self.draft(kind, anchor, world));
            }
            InteractionState::Moving(m) | InteractionState::Resizing(m) => {
                let (id, properties) = (m.element_id, m.properties_at(world));
                if let Err(e) = self.store.replace_local(id, properties) {
                    log::warn!("Abandoning gesture: {}", e);
                    self.state = InteractionState::Idle;
                }
            }
            InteractionState::Idle | InteractionState::EditingText { .. } => {}
        }
    }

    /// Primary button released at a screen point.
    pub fn pointer_up(&mut self, screen: Point) {
        let world = self.camera.screen_to_world(screen);

        match std::mem::take(&mut self.state) {
            InteractionState::Drawing { kind, anchor, .. } => {
                self.preview = None;
                self.selected = None;
                let properties = self.draft(kind, anchor, world);
                if properties.has_extent() {
                    let element = Element::new(self.store.canvas_id(), properties);
                    self.write(|store| store.insert(element));
                } else {
                    log::debug!("Discarding zero-size {}", kind.name());
                }
            }
            InteractionState::Moving(m) | InteractionState::Resizing(m) => self.finish_manipulation(m, world),
            other => self.state = other,
        }
    }

    /// Finish a gesture whose pointer-up never arrived. Moves and resizes
    /// are committed where they last were, draws are dropped, text editing
    /// is committed.
    fn settle_gesture(&mut self) {
        match std::mem::take(&mut self.state) {
            InteractionState::Idle => {}
            InteractionState::Drawing { .. } => self.preview = None,
            InteractionState::Moving(m) | InteractionState::Resizing(m) => {
                log::debug!("Settling unfinished gesture on {}", m.element_id);
                self.commit_manipulation(m);
            }
            editing @ InteractionState::EditingText { .. } => {
                self.state = editing;
                self.commit_text();
            }
        }
    }

    fn finish_manipulation(&mut self, m: ManipulationState, world: Point) {
        if let Err(e) = self.store.replace_local(m.element_id, m.properties_at(world)) {
            log::warn!("Gesture target vanished: {}", e);
            return;
        }
        self.commit_manipulation(m);
    }

    /// Write the element's current geometry if the gesture changed it.
    fn commit_manipulation(&mut self, m: ManipulationState) {
        let id = m.element_id;
        let changed = self.store.get(id).is_some_and(|e| e.properties != m.original);
        if changed {
            self.write(|store| store.commit(id, m.original));
        }
    }

    /// Properties for a shape dragged from `anchor` to `current`.
    fn draft(&self, kind: ElementKind, anchor: Point, current: Point) -> Properties {
        let mut properties = match kind {
            ElementKind::Arrow => Properties::arrow(anchor.x, anchor.y, current.x, current.y),
            _ => Properties::rect(anchor.x, anchor.y, current.x - anchor.x, current.y - anchor.y),
        };
        properties.style_mut().stroke_width = self.config.default_stroke_width;
        properties
    }

    /// Wheel: zoom about the pointer with ctrl/cmd, otherwise pan.
    pub fn wheel(&mut self, event: WheelEvent) {
        if event.modifiers.command() {
            let zoom = self.camera.zoom - event.delta.y * self.config.wheel_zoom_step;
            self.camera.zoom_to(event.position, zoom);
        } else {
            self.camera.pan(-event.delta);
        }
    }

    /// Handle a key press. Returns true if the editor consumed it.
    pub fn key(&mut self, event: KeyEvent) -> bool {
        if matches!(self.state, InteractionState::EditingText { .. }) {
            if event.key == Key::Escape {
                self.commit_text();
                return true;
            }
            return false;
        }
        if self.text_focus {
            return false;
        }

        let Some(action) = ShortcutRegistry::resolve(&event) else {
            return false;
        };
        match action {
            ShortcutAction::Copy => self.copy(),
            ShortcutAction::Paste => self.paste(),
            ShortcutAction::Duplicate => self.duplicate(),
            ShortcutAction::Delete => self.delete_selected(),
            ShortcutAction::Cancel => self.cancel(),
            ShortcutAction::Tool(tool) => self.set_tool(tool),
        }
        true
    }

    /// Copy the selected element to the clipboard.
    pub fn copy(&mut self) {
        if let Some(element) = self.selected.and_then(|id| self.store.get(id)) {
            self.clipboard.copy(element);
        }
    }

    /// Insert a shifted clone of the clipboard content and select it.
    pub fn paste(&mut self) {
        let Some(mut element) = self.clipboard.paste(self.config.paste_offset) else {
            return;
        };
        element.canvas_id = self.store.canvas_id().to_string();
        self.insert_and_select(element);
    }

    /// Insert a shifted clone of the selected element and select it.
    pub fn duplicate(&mut self) {
        let Some(element) = self.selected.and_then(|id| self.store.get(id)) else {
            return;
        };
        let clone = element.duplicated(self.config.paste_offset);
        self.insert_and_select(clone);
    }

    fn insert_and_select(&mut self, element: Element) {
        let id = element.id;
        if self.write(|store| store.insert(element)) {
            self.selected = Some(id);
        }
    }

    /// Delete the selected element.
    pub fn delete_selected(&mut self) {
        let Some(id) = self.selected.take() else {
            return;
        };
        if self.state.element_id() == Some(id) {
            self.state = InteractionState::Idle;
        }
        self.write(|store| store.delete(id));
    }

    /// End the current gesture.
    ///
    /// Draws are dropped, moves and resizes snap back to where they started,
    /// and text editing is committed. When idle, clears the selection.
    pub fn cancel(&mut self) {
        match std::mem::take(&mut self.state) {
            InteractionState::Idle => self.selected = None,
            InteractionState::Drawing { .. } => self.preview = None,
            InteractionState::Moving(m) | InteractionState::Resizing(m) => {
                if let Err(e) = self.store.replace_local(m.element_id, m.original) {
                    log::debug!("Nothing to restore: {}", e);
                }
            }
            editing @ InteractionState::EditingText { .. } => {
                self.state = editing;
                self.commit_text();
            }
        }
    }

    /// Replace the text of the element being edited. Local only.
    pub fn text_input(&mut self, text: &str) {
        if let InteractionState::EditingText { id, .. } = self.state {
            if let Err(e) = self.store.update_local(id, &PropertiesPatch::text(text)) {
                log::warn!("Text edit lost: {}", e);
                self.state = InteractionState::Idle;
            }
        }
    }

    /// Finish text editing and write the element's full properties.
    pub fn commit_text(&mut self) {
        if let InteractionState::EditingText { id, original } = std::mem::take(&mut self.state) {
            self.write(|store| store.commit(id, original));
        }
    }

    /// Merge style changes into an element. Stroke width is clamped to 1..=10.
    pub fn update_style(&mut self, id: ElementId, mut patch: StylePatch) {
        if patch.is_empty() {
            return;
        }
        patch.stroke_width = patch
            .stroke_width
            .map(|w| w.clamp(MIN_STROKE_WIDTH, MAX_STROKE_WIDTH));
        self.write(|store| store.update(id, &PropertiesPatch::style(patch)));
    }

    /// Insert the result of a diagram generation, centered in the viewport.
    ///
    /// Returns the number of elements inserted. On failure the store is
    /// left untouched.
    pub fn insert_generated(
        &mut self,
        result: Result<Vec<ShapeDescriptor>, ServiceError>,
        viewport: Size,
    ) -> Result<usize, ServiceError> {
        let descriptors = result?;
        if descriptors.is_empty() {
            return Ok(0);
        }
        let center = self.camera.viewport_center_world(viewport);
        let elements = place_descriptors(&descriptors, center, self.store.canvas_id());
        let count = elements.len();
        if self.write(|store| store.insert_batch(elements)) {
            Ok(count)
        } else {
            Err(ServiceError::Generation("could not insert generated elements".to_string()))
        }
    }

    /// Insert an uploaded image, centered in the viewport.
    pub fn insert_image(&mut self, result: Result<String, ServiceError>, viewport: Size) -> Result<ElementId, ServiceError> {
        let url = result?;
        let center = self.camera.viewport_center_world(viewport);
        let element = image_element_at(url, center, self.config.image_size, self.store.canvas_id());
        let id = element.id;
        self.insert_and_select(element);
        Ok(id)
    }

    /// Drop references to elements that no longer exist.
    ///
    /// Call after remote changes or rollbacks.
    pub fn reconcile_selection(&mut self) {
        if self.selected.is_some_and(|id| !self.store.contains(id)) {
            self.selected = None;
        }
        if self.state.element_id().is_some_and(|id| !self.store.contains(id)) {
            log::debug!("Element of {} gesture is gone", self.state.name());
            self.state = InteractionState::Idle;
        }
    }

    pub fn debug_info(&self) -> DebugInfo {
        DebugInfo {
            state: self.state.name(),
            tool: self.tool.name(),
            selected: self.selected,
            element_count: self.store.len(),
            pending_writes: self.store.pending_writes(),
            zoom: self.camera.zoom,
            offset_x: self.camera.offset.x,
            offset_y: self.camera.offset.y,
        }
    }
}
