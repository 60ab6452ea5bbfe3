use crate::markers::MARKER_NAME;
use crate::material::Color;
use crate::scene::{NodeId, SceneGraph};

/// Highlight state for the selectable marker objects. At most one object is
/// selected; its outline (first child) is drawn white until deselected.
#[derive(Debug, Default, Clone)]
pub struct Selection {
    selected: Option<NodeId>,
}

impl Selection {
    pub fn selected(&self) -> Option<NodeId> {
        self.selected
    }

    /// Applies one click. Any current selection is released first; the hit
    /// becomes the new selection when it is a marker outside the main model
    /// and was not the object just released.
    pub fn apply_click(
        &mut self,
        scene: &mut SceneGraph,
        hit: Option<NodeId>,
        main_model: Option<NodeId>,
    ) -> Option<NodeId> {
        let released = self.selected.take();
        if let Some(previous) = released {
            restore(scene, previous);
        }

        let candidate = hit
            .filter(|id| !main_model.is_some_and(|model| scene.is_within(*id, model)))
            .filter(|id| Some(*id) != released)
            .filter(|id| scene.get(*id).is_some_and(|node| node.name == MARKER_NAME));

        if let Some(id) = candidate {
            set_outline_color(scene, id, Color::WHITE);
            self.selected = Some(id);
        }
        self.selected
    }
}

fn restore(scene: &mut SceneGraph, id: NodeId) {
    let Some(root_color) = scene
        .get(id)
        .and_then(|node| node.material())
        .map(|material| material.color)
    else {
        return;
    };
    set_outline_color(scene, id, root_color.scaled(0.5));
}

fn set_outline_color(scene: &mut SceneGraph, id: NodeId, color: Color) {
    let Some(outline) = scene.get(id).and_then(|node| node.children().first().copied()) else {
        log::debug!("selected object has no outline child");
        return;
    };
    if let Some(material) = scene.get_mut(outline).and_then(|node| node.material_mut()) {
        material.color = color;
    }
}
