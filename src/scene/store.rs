use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::renderer::arena::UniformRange;
use crate::renderer::ModelId;

/// A placed model. `local_params` is rewritten by every uniform upload.
#[derive(Debug, Clone)]
pub struct Entity {
    pub world: Mat4,
    pub model: ModelId,
    pub local_params: UniformRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightKind {
    Directional,
    Point,
}

impl LightKind {
    /// Value the shaders switch on.
    pub fn code(self) -> u32 {
        match self {
            LightKind::Directional => 0,
            LightKind::Point => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: Vec3,
    pub direction: Vec3,
    pub position: Vec3,
}

/// Flat entity and light lists. Iteration order is insertion order, which is also draw order.
#[derive(Debug, Default)]
pub struct SceneStore {
    entities: Vec<Entity>,
    lights: Vec<Light>,
}

impl SceneStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entity(&mut self, model: ModelId, world: Mat4) -> usize {
        self.entities.push(Entity {
            world,
            model,
            local_params: UniformRange::default(),
        });
        self.entities.len() - 1
    }

    pub fn add_light(&mut self, light: Light) {
        self.lights.push(light);
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut [Entity] {
        &mut self.entities
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    /// Lights to read and entities to update in the same upload.
    pub fn lights_and_entities_mut(&mut self) -> (&[Light], &mut [Entity]) {
        (&self.lights, &mut self.entities)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Handle;

    #[test]
    fn entities_keep_insertion_order() {
        let mut store = SceneStore::new();
        for i in 0..4 {
            store.add_entity(Handle::new(3 - i), Mat4::from_translation(Vec3::X * i as f32));
        }
        let models: Vec<usize> = store.entities().iter().map(|e| e.model.index()).collect();
        assert_eq!(models, vec![3, 2, 1, 0]);
    }
}
