//! Owner of every GPU resource the renderer loads: textures, programs, materials,
//! meshes and models. Entries are never removed.

use std::path::Path;

use super::material::Material;
use super::mesh::{Mesh, Model};
use super::program::{Program, ProgramTargets};
use super::texture::{DecodedImage, Texture};
use super::{MaterialId, MeshId, ModelId, ProgramId, TextureId};
use crate::asset::{Handle, ResourceTable};
use crate::error::{AssetError, RenderError};

/// Table whose entries are deduplicated by a source key (usually a path).
///
/// Lookups scan linearly, which is fine for the few hundred textures a scene has.
pub struct KeyedTable<T> {
    table: ResourceTable<T>,
    keys: Vec<String>,
}

impl<T> KeyedTable<T> {
    pub fn new() -> Self {
        Self {
            table: ResourceTable::new(),
            keys: Vec::new(),
        }
    }

    pub fn find(&self, key: &str) -> Option<Handle<T>> {
        self.keys.iter().position(|k| k == key).map(Handle::new)
    }

    /// Returns the entry for `key`, calling `load` only if there is none. A failed
    /// load is logged and cached as nothing, so the caller sees an absent slot.
    pub fn load_with(
        &mut self,
        key: &str,
        load: impl FnOnce() -> Result<T, AssetError>,
    ) -> Option<Handle<T>> {
        if let Some(handle) = self.find(key) {
            return Some(handle);
        }
        match load() {
            Ok(item) => {
                self.keys.push(key.to_string());
                Some(self.table.insert(item))
            }
            Err(err) => {
                log::error!("{}", err);
                None
            }
        }
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.table.get(handle)
    }

    pub fn key(&self, handle: Handle<T>) -> Option<&str> {
        self.keys.get(handle.index()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl<T> Default for KeyedTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct DefaultTextures {
    pub white: TextureId,
    pub black: TextureId,
    pub flat_normal: TextureId,
}

pub struct Registry {
    pub textures: KeyedTable<Texture>,
    pub programs: ResourceTable<Program>,
    pub materials: ResourceTable<Material>,
    pub meshes: ResourceTable<Mesh>,
    pub models: ResourceTable<Model>,
    pub defaults: DefaultTextures,
    /// Texture each material's albedo slot draws with, parallel to `materials`.
    albedo_bindings: Vec<TextureId>,
}

fn solid_key(rgba: [u8; 4]) -> String {
    format!(
        "#solid{:02x}{:02x}{:02x}{:02x}",
        rgba[0], rgba[1], rgba[2], rgba[3]
    )
}

impl Registry {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let mut textures = KeyedTable::new();
        let mut solid = |rgba: [u8; 4]| -> TextureId {
            let key = solid_key(rgba);
            let handle = textures.load_with(&key, || {
                Ok(Texture::from_color(device, queue, rgba, &key))
            });
            // A solid colour can't fail to load.
            handle.unwrap_or(Handle::new(0))
        };
        let defaults = DefaultTextures {
            white: solid([255, 255, 255, 255]),
            black: solid([0, 0, 0, 255]),
            flat_normal: solid([128, 128, 255, 255]),
        };

        Self {
            textures,
            programs: ResourceTable::new(),
            materials: ResourceTable::new(),
            meshes: ResourceTable::new(),
            models: ResourceTable::new(),
            defaults,
            albedo_bindings: Vec::new(),
        }
    }

    /// Loads `path` once. Later calls with the same path return the same handle.
    pub fn load_texture(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        path: impl AsRef<Path>,
    ) -> Option<TextureId> {
        let path = path.as_ref();
        let key = path.to_string_lossy();
        self.textures.load_with(&key, || {
            let image = DecodedImage::from_file(path)?;
            Ok(Texture::from_image(device, queue, &image, &key))
        })
    }

    /// Like [`load_texture`](Self::load_texture) for images embedded in a scene file;
    /// `key` names the image uniquely.
    pub fn load_texture_bytes(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        key: &str,
        bytes: &[u8],
    ) -> Option<TextureId> {
        self.textures.load_with(key, || {
            let image = DecodedImage::from_bytes(key, bytes)?;
            Ok(Texture::from_image(device, queue, &image, key))
        })
    }

    /// Tiling texture, or `None` if the file can't be used.
    pub fn load_tiling_texture(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        path: impl AsRef<Path>,
    ) -> Option<TextureId> {
        let path = path.as_ref();
        let key = format!("{}#tiling", path.to_string_lossy());
        self.textures.load_with(&key, || {
            let image = DecodedImage::from_file(path)?;
            Ok(Texture::tiling(device, queue, &image, &key))
        })
    }

    pub fn texture(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(id)
    }

    /// Compiles and links `path` for `define`. Always returns a handle; check
    /// [`Program::is_linked`] before drawing with it.
    pub fn load_program(
        &mut self,
        device: &wgpu::Device,
        path: impl AsRef<Path>,
        define: &str,
        targets: ProgramTargets,
    ) -> ProgramId {
        let path = path.as_ref();
        if let Some(existing) = self
            .programs
            .find(|p| p.path == path && p.name == define && p.targets == targets)
        {
            return existing;
        }
        self.programs
            .insert(Program::load(device, path, define, targets))
    }

    pub fn program(&self, id: ProgramId) -> Result<&Program, RenderError> {
        self.programs.get(id).ok_or(RenderError::UnknownHandle {
            kind: "program",
            index: id.index(),
        })
    }

    /// Registers `material`. Without an albedo map it draws with a solid texture of
    /// its albedo colour.
    pub fn add_material(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        material: Material,
    ) -> MaterialId {
        let binding = match material.albedo_map {
            Some(texture) => texture,
            None => {
                let rgba = material.albedo_rgba8();
                let key = solid_key(rgba);
                self.textures
                    .load_with(&key, || Ok(Texture::from_color(device, queue, rgba, &key)))
                    .unwrap_or(self.defaults.white)
            }
        };
        self.albedo_bindings.push(binding);
        self.materials.insert(material)
    }

    pub fn albedo_texture(&self, material: MaterialId) -> TextureId {
        self.albedo_bindings
            .get(material.index())
            .copied()
            .unwrap_or(self.defaults.white)
    }

    /// Validates and registers `mesh`. GPU buffers are created on first draw.
    pub fn add_mesh(&mut self, mesh: Mesh) -> Result<MeshId, RenderError> {
        mesh.validate()?;
        Ok(self.meshes.insert(mesh))
    }

    pub fn add_model(&mut self, model: Model) -> ModelId {
        self.models.insert(model)
    }

    pub fn model(&self, id: ModelId) -> Result<&Model, RenderError> {
        self.models.get(id).ok_or(RenderError::UnknownHandle {
            kind: "model",
            index: id.index(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn io_error(path: &str) -> AssetError {
        AssetError::Io {
            path: PathBuf::from(path),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }
    }

    #[test]
    fn same_key_loads_once() {
        let mut table: KeyedTable<u32> = KeyedTable::new();
        let mut loads = 0;

        let first = table.load_with("textures/a.png", || {
            loads += 1;
            Ok(1)
        });
        let second = table.load_with("textures/a.png", || {
            loads += 1;
            Ok(2)
        });

        assert_eq!(first, second);
        assert_eq!(loads, 1);
        assert_eq!(table.len(), 1);
        assert_eq!(first.and_then(|h| table.get(h)), Some(&1));
    }

    #[test]
    fn distinct_keys_get_distinct_entries() {
        let mut table: KeyedTable<&str> = KeyedTable::new();
        let a = table.load_with("a.png", || Ok("a"));
        let b = table.load_with("b.png", || Ok("b"));
        assert_ne!(a, b);
        assert_eq!(b.and_then(|h| table.key(h)), Some("b.png"));
    }

    #[test]
    fn failed_load_is_absent_and_not_cached() {
        let mut table: KeyedTable<u32> = KeyedTable::new();
        assert_eq!(table.load_with("missing.png", || Err(io_error("missing.png"))), None);
        assert!(table.is_empty());
        // a later attempt runs the loader again
        assert!(table.load_with("missing.png", || Ok(5)).is_some());
    }

    #[test]
    fn solid_keys_encode_the_colour() {
        assert_eq!(solid_key([255, 0, 16, 255]), "#solidff0010ff");
    }
}
