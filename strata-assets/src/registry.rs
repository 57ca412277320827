use std::any::TypeId;
use std::sync::Arc;

use ahash::AHashMap;

use crate::format::{AnyData, BasicFormat, CompoundFormat, FormatOps};
use crate::path;

/// One registered asset kind: extension, decode/construct operations,
/// and the fallback slot. Immutable after registration except for the
/// fallback data, which lives exactly as long as the fallback path's
/// cache entry.
pub(crate) struct AssetType {
    extension: Arc<str>,
    asset_type: TypeId,
    type_name: &'static str,
    ops: FormatOps,
    fallback_path: Arc<str>,
    fallback_data: Option<Vec<Box<dyn AnyData>>>,
}

/// Cheap snapshot of a registered type, cloned out of the registry so
/// the pipeline can hold it across cache mutations.
#[derive(Clone)]
pub(crate) struct TypeRef {
    pub extension: Arc<str>,
    pub asset_type: TypeId,
    pub type_name: &'static str,
    pub ops: FormatOps,
    pub fallback_path: Arc<str>,
}

#[derive(Default)]
pub(crate) struct TypeRegistry {
    by_extension: AHashMap<Arc<str>, AssetType>,
    by_asset: AHashMap<TypeId, Arc<str>>,
}

impl TypeRegistry {
    pub fn new() -> TypeRegistry {
        TypeRegistry::default()
    }

    pub fn register_basic<F: BasicFormat>(&mut self, extension: &str, format: F) {
        self.register::<F::Asset>(extension, FormatOps::Basic(Arc::new(format)));
    }

    pub fn register_compound<F: CompoundFormat>(&mut self, extension: &str, format: F) {
        self.register::<F::Asset>(extension, FormatOps::Compound(Arc::new(format)));
    }

    fn register<A: 'static>(&mut self, extension: &str, ops: FormatOps) {
        let asset_type = TypeId::of::<A>();
        let type_name = std::any::type_name::<A>();

        if self.by_extension.contains_key(extension) {
            duplicate_registration("extension", extension);
        }
        if self.by_asset.contains_key(&asset_type) {
            duplicate_registration("asset kind", type_name);
        }

        let extension: Arc<str> = extension.into();
        let fallback_path: Arc<str> = path::fallback_path(&extension).into();

        self.by_asset.insert(asset_type, extension.clone());
        self.by_extension.insert(
            extension.clone(),
            AssetType {
                extension,
                asset_type,
                type_name,
                ops,
                fallback_path,
                fallback_data: None,
            },
        );
    }

    pub fn clear(&mut self) {
        self.by_extension.clear();
        self.by_asset.clear();
    }

    pub fn lookup(&self, extension: &str) -> Option<TypeRef> {
        let ty = self.by_extension.get(extension)?;
        Some(TypeRef {
            extension: ty.extension.clone(),
            asset_type: ty.asset_type,
            type_name: ty.type_name,
            ops: ty.ops.clone(),
            fallback_path: ty.fallback_path.clone(),
        })
    }

    /// Caches decoded fallback data for the type, replacing (and thereby
    /// dropping) any previous value.
    pub fn set_fallback_data(&mut self, extension: &str, datas: Vec<Box<dyn AnyData>>) {
        if let Some(ty) = self.by_extension.get_mut(extension) {
            ty.fallback_data = Some(datas);
        }
    }

    pub fn fallback_data(&self, extension: &str) -> Option<&[Box<dyn AnyData>]> {
        self.by_extension
            .get(extension)?
            .fallback_data
            .as_deref()
    }

    /// Clears the fallback slot when the entry at `unloaded_path` was the
    /// type's own fallback-path entry.
    pub fn clear_fallback_data_for(&mut self, extension: &str, unloaded_path: &str) {
        if let Some(ty) = self.by_extension.get_mut(extension) {
            if &*ty.fallback_path == unloaded_path {
                ty.fallback_data = None;
            }
        }
    }
}

#[cold]
#[inline(never)]
fn duplicate_registration(what: &str, value: &str) -> ! {
    panic!("asset type registration conflict: duplicate {} {:?}", what, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::JsonDocumentFormat;

    #[test]
    fn test_lookup() {
        let mut registry = TypeRegistry::new();
        registry.register_compound("json", JsonDocumentFormat);

        let ty = registry.lookup("json").unwrap();
        assert_eq!(&*ty.fallback_path, "defaults/default.json");
        assert!(ty.ops.is_compound());
        assert!(registry.lookup("png").is_none());
    }

    #[test]
    #[should_panic(expected = "registration conflict")]
    fn test_duplicate_extension_panics() {
        let mut registry = TypeRegistry::new();
        registry.register_compound("json", JsonDocumentFormat);
        registry.register_compound("json", JsonDocumentFormat);
    }
}
