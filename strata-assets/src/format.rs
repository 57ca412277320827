use std::any::Any;
use std::sync::Arc;

use eyre::{Result, WrapErr};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::error;

use crate::Asset;

/// Decode/construct contract for a basic asset kind: one contributing
/// source, reload replaces the single data payload in place.
pub trait BasicFormat: Send + Sync + 'static {
    type Data: Send + Sync + 'static;
    type Asset: Asset;

    /// Runs on worker threads for async loads. Must only touch its
    /// input bytes.
    fn decode(&self, bytes: Vec<u8>, path: &str) -> Result<Self::Data>;

    fn construct(&self, path: &str, data: &Self::Data) -> Self::Asset;

    fn reload(&self, asset: &mut Self::Asset, data: &Self::Data);
}

/// Decode/construct contract for a compound asset kind: every matching
/// source contributes a layer, merged lowest priority first.
pub trait CompoundFormat: Send + Sync + 'static {
    type Data: Send + Sync + 'static;
    type Asset: Asset;

    fn decode(&self, bytes: Vec<u8>, path: &str) -> Result<Self::Data>;

    fn construct(&self, path: &str) -> Self::Asset;

    fn reset_layers(&self, asset: &mut Self::Asset);

    fn merge_layer(&self, asset: &mut Self::Asset, data: &Self::Data);
}

pub(crate) trait AnyAsset: Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Asset> AnyAsset for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub(crate) trait AnyData: Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Send + Sync + 'static> AnyData for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) trait DynBasicFormat: Send + Sync + 'static {
    fn decode(&self, bytes: Vec<u8>, path: &str) -> Result<Box<dyn AnyData>>;

    fn construct(&self, path: &str, data: &dyn AnyData) -> Option<Box<dyn AnyAsset>>;

    fn reload(&self, asset: &mut dyn AnyAsset, data: &dyn AnyData);
}

pub(crate) trait DynCompoundFormat: Send + Sync + 'static {
    fn decode(&self, bytes: Vec<u8>, path: &str) -> Result<Box<dyn AnyData>>;

    fn construct(&self, path: &str) -> Box<dyn AnyAsset>;

    fn reset_layers(&self, asset: &mut dyn AnyAsset);

    fn merge_layer(&self, asset: &mut dyn AnyAsset, data: &dyn AnyData);
}

#[cold]
#[inline(never)]
fn downcast_mismatch(expected: &'static str) {
    error!(expected, "mismatched types in format dispatch");
}

fn typed_data<D: Send + Sync + 'static>(data: &dyn AnyData) -> Option<&D> {
    let typed = data.as_any().downcast_ref();
    if typed.is_none() {
        downcast_mismatch(std::any::type_name::<D>());
    }
    typed
}

fn typed_asset<A: Asset>(asset: &mut dyn AnyAsset) -> Option<&mut A> {
    let typed = asset.as_any_mut().downcast_mut();
    if typed.is_none() {
        downcast_mismatch(std::any::type_name::<A>());
    }
    typed
}

impl<F: BasicFormat> DynBasicFormat for F {
    fn decode(&self, bytes: Vec<u8>, path: &str) -> Result<Box<dyn AnyData>> {
        let data = BasicFormat::decode(self, bytes, path)?;
        Ok(Box::new(data))
    }

    fn construct(&self, path: &str, data: &dyn AnyData) -> Option<Box<dyn AnyAsset>> {
        let data = typed_data::<F::Data>(data)?;
        Some(Box::new(BasicFormat::construct(self, path, data)))
    }

    fn reload(&self, asset: &mut dyn AnyAsset, data: &dyn AnyData) {
        if let (Some(asset), Some(data)) =
            (typed_asset::<F::Asset>(asset), typed_data::<F::Data>(data))
        {
            BasicFormat::reload(self, asset, data);
        }
    }
}

impl<F: CompoundFormat> DynCompoundFormat for F {
    fn decode(&self, bytes: Vec<u8>, path: &str) -> Result<Box<dyn AnyData>> {
        let data = CompoundFormat::decode(self, bytes, path)?;
        Ok(Box::new(data))
    }

    fn construct(&self, path: &str) -> Box<dyn AnyAsset> {
        Box::new(CompoundFormat::construct(self, path))
    }

    fn reset_layers(&self, asset: &mut dyn AnyAsset) {
        if let Some(asset) = typed_asset::<F::Asset>(asset) {
            CompoundFormat::reset_layers(self, asset);
        }
    }

    fn merge_layer(&self, asset: &mut dyn AnyAsset, data: &dyn AnyData) {
        if let (Some(asset), Some(data)) =
            (typed_asset::<F::Asset>(asset), typed_data::<F::Data>(data))
        {
            CompoundFormat::merge_layer(self, asset, data);
        }
    }
}

/// Erased format operations stored by the registry and shipped to decode
/// workers.
#[derive(Clone)]
pub(crate) enum FormatOps {
    Basic(Arc<dyn DynBasicFormat>),
    Compound(Arc<dyn DynCompoundFormat>),
}

impl FormatOps {
    pub fn decode(&self, bytes: Vec<u8>, path: &str) -> Result<Box<dyn AnyData>> {
        match self {
            FormatOps::Basic(format) => format.decode(bytes, path),
            FormatOps::Compound(format) => format.decode(bytes, path),
        }
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, FormatOps::Compound(_))
    }
}

/// Parses a JSON byte payload into any deserializable value.
pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).wrap_err("invalid json")
}

/// A merged JSON object document, the standard compound asset for
/// key/value content such as language files. Later layers override
/// earlier layers key by key.
#[derive(Debug, Default)]
pub struct JsonDocument {
    entries: Map<String, Value>,
}

impl JsonDocument {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }
}

impl Asset for JsonDocument {}

#[derive(Debug, Default)]
pub struct JsonDocumentFormat;

impl CompoundFormat for JsonDocumentFormat {
    type Data = Map<String, Value>;
    type Asset = JsonDocument;

    fn decode(&self, bytes: Vec<u8>, path: &str) -> Result<Self::Data> {
        decode_json(&bytes).wrap_err_with(|| format!("in {}", path))
    }

    fn construct(&self, _path: &str) -> JsonDocument {
        JsonDocument::default()
    }

    fn reset_layers(&self, asset: &mut JsonDocument) {
        asset.entries.clear();
    }

    fn merge_layer(&self, asset: &mut JsonDocument, data: &Self::Data) {
        for (key, value) in data {
            asset.entries.insert(key.clone(), value.clone());
        }
    }
}
