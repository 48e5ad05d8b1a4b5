//! Mapper registry and resolution
//!
//! The registry is the shared configuration object of the mapping layer: it
//! holds explicitly registered mappers, the merged conversion rules, and the
//! discovery sources, plus a cache of resolution outcomes.

use crate::core::convert::{default_conversions, TypeConversions};
use crate::core::error::{Error, Result};
use crate::core::mapper::{
    ErasedRowMapper, Mapped, MapperSource, RowMapper, StructuralMapper, TypeDescriptor,
};
use crate::core::value::{Value, ValueKind};
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable mapper configuration plus a concurrent resolution cache.
///
/// Cheap to share via `Arc`; resolution is safe from any thread. Under
/// concurrent first-time resolution of the same type, discovery may run more
/// than once, but every caller observes an equivalent mapper.
pub struct MapperRegistry {
    mappers: HashMap<TypeId, ErasedRowMapper>,
    conversions: TypeConversions,
    sources: Vec<Arc<dyn MapperSource>>,
    cache: RwLock<HashMap<TypeId, Option<ErasedRowMapper>>>,
}

impl MapperRegistry {
    /// Registry with no explicit mappers or sources, using the default
    /// conversion rules
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building a registry
    pub fn builder() -> MapperRegistryBuilder {
        MapperRegistryBuilder::default()
    }

    /// The conversion rules active for this registry
    pub fn conversions(&self) -> &TypeConversions {
        &self.conversions
    }

    /// Resolve the mapper for `T`.
    ///
    /// Order: explicit registration, cached outcome, discovery sources in
    /// registration order, structural descriptor. Both the found-by-discovery
    /// and the definitively-unmappable outcomes are cached; a source error
    /// is returned as-is and not cached.
    pub fn resolve_row_mapper<T: Mapped>(&self) -> Result<Arc<dyn RowMapper<T>>> {
        let key = TypeId::of::<T>();

        if let Some(erased) = self.mappers.get(&key) {
            return erased
                .downcast::<T>()
                .ok_or_else(|| Error::mapper_not_found(T::type_label()));
        }

        if let Some(cached) = self.cache.read().get(&key) {
            return match cached {
                Some(erased) => erased
                    .downcast::<T>()
                    .ok_or_else(|| Error::mapper_not_found(T::type_label())),
                None => Err(Error::mapper_not_found(T::type_label())),
            };
        }

        let descriptor = TypeDescriptor::of::<T>();
        for source in &self.sources {
            if let Some(erased) = source.lookup(&descriptor)? {
                if let Some(typed) = erased.downcast::<T>() {
                    self.cache.write().insert(key, Some(erased));
                    return Ok(typed);
                }
            }
        }

        if let Some(shape) = T::descriptor() {
            let typed: Arc<dyn RowMapper<T>> = Arc::new(StructuralMapper::new(shape));
            let erased = ErasedRowMapper::new(Arc::clone(&typed));
            self.cache.write().insert(key, Some(erased));
            return Ok(typed);
        }

        self.cache.write().insert(key, None);
        Err(Error::mapper_not_found(T::type_label()))
    }

    /// Map a single row into `T` using the resolved mapper
    pub fn map_row<T: Mapped>(&self, row: &crate::core::row::Row) -> Result<T> {
        let mapper = self.resolve_row_mapper::<T>()?;
        mapper.map_row(row, self)
    }
}

impl Default for MapperRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MapperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperRegistry")
            .field("mappers", &self.mappers.len())
            .field("sources", &self.sources.len())
            .field("conversions", &self.conversions)
            .finish()
    }
}

/// Builder for [`MapperRegistry`]
#[derive(Default)]
pub struct MapperRegistryBuilder {
    mappers: HashMap<TypeId, ErasedRowMapper>,
    conversions: crate::core::convert::Builder,
    sources: Vec<Arc<dyn MapperSource>>,
}

impl MapperRegistryBuilder {
    /// Register an explicit mapper for `T`; replaces an earlier
    /// registration for the same type
    pub fn register_row_mapper<T, M>(mut self, mapper: M) -> Self
    where
        T: Mapped,
        M: RowMapper<T> + 'static,
    {
        let typed: Arc<dyn RowMapper<T>> = Arc::new(mapper);
        self.mappers
            .insert(TypeId::of::<T>(), ErasedRowMapper::new(typed));
        self
    }

    /// Register a conversion rule; custom rules win over the defaults
    pub fn register_conversion<T, F>(mut self, kind: ValueKind, convert: F) -> Self
    where
        T: Send + 'static,
        F: Fn(&Value) -> Option<T> + Send + Sync + 'static,
    {
        self.conversions = self.conversions.register(kind, convert);
        self
    }

    /// Add a discovery source; sources are consulted in registration order
    pub fn add_source<S: MapperSource + 'static>(mut self, source: S) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    /// Finish the registry
    pub fn build(self) -> MapperRegistry {
        MapperRegistry {
            mappers: self.mappers,
            conversions: default_conversions().merge(&self.conversions.build()),
            sources: self.sources,
            cache: RwLock::new(HashMap::new()),
        }
    }
}
