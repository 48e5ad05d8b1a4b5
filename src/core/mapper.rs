//! Row mappers and the structural mapping engine
//!
//! A [`RowMapper`] turns one [`Row`] into one value of a target type.
//! Mappers come from three places: explicit registration, discovery through
//! a [`MapperSource`], or a structural [`RecordDescriptor`] attached to the
//! type itself (usually via [`mapped_record!`](crate::mapped_record)).

use crate::core::error::{Error, Result};
use crate::core::registry::MapperRegistry;
use crate::core::row::Row;
use crate::core::value::FromValue;
use std::any::{Any, TypeId};
use std::sync::Arc;

/// Maps one result row into a `T`.
///
/// The registry is passed through so nested reads see the same conversion
/// rules as the resolution that produced the mapper.
pub trait RowMapper<T>: Send + Sync {
    fn map_row(&self, row: &Row, registry: &MapperRegistry) -> Result<T>;
}

impl<T, F> RowMapper<T> for F
where
    F: Fn(&Row, &MapperRegistry) -> Result<T> + Send + Sync,
{
    fn map_row(&self, row: &Row, registry: &MapperRegistry) -> Result<T> {
        self(row, registry)
    }
}

// Typed mapper behind a type-erased handle so resolution results of
// different target types can share one cache.
struct Slot<T>(Arc<dyn RowMapper<T>>);

/// Type-erased [`RowMapper`] handle used by the resolution cache and by
/// [`MapperSource`] implementations.
#[derive(Clone)]
pub struct ErasedRowMapper {
    slot: Arc<dyn Any + Send + Sync>,
}

impl ErasedRowMapper {
    /// Erase a typed mapper
    pub fn new<T: 'static>(mapper: Arc<dyn RowMapper<T>>) -> Self {
        ErasedRowMapper {
            slot: Arc::new(Slot(mapper)),
        }
    }

    /// Recover the typed mapper; `None` if the handle holds a mapper for a
    /// different target type
    pub fn downcast<T: 'static>(&self) -> Option<Arc<dyn RowMapper<T>>> {
        self.slot
            .downcast_ref::<Slot<T>>()
            .map(|slot| Arc::clone(&slot.0))
    }
}

impl std::fmt::Debug for ErasedRowMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ErasedRowMapper")
    }
}

/// Identity of a mapping target type as seen by [`MapperSource`]s
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    pub id: TypeId,
    pub name: &'static str,
}

impl TypeDescriptor {
    /// Descriptor for `T`
    pub fn of<T: 'static>() -> Self {
        TypeDescriptor {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

/// Collaborator that can supply mappers during resolution.
///
/// `Ok(None)` is a definitive miss for this source; an `Err` aborts the
/// resolution and is never cached, so a later attempt consults the source
/// again.
pub trait MapperSource: Send + Sync {
    fn lookup(&self, target: &TypeDescriptor) -> Result<Option<ErasedRowMapper>>;
}

type FetchFn = Box<dyn Fn(&Row, &MapperRegistry) -> Result<Box<dyn Any + Send>> + Send + Sync>;

/// One field of a structurally mapped record: a column name plus the
/// fetch behavior derived from the field's declared type.
pub struct FieldSpec {
    name: &'static str,
    fetch: FetchFn,
}

impl FieldSpec {
    /// Non-optional field: a null or missing column fails the whole mapping
    pub fn required<U: FromValue>(name: &'static str) -> Self {
        FieldSpec {
            name,
            fetch: Box::new(move |row, registry| {
                let value: U = row.get_with(name, registry.conversions())?;
                Ok(Box::new(value) as Box<dyn Any + Send>)
            }),
        }
    }

    /// Optional field: SQL NULL becomes `None`, the column must still exist
    pub fn optional<U: FromValue>(name: &'static str) -> Self {
        FieldSpec {
            name,
            fetch: Box::new(move |row, registry| {
                let value: Option<U> = row.get_opt_with(name, registry.conversions())?;
                Ok(Box::new(value) as Box<dyn Any + Send>)
            }),
        }
    }

    /// Single-field wrapper: fetch the underlying representation and
    /// rewrap. The wrapper is never applied to a null.
    pub fn wrapped<W, U>(name: &'static str, wrap: fn(U) -> W) -> Self
    where
        W: Send + 'static,
        U: FromValue,
    {
        FieldSpec {
            name,
            fetch: Box::new(move |row, registry| {
                let value: U = row.get_with(name, registry.conversions())?;
                Ok(Box::new(wrap(value)) as Box<dyn Any + Send>)
            }),
        }
    }

    /// Optional single-field wrapper: NULL stays `None`, a present value is
    /// rewrapped
    pub fn wrapped_optional<W, U>(name: &'static str, wrap: fn(U) -> W) -> Self
    where
        W: Send + 'static,
        U: FromValue,
    {
        FieldSpec {
            name,
            fetch: Box::new(move |row, registry| {
                let value: Option<U> = row.get_opt_with(name, registry.conversions())?;
                Ok(Box::new(value.map(wrap)) as Box<dyn Any + Send>)
            }),
        }
    }

    /// Column name the field reads
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn fetch(&self, row: &Row, registry: &MapperRegistry) -> Result<Box<dyn Any + Send>> {
        (self.fetch)(row, registry)
    }
}

impl std::fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldSpec").field("name", &self.name).finish()
    }
}

/// Fetched field values handed to a record constructor in declaration order
pub struct Parts {
    args: std::vec::IntoIter<Box<dyn Any + Send>>,
    type_name: &'static str,
}

impl Parts {
    fn new(args: Vec<Box<dyn Any + Send>>, type_name: &'static str) -> Self {
        Parts {
            args: args.into_iter(),
            type_name,
        }
    }

    /// Take the next positional value as `U`.
    ///
    /// Running out of values or hitting a value of the wrong type means the
    /// descriptor does not fit the constructor; both fail with
    /// `MapperNotFound` rather than a partial construction.
    pub fn take<U: 'static>(&mut self) -> Result<U> {
        let arg = self
            .args
            .next()
            .ok_or_else(|| Error::mapper_not_found(self.type_name))?;
        arg.downcast::<U>()
            .map(|boxed| *boxed)
            .map_err(|_| Error::mapper_not_found(self.type_name))
    }

    fn remaining(&self) -> usize {
        self.args.len()
    }
}

/// Structural description of a record type: its fields in declaration order
/// plus a positional constructor.
pub struct RecordDescriptor<T> {
    fields: Vec<FieldSpec>,
    construct: fn(&mut Parts) -> Result<T>,
}

impl<T> RecordDescriptor<T> {
    pub fn new(fields: Vec<FieldSpec>, construct: fn(&mut Parts) -> Result<T>) -> Self {
        RecordDescriptor { fields, construct }
    }

    /// The described fields, in declaration order
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }
}

/// Mapper derived from a [`RecordDescriptor`]: fetch every field by name,
/// then construct positionally.
pub struct StructuralMapper<T> {
    descriptor: RecordDescriptor<T>,
    type_name: &'static str,
}

impl<T: 'static> StructuralMapper<T> {
    pub fn new(descriptor: RecordDescriptor<T>) -> Self {
        StructuralMapper {
            descriptor,
            type_name: std::any::type_name::<T>(),
        }
    }
}

impl<T: 'static> RowMapper<T> for StructuralMapper<T>
where
    T: Send,
{
    fn map_row(&self, row: &Row, registry: &MapperRegistry) -> Result<T> {
        let mut args = Vec::with_capacity(self.descriptor.fields.len());
        for field in &self.descriptor.fields {
            args.push(field.fetch(row, registry)?);
        }
        let mut parts = Parts::new(args, self.type_name);
        let value = (self.descriptor.construct)(&mut parts)?;
        if parts.remaining() != 0 {
            return Err(Error::mapper_not_found(self.type_name));
        }
        Ok(value)
    }
}

/// Types that can be produced by row mapping.
///
/// The default implementation has no structural descriptor, so resolution
/// for such a type succeeds only through explicit registration or a
/// [`MapperSource`]. Implement [`Mapped::descriptor`] (or use
/// [`mapped_record!`](crate::mapped_record)) to opt into the structural
/// fallback.
pub trait Mapped: Sized + Send + 'static {
    /// Name used in diagnostics
    fn type_label() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Structural shape of the type, if it has one
    fn descriptor() -> Option<RecordDescriptor<Self>> {
        None
    }
}

/// Define a plain record struct together with its structural mapping.
///
/// Field names become column names; `Option<T>` fields map SQL NULL to
/// `None`, all other fields reject NULL.
///
/// ```ignore
/// mapped_record! {
///     #[derive(Debug, PartialEq)]
///     pub struct Book {
///         pub title: String,
///         pub author: String,
///         pub pages: Option<i64>,
///     }
/// }
/// ```
#[macro_export]
macro_rules! mapped_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident { $($body:tt)* }
    ) => {
        $crate::mapped_record!(@parse
            meta = [$(#[$meta])*],
            vis = [$vis],
            name = $name,
            specs = [],
            fields = [],
            rest = [$($body)*]
        );
    };

    // all fields consumed
    (@parse
        meta = [$($meta:tt)*], vis = [$vis:vis], name = $name:ident,
        specs = [$($specs:tt)*], fields = [$($fields:tt)*],
        rest = []
    ) => {
        $crate::mapped_record!(@emit
            meta = [$($meta)*], vis = [$vis], name = $name,
            specs = [$($specs)*], fields = [$($fields)*]
        );
    };

    // optional field
    (@parse
        meta = [$($meta:tt)*], vis = [$vis:vis], name = $name:ident,
        specs = [$($specs:tt)*], fields = [$($fields:tt)*],
        rest = [$fvis:vis $field:ident : Option<$inner:ty> , $($rest:tt)*]
    ) => {
        $crate::mapped_record!(@parse
            meta = [$($meta)*], vis = [$vis], name = $name,
            specs = [$($specs)* { $crate::FieldSpec::optional::<$inner>(stringify!($field)) }],
            fields = [$($fields)* { $fvis $field : Option<$inner> }],
            rest = [$($rest)*]
        );
    };

    // required field
    (@parse
        meta = [$($meta:tt)*], vis = [$vis:vis], name = $name:ident,
        specs = [$($specs:tt)*], fields = [$($fields:tt)*],
        rest = [$fvis:vis $field:ident : $fty:ty , $($rest:tt)*]
    ) => {
        $crate::mapped_record!(@parse
            meta = [$($meta)*], vis = [$vis], name = $name,
            specs = [$($specs)* { $crate::FieldSpec::required::<$fty>(stringify!($field)) }],
            fields = [$($fields)* { $fvis $field : $fty }],
            rest = [$($rest)*]
        );
    };

    // last field without trailing comma
    (@parse
        meta = [$($meta:tt)*], vis = [$vis:vis], name = $name:ident,
        specs = [$($specs:tt)*], fields = [$($fields:tt)*],
        rest = [$fvis:vis $field:ident : Option<$inner:ty>]
    ) => {
        $crate::mapped_record!(@parse
            meta = [$($meta)*], vis = [$vis], name = $name,
            specs = [$($specs)*], fields = [$($fields)*],
            rest = [$fvis $field : Option<$inner> ,]
        );
    };
    (@parse
        meta = [$($meta:tt)*], vis = [$vis:vis], name = $name:ident,
        specs = [$($specs:tt)*], fields = [$($fields:tt)*],
        rest = [$fvis:vis $field:ident : $fty:ty]
    ) => {
        $crate::mapped_record!(@parse
            meta = [$($meta)*], vis = [$vis], name = $name,
            specs = [$($specs)*], fields = [$($fields)*],
            rest = [$fvis $field : $fty ,]
        );
    };

    (@emit
        meta = [$($meta:tt)*], vis = [$vis:vis], name = $name:ident,
        specs = [$({$spec:expr})*],
        fields = [$({$ffvis:vis $ffield:ident : $ffty:ty})*]
    ) => {
        $($meta)*
        $vis struct $name {
            $( $ffvis $ffield : $ffty, )*
        }

        impl $crate::Mapped for $name {
            fn descriptor() -> Option<$crate::RecordDescriptor<Self>> {
                Some($crate::RecordDescriptor::new(
                    vec![ $( $spec ),* ],
                    |parts| {
                        Ok(Self {
                            $( $ffield : parts.take::<$ffty>()?, )*
                        })
                    },
                ))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::MapperRegistry;
    use crate::core::row::Row;
    use crate::core::value::Value;

    #[derive(Debug)]
    struct Book {
        title: String,
        pages: Option<i64>,
    }

    fn book_descriptor() -> RecordDescriptor<Book> {
        RecordDescriptor::new(
            vec![
                FieldSpec::required::<String>("title"),
                FieldSpec::optional::<i64>("pages"),
            ],
            |parts| {
                Ok(Book {
                    title: parts.take()?,
                    pages: parts.take()?,
                })
            },
        )
    }

    #[test]
    fn test_structural_mapper_maps_fields_by_name() {
        let registry = MapperRegistry::new();
        let mapper = StructuralMapper::new(book_descriptor());

        let row = Row::of([
            ("title", Value::Text("Dune".into())),
            ("pages", Value::Long(412)),
        ]);
        let book = mapper.map_row(&row, &registry).unwrap();
        assert_eq!(book.title, "Dune");
        assert_eq!(book.pages, Some(412));
    }

    #[test]
    fn test_optional_field_maps_null_to_none() {
        let registry = MapperRegistry::new();
        let mapper = StructuralMapper::new(book_descriptor());

        let row = Row::of([
            ("title", Value::Text("Dune".into())),
            ("pages", Value::Null),
        ]);
        let book = mapper.map_row(&row, &registry).unwrap();
        assert_eq!(book.pages, None);
    }

    #[test]
    fn test_required_field_rejects_null() {
        let registry = MapperRegistry::new();
        let mapper = StructuralMapper::new(book_descriptor());

        let row = Row::of([("title", Value::Null), ("pages", Value::Long(1))]);
        let err = mapper.map_row(&row, &registry).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[derive(Debug, PartialEq)]
    struct Isbn(String);

    struct Edition {
        isbn: Isbn,
        prev: Option<Isbn>,
    }

    #[test]
    fn test_wrapped_fields_never_wrap_null() {
        let registry = MapperRegistry::new();
        let mapper = StructuralMapper::new(RecordDescriptor::new(
            vec![
                FieldSpec::wrapped::<Isbn, String>("isbn", Isbn),
                FieldSpec::wrapped_optional::<Isbn, String>("prev", Isbn),
            ],
            |parts| {
                Ok(Edition {
                    isbn: parts.take()?,
                    prev: parts.take()?,
                })
            },
        ));

        let row = Row::of([
            ("isbn", Value::Text("978-0".into())),
            ("prev", Value::Null),
        ]);
        let edition = mapper.map_row(&row, &registry).unwrap();
        assert_eq!(edition.isbn, Isbn("978-0".into()));
        assert_eq!(edition.prev, None);

        let row = Row::of([
            ("isbn", Value::Text("978-0".into())),
            ("prev", Value::Text("978-1".into())),
        ]);
        let edition = mapper.map_row(&row, &registry).unwrap();
        assert_eq!(edition.prev, Some(Isbn("978-1".into())));
    }

    #[test]
    fn test_constructor_shape_mismatch_is_mapper_not_found() {
        let registry = MapperRegistry::new();
        // descriptor fetches a String but the constructor expects i64
        let mapper: StructuralMapper<i64> = StructuralMapper::new(RecordDescriptor::new(
            vec![FieldSpec::required::<String>("x")],
            |parts| parts.take::<i64>(),
        ));

        let row = Row::of([("x", Value::Text("oops".into()))]);
        let err = mapper.map_row(&row, &registry).unwrap_err();
        assert!(matches!(err, Error::MapperNotFound { .. }));
    }

    #[test]
    fn test_constructor_consuming_too_few_is_mapper_not_found() {
        let registry = MapperRegistry::new();
        let mapper: StructuralMapper<String> = StructuralMapper::new(RecordDescriptor::new(
            vec![
                FieldSpec::required::<String>("a"),
                FieldSpec::required::<String>("b"),
            ],
            |parts| parts.take::<String>(),
        ));

        let row = Row::of([("a", "one"), ("b", "two")]);
        let err = mapper.map_row(&row, &registry).unwrap_err();
        assert!(matches!(err, Error::MapperNotFound { .. }));
    }

    #[test]
    fn test_erased_mapper_round_trip() {
        let typed: Arc<dyn RowMapper<i64>> =
            Arc::new(|row: &Row, _: &MapperRegistry| row.get::<i64>("n"));
        let erased = ErasedRowMapper::new(Arc::clone(&typed));

        assert!(erased.downcast::<i64>().is_some());
        assert!(erased.downcast::<String>().is_none());

        let row = Row::of([("n", 5i64)]);
        let registry = MapperRegistry::new();
        let recovered = erased.downcast::<i64>().unwrap();
        assert_eq!(recovered.map_row(&row, &registry).unwrap(), 5);
    }

    mapped_record! {
        #[derive(Debug, PartialEq)]
        struct Track {
            title: String,
            artist: String,
            rating: Option<i64>,
        }
    }

    #[test]
    fn test_mapped_record_macro() {
        let registry = MapperRegistry::new();
        let descriptor = Track::descriptor().unwrap();
        assert_eq!(
            descriptor
                .fields()
                .iter()
                .map(|f| f.name())
                .collect::<Vec<_>>(),
            vec!["title", "artist", "rating"]
        );

        let mapper = StructuralMapper::new(descriptor);
        let row = Row::of([
            ("title", Value::Text("Hey".into())),
            ("artist", Value::Text("Someone".into())),
            ("rating", Value::Null),
        ]);
        let track = mapper.map_row(&row, &registry).unwrap();
        assert_eq!(
            track,
            Track {
                title: "Hey".into(),
                artist: "Someone".into(),
                rating: None,
            }
        );
    }
}
